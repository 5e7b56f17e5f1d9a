//! End-to-end tests for the valuation pipeline
//!
//! Trains on a synthetic price model and checks predictions and
//! attributions against properties that follow from how the data was made.

use carvault_core::deterministic::LcgRng;
use carvault_core::{
    encoder, pipeline, shap, FeatureDef, FeatureSchema, RawRecord, ValuationConfig,
    ValuationError, ValuationPipeline,
};

const FUELS: [&str; 3] = ["petrol", "diesel", "electric"];

/// price = 10 - 0.5 * age - 0.00001 * usage + 2 * electric
fn synthetic(rows: usize, seed: u64) -> (Vec<RawRecord>, Vec<f64>) {
    let mut rng = LcgRng::new(seed);
    let mut records = Vec::with_capacity(rows);
    let mut targets = Vec::with_capacity(rows);

    for _ in 0..rows {
        let age = (rng.next_unit() * 6.0 * 10.0).round() / 10.0;
        let usage = (rng.next_unit() * 100_000.0).round();
        let fuel = FUELS[rng.next_index(FUELS.len())];
        let price = 10.0 - 0.5 * age - 0.00001 * usage + if fuel == "electric" { 2.0 } else { 0.0 };

        records.push(
            RawRecord::new()
                .with("age", age)
                .with("usage", usage)
                .with("fuel", fuel),
        );
        targets.push(price);
    }

    (records, targets)
}

fn schema() -> FeatureSchema {
    FeatureSchema::new(vec![
        FeatureDef::numeric("age").non_negative(),
        FeatureDef::numeric("usage").non_negative(),
        FeatureDef::categorical("fuel"),
    ])
    .unwrap()
}

/// Same layout plus a numeric `seats` column
fn schema_with_seats() -> FeatureSchema {
    FeatureSchema::new(vec![
        FeatureDef::numeric("age").non_negative(),
        FeatureDef::numeric("usage").non_negative(),
        FeatureDef::numeric("seats"),
        FeatureDef::categorical("fuel"),
    ])
    .unwrap()
}

fn with_seats(mut record: RawRecord, seats: f64) -> RawRecord {
    record.insert("seats", seats);
    record
}

fn config(trees: usize) -> ValuationConfig {
    let mut config = ValuationConfig::default();
    config.forest.tree_count = trees;
    config
}

fn query(fuel: &str) -> RawRecord {
    RawRecord::new()
        .with("age", 5.0)
        .with("usage", 40_000.0)
        .with("fuel", fuel)
}

#[test]
fn test_end_to_end_synthetic_prices() {
    let (records, targets) = synthetic(200, 2024);
    let pipeline = ValuationPipeline::train(&schema(), &records, &targets, &config(100)).unwrap();

    let explanation = pipeline.explain(&query("electric")).unwrap();
    let attribution = &explanation.attribution;

    let lo = targets.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = targets.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!(
        explanation.prediction >= lo && explanation.prediction <= hi,
        "prediction {} outside [{lo}, {hi}]",
        explanation.prediction
    );

    let electric = attribution.get("fuel=electric").unwrap();
    let age = attribution.get("age").unwrap();
    assert!(electric > 0.0, "fuel=electric contribution {electric}");
    assert!(age < 0.0, "age contribution {age}");
    assert!(attribution.is_locally_accurate(1e-6));

    let names: Vec<&str> = attribution.contributions.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["age", "usage", "fuel=diesel", "fuel=electric", "fuel=petrol"]
    );
}

#[test]
fn test_local_accuracy_across_records() {
    let (records, targets) = synthetic(200, 11);
    let pipeline = ValuationPipeline::train(&schema(), &records, &targets, &config(30)).unwrap();

    for result in pipeline.explain_batch(&records[..50]) {
        let explanation = result.unwrap();
        let attribution = &explanation.attribution;
        let reconstructed = attribution.baseline + attribution.total();
        let tolerance = 1e-6 * explanation.prediction.abs().max(1.0);
        assert!(
            (reconstructed - explanation.prediction).abs() <= tolerance,
            "baseline + contributions = {reconstructed}, prediction = {}",
            explanation.prediction
        );
    }
}

#[test]
fn test_constant_feature_contributes_exactly_zero() {
    let (records, targets) = synthetic(120, 5);
    let records: Vec<RawRecord> = records.into_iter().map(|r| with_seats(r, 5.0)).collect();
    let state = pipeline::fit(&schema_with_seats(), &records, &targets, &config(20)).unwrap();

    let seats = &state.spec().numeric()[2];
    assert_eq!(seats.name, "seats");
    assert_eq!(seats.std_dev, 0.0);

    for record in [with_seats(query("petrol"), 5.0), with_seats(query("diesel"), 7.0)] {
        let explanation = state.explain(&record).unwrap();
        assert_eq!(explanation.attribution.get("seats"), Some(0.0));
    }
}

#[test]
fn test_unseen_category_encodes_to_zero_block() {
    let (records, targets) = synthetic(120, 9);
    let state = pipeline::fit(&schema(), &records, &targets, &config(10)).unwrap();

    let record = query("hydrogen");
    let encoded = state.encode(&record).unwrap();
    assert_eq!(&encoded.as_slice()[2..], &[0.0, 0.0, 0.0]);

    let explanation = state.explain(&record).unwrap();
    assert!(explanation.prediction.is_finite());
    assert!(explanation.attribution.is_locally_accurate(1e-6));
}

#[test]
fn test_wrong_width_is_schema_error() {
    let (records, targets) = synthetic(80, 3);
    let state = pipeline::fit(&schema(), &records, &targets, &config(5)).unwrap();
    let width = state.spec().encoded_width();

    let short = vec![0.0; width - 1];
    assert!(state.forest().predict(&short).unwrap_err().is_schema());
    assert!(shap::attribute(&short, state.spec(), state.forest())
        .unwrap_err()
        .is_schema());

    let long = vec![0.0; width + 2];
    assert!(state.forest().predict(&long).unwrap_err().is_schema());
}

#[test]
fn test_bootstrap_determinism() {
    let (records, targets) = synthetic(150, 21);
    let rows: Vec<_> = records
        .iter()
        .map(|r| schema().validate(r).unwrap())
        .collect();
    let spec = encoder::fit(&schema(), &rows).unwrap();
    let encoded: Vec<Vec<f64>> = encoder::transform_batch(&rows, &spec)
        .unwrap()
        .into_iter()
        .map(|e| e.into_vec())
        .collect();

    let params = config(12).forest;
    let first = carvault_core::Forest::fit(&encoded, &targets, &params).unwrap();
    let second = carvault_core::Forest::fit(&encoded, &targets, &params).unwrap();
    assert_eq!(first, second);

    let mut reseeded = params.clone();
    reseeded.seed += 1;
    let third = carvault_core::Forest::fit(&encoded, &targets, &reseeded).unwrap();
    assert_ne!(first, third);
}

#[test]
fn test_bad_training_value_names_field_and_row() {
    let (mut records, targets) = synthetic(30, 4);
    records[12].insert("usage", -5.0);

    match pipeline::fit(&schema(), &records, &targets, &config(5)) {
        Err(ValuationError::Data { field, reason }) => {
            assert_eq!(field, "usage");
            assert!(reason.contains("row 13"), "{reason}");
        }
        other => panic!("expected data error, got {other:?}"),
    }
}
