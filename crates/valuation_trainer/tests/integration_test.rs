//! Integration tests for the offline trainer
//!
//! Trains from CSV fixtures, reloads the written artifact and checks that
//! repeated runs produce identical forests.

use anyhow::Result;
use carvault_core::{ValuationConfig, ValuationPipeline, VehicleListing};
use carvault_trainer::{train_pipeline_from_csv, Dataset, TrainerError, ValuationTrainer};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const MODELS: [(&str, &str, f64); 4] = [
    ("Maruti", "Swift", 6.0),
    ("Hyundai", "Creta", 11.0),
    ("Honda", "City", 9.0),
    ("Tata", "Nexon", 8.5),
];

/// Listings export with a leading index column and the original headers
fn create_listings_csv(rows: usize) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        "index,KM Driven,Fuel Type,Transmission Type,Ownership,Selling Price (in Lakhs),Brand,Model_Only,Car Age"
    )?;

    for i in 0..rows {
        let (brand, model, base) = MODELS[i % MODELS.len()];
        let age = (i * 7 % 11) as f64;
        let km = (i * 3_917 % 140_000) as f64;
        let owners = i % 3 + 1;
        let fuel = ["Petrol", "Diesel", "CNG"][i % 3];
        let transmission = if i % 5 == 0 { "Automatic" } else { "Manual" };
        let price = base - 0.45 * age - 0.000015 * km - 0.3 * (owners - 1) as f64
            + if transmission == "Automatic" { 0.8 } else { 0.0 };
        writeln!(
            file,
            "{i},{km},{fuel},{transmission},{owners},{price:.3},{brand},{model},{age}"
        )?;
    }

    file.flush()?;
    Ok(file)
}

fn config() -> ValuationConfig {
    let mut config = ValuationConfig::default();
    config.forest.tree_count = 16;
    config.forest.max_depth = Some(8);
    config
}

#[test]
fn test_train_save_and_explain() -> Result<()> {
    let file = create_listings_csv(120)?;
    let dataset = Dataset::from_csv(file.path(), "Selling Price (in Lakhs)")?;
    assert_eq!(dataset.len(), 120);

    let output = TempDir::new()?;
    let report = ValuationTrainer::new(config()).train_and_save(&dataset, output.path())?;
    assert_eq!(report.rows, 120);
    assert_eq!(report.trees, 16);
    assert!(report.r_squared > 0.5, "R² {}", report.r_squared);

    let pipeline = ValuationPipeline::load(output.path())?;
    let explanation = pipeline.explain_listing(VehicleListing {
        km_driven: 30_000.0,
        fuel_type: "Diesel".into(),
        transmission_type: "Automatic".into(),
        ownership: 1,
        brand: "Hyundai".into(),
        model: "Creta".into(),
        model_year: 2021,
    })?;

    assert!(explanation.attribution.is_locally_accurate(1e-6));
    let grouped = explanation.attribution.grouped();
    let features: Vec<&str> = grouped.iter().map(|g| g.feature.as_str()).collect();
    assert_eq!(
        features,
        vec!["km_driven", "ownership", "car_age", "fuel_type", "transmission_type", "brand", "model"]
    );
    Ok(())
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let file = create_listings_csv(80)?;

    let first = train_pipeline_from_csv(file.path(), config())?;
    let second = train_pipeline_from_csv(file.path(), config())?;

    assert_eq!(first.forest(), second.forest(), "Forests should be identical");
    assert_eq!(first.spec(), second.spec(), "Specs should be identical");
    assert_eq!(first.metadata().target_column, "selling_price");
    Ok(())
}

#[test]
fn test_dataset_errors_are_reported() -> Result<()> {
    let missing = std::path::Path::new("does/not/exist.csv");
    match train_pipeline_from_csv(missing, config()) {
        Err(TrainerError::Dataset(msg)) => assert!(msg.contains("exist.csv"), "{msg}"),
        other => panic!("expected dataset error, got {other:?}"),
    }

    let mut file = NamedTempFile::new()?;
    writeln!(file, "km_driven,fuel_type,transmission_type,ownership,brand,model,car_age,selling_price")?;
    writeln!(file, "1000,Petrol,Manual,1,Maruti,Swift,-2,4.5")?;
    file.flush()?;
    match train_pipeline_from_csv(file.path(), config()) {
        Err(TrainerError::Data { field, reason }) => {
            assert_eq!(field, "car_age");
            assert!(reason.starts_with("row 1:"), "{reason}");
        }
        other => panic!("expected data error, got {other:?}"),
    }

    let mut file = NamedTempFile::new()?;
    writeln!(file, "km_driven,fuel_type,transmission_type,ownership,brand,model,car_age,selling_price")?;
    writeln!(file, "1000,Petrol,Manual,1,Maruti,Swift,2,cheap")?;
    file.flush()?;
    match train_pipeline_from_csv(file.path(), config()) {
        Err(TrainerError::Data { field, reason }) => {
            assert_eq!(field, "selling_price");
            assert!(reason.starts_with("line 2:"), "{reason}");
        }
        other => panic!("expected data error, got {other:?}"),
    }
    Ok(())
}
