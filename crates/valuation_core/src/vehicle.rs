//! Vehicle valuation schema and typed records

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValuationError};
use crate::record::RawRecord;
use crate::schema::{FeatureDef, FeatureSchema};

pub const KM_DRIVEN: &str = "km_driven";
pub const OWNERSHIP: &str = "ownership";
pub const CAR_AGE: &str = "car_age";
pub const FUEL_TYPE: &str = "fuel_type";
pub const TRANSMISSION_TYPE: &str = "transmission_type";
pub const BRAND: &str = "brand";
pub const MODEL: &str = "model";

/// Training target column
pub const SELLING_PRICE: &str = "selling_price";

/// Default reference year used to turn a model year into an age
pub const DEFAULT_REFERENCE_YEAR: i32 = 2025;

/// The vehicle feature schema in declaration order
pub fn vehicle_schema() -> FeatureSchema {
    FeatureSchema::from_static(vec![
        FeatureDef::numeric(KM_DRIVEN).non_negative(),
        FeatureDef::numeric(OWNERSHIP).non_negative(),
        FeatureDef::numeric(CAR_AGE).non_negative(),
        FeatureDef::categorical(FUEL_TYPE),
        FeatureDef::categorical(TRANSMISSION_TYPE),
        FeatureDef::categorical(BRAND),
        FeatureDef::categorical(MODEL),
    ])
}

/// A used vehicle described by its age
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub km_driven: f64,
    pub fuel_type: String,
    pub transmission_type: String,
    /// Number of previous owners
    pub ownership: u32,
    pub brand: String,
    pub model: String,
    /// Age in years
    pub car_age: f64,
}

impl VehicleRecord {
    pub fn to_raw(&self) -> RawRecord {
        RawRecord::new()
            .with(KM_DRIVEN, self.km_driven)
            .with(FUEL_TYPE, self.fuel_type.as_str())
            .with(TRANSMISSION_TYPE, self.transmission_type.as_str())
            .with(OWNERSHIP, self.ownership)
            .with(BRAND, self.brand.as_str())
            .with(MODEL, self.model.as_str())
            .with(CAR_AGE, self.car_age)
    }
}

/// A used vehicle described by its model year, as a listing form collects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleListing {
    pub km_driven: f64,
    pub fuel_type: String,
    pub transmission_type: String,
    pub ownership: u32,
    pub brand: String,
    pub model: String,
    pub model_year: i32,
}

impl VehicleListing {
    /// Derive the age against the reference year the model was trained with
    pub fn into_record(self, reference_year: i32) -> Result<VehicleRecord> {
        if self.model_year > reference_year {
            return Err(ValuationError::data(
                "model_year",
                format!(
                    "{} is after the reference year {}",
                    self.model_year, reference_year
                ),
            ));
        }
        let age = reference_year.checked_sub(self.model_year).ok_or_else(|| {
            ValuationError::data(
                "model_year",
                format!(
                    "{} is too far before the reference year {}",
                    self.model_year, reference_year
                ),
            )
        })?;

        Ok(VehicleRecord {
            km_driven: self.km_driven,
            fuel_type: self.fuel_type,
            transmission_type: self.transmission_type,
            ownership: self.ownership,
            brand: self.brand,
            model: self.model,
            car_age: f64::from(age),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn listing(model_year: i32) -> VehicleListing {
        VehicleListing {
            km_driven: 50_000.0,
            fuel_type: "Petrol".into(),
            transmission_type: "Manual".into(),
            ownership: 1,
            brand: "Maruti".into(),
            model: "Swift".into(),
            model_year,
        }
    }

    #[test]
    fn test_schema_layout() {
        let schema = vehicle_schema();
        assert_eq!(schema.len(), 7);
        assert_eq!(schema.numeric().count(), 3);
        assert!(schema.numeric().all(|d| d.non_negative));
    }

    #[test]
    fn test_listing_age_uses_reference_year() {
        let record = listing(2018).into_record(2025).unwrap();
        assert_eq!(record.car_age, 7.0);

        let record = listing(2018).into_record(2020).unwrap();
        assert_eq!(record.car_age, 2.0);

        assert!(listing(2026).into_record(2025).unwrap_err().is_data());
    }

    #[test]
    fn test_extreme_model_year_is_data_error() {
        match listing(i32::MIN).into_record(2025) {
            Err(ValuationError::Data { field, .. }) => assert_eq!(field, "model_year"),
            other => panic!("expected data error, got {other:?}"),
        }
        assert_eq!(listing(0).into_record(2025).unwrap().car_age, 2025.0);
    }

    #[test]
    fn test_record_validates_against_schema() {
        let record = listing(2020).into_record(DEFAULT_REFERENCE_YEAR).unwrap();
        let row = vehicle_schema().validate(&record.to_raw()).unwrap();

        assert_eq!(row.values()[0], Value::Numeric(50_000.0));
        assert_eq!(row.values()[1], Value::Numeric(1.0));
        assert_eq!(row.values()[2], Value::Numeric(5.0));
        assert_eq!(row.values()[6], Value::Categorical("Swift".into()));
    }

    #[test]
    fn test_negative_usage_rejected() {
        let mut record = listing(2020).into_record(DEFAULT_REFERENCE_YEAR).unwrap();
        record.km_driven = -10.0;
        match vehicle_schema().validate(&record.to_raw()) {
            Err(ValuationError::Data { field, .. }) => assert_eq!(field, KM_DRIVEN),
            other => panic!("expected data error, got {other:?}"),
        }
    }
}
