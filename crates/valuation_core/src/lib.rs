//! Explainable used-vehicle valuation
//!
//! Trains a bagged regression forest on tabular vehicle listings and
//! explains every price it predicts as a baseline plus one additive
//! contribution per encoded feature, computed with exact tree-SHAP.
//!
//! Modules:
//! - `record`: Raw records as received and validated rows
//! - `schema`: Declared features and the fitted encoded layout
//! - `encoder`: Standardization and one-hot encoding
//! - `deterministic`: Seeded generator and bootstrap sampling
//! - `tree` / `cart`: Regression tree structure and CART induction
//! - `forest`: Bagged ensemble fitted in parallel
//! - `shap`: Exact path-dependent attribution
//! - `state` / `pipeline`: Fitted state and the serving pipeline
//! - `artifact`: Hash-verified persistence of fitted state
//! - `vehicle`: The vehicle schema and typed listings
//! - `config`: TOML and environment configuration

pub mod artifact;
pub mod cart;
pub mod config;
pub mod deterministic;
pub mod encoder;
pub mod errors;
pub mod forest;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod serde_canon;
pub mod shap;
pub mod state;
pub mod tree;
pub mod vehicle;

pub use artifact::{ArtifactSummary, SavedArtifact};
pub use config::ValuationConfig;
pub use encoder::EncodedRecord;
pub use errors::{Result, ValuationError};
pub use forest::{Forest, ForestParams};
pub use pipeline::ValuationPipeline;
pub use record::{FieldValue, RawRecord, Row, Value};
pub use schema::{FeatureDef, FeatureKind, FeatureSchema, FeatureSpec};
pub use shap::{AttributionResult, FeatureContribution, GroupedContribution};
pub use state::{Explanation, FittedState, StateMetadata};
pub use tree::{Node, Tree};
pub use vehicle::{vehicle_schema, VehicleListing, VehicleRecord};

/// Crate version string recorded in reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
