//! Lag, rolling, wind and calendar features in the naming scheme the regression models
//! were trained with.

pub mod builder;
pub mod matrix;
pub mod row;

pub use builder::{build_features, FeatureSet, LAG_HOURS, ROLLING_MIN_PERIODS, ROLLING_WINDOWS};
pub use matrix::FeatureMatrix;
pub use row::{CalendarFeatures, FeatureRow, RollingStats, WindComponents};
