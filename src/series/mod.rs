pub mod align;
pub mod error;
pub mod time_series;
