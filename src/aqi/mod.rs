pub mod aggregate;
pub mod breakpoints;
pub mod category;
