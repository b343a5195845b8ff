pub mod adapter;
pub mod array;
pub mod config;
pub mod engine;
pub mod errors;
pub mod example_engines;
pub mod grid;

pub use adapter::{Bmi, ModelAdapter};
pub use errors::{BmiError, BmiResult};
