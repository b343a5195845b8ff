use thiserror::Error;

/// Error type for invalid operations on a model adapter.
///
/// Each variant corresponds to one failure kind a driving framework may want
/// to branch on, e.g. aborting the run on [`BmiError::Configuration`] while
/// only skipping a query on [`BmiError::UnsupportedGrid`].
#[derive(Error, Debug)]
pub enum BmiError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Model has not been initialized or has already been finalized")]
    NotInitialized,
    #[error("Variable '{0}' is not reported by the model engine")]
    UnknownVariable(String),
    #[error("Grid operation '{operation}' is not applicable to a {grid_type} grid")]
    UnsupportedGrid {
        operation: &'static str,
        grid_type: String,
    },
    #[error("Wrong element type for '{name}'. Expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("Wrong shape for '{name}'. Expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Index {index:?} is out of range for shape {shape:?}")]
    IndexOutOfRange { index: Vec<usize>, shape: Vec<usize> },
    #[error("Cannot move backward in time. Target={target}, current={current}")]
    InvalidTime { target: f64, current: f64 },
    #[error("Operation '{0}' is not implemented")]
    NotImplemented(&'static str),
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Convenience type for `Result<T, BmiError>`.
pub type BmiResult<T> = Result<T, BmiError>;
