//! Error types for the calculation engine.

use thiserror::Error;

/// Errors raised while building or running the calculation engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Formula compile error in '{field}': {message}")]
    Compile { field: String, message: String },

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("Cannot convert {value} to {target}")]
    Coercion { value: String, target: String },

    #[error("Circular formula dependency: {}", path.join(" -> "))]
    CircularFormula { path: Vec<String> },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
