//! Error types for Rowline core.

use std::fmt;
use thiserror::Error;

use rowline_engine::EngineError;

/// A required field left empty, or another per-field problem found at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> FieldError {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur in the Rowline data source
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error at line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Rows can only be inserted at the tail; index {index} of {count} is not supported")]
    UnsupportedMutation { index: usize, count: usize },

    #[error("The new-row placeholder cannot be appended")]
    PlaceholderAppend,

    #[error("Field '{0}' is read-only")]
    ReadOnlyField(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Row is still loading")]
    LoadingRow,

    #[error("Placeholder is no longer the open row")]
    StalePlaceholder,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
