//! rowline_engine - Row model, column schema and Rhai-backed calculation engine.

pub(crate) mod builtins;
pub mod engine;
pub mod error;

pub use error::{EngineError, Result};
