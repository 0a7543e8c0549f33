//! Journal calculation engine API.
//!
//! - [`Value`], [`Row`], [`Record`] - Field values and change-notifying rows
//! - [`Schema`], [`ColumnSchema`], [`Template`], [`SchemaCache`] - Column schema and templates
//! - [`preprocess_formula`] - Translate formulas for Rhai evaluation
//! - [`extract_dependencies`] - Parse formula dependencies
//! - [`detect_cycle`] - Circular dependency detection
//! - [`create_engine`] - Create a Rhai engine with built-in functions
//! - [`Calculator`] - Derived columns and on-change rules
//! - [`format_value`] - Format values for display

mod calc;
mod cycle;
mod deps;
mod eval;
mod format;
mod preprocess;
mod row;
mod schema;
mod value;

pub use calc::Calculator;
pub use cycle::{DependencyGraph, detect_cycle};
pub use deps::extract_dependencies;
pub use eval::{compile_formula, create_engine, eval_formula};
pub use format::{format_number, format_value};
pub use preprocess::{FieldBindings, binding_name, preprocess_formula};
pub use row::{
    ChangeOrigin, EventQueue, INTERNAL_KEY_PREFIX, Record, Row, RowEvent, RowKind,
    is_internal_key,
};
pub use schema::{
    ColumnSchema, ColumnType, DEFAULT_IDENTITY_FIELD, RecalcRule, Schema, SchemaCache,
    SessionConstant, Template,
};
pub use value::Value;

pub use rhai::{AST, Dynamic};
