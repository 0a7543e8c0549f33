//! Rhai engine creation and formula evaluation.
//!
//! Formulas are preprocessed into Rhai expressions, compiled once and then
//! evaluated against a [`Scope`] holding one typed binding per column.
//! Values are never spliced into the expression text.

use rhai::{AST, Dynamic, Engine, Scope};

use super::preprocess::{FieldBindings, preprocess_formula};
use super::value::Value;
use crate::error::{EngineError, Result};

/// Create a Rhai engine with built-ins registered.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();
    // Registered operator overloads only apply with fast operators off.
    engine.set_fast_operators(false);
    crate::builtins::register_builtins(&mut engine);
    engine
}

/// Translate and compile a formula written against `bindings`.
pub fn compile_formula(
    engine: &Engine,
    field: &str,
    formula: &str,
    bindings: &FieldBindings,
) -> Result<AST> {
    let script = preprocess_formula(formula, bindings);
    engine
        .compile_expression(&script)
        .map_err(|e| EngineError::Compile {
            field: field.to_string(),
            message: e.to_string(),
        })
}

/// Evaluate a compiled formula. Non-finite results are errors.
pub fn eval_formula(engine: &Engine, ast: &AST, scope: &mut Scope) -> Result<Value> {
    let result = engine
        .eval_ast_with_scope::<Dynamic>(scope, ast)
        .map_err(|e| EngineError::Eval(e.to_string()))?;
    Value::from_dynamic(result)
}
