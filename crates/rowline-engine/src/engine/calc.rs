//! The calculation engine: derived columns and on-change rules.
//!
//! A [`Calculator`] is built once per schema. It compiles every formula and
//! rule up front, orders formula columns by their dependencies and rejects
//! schemas whose formulas read themselves.
//!
//! - [`Calculator::evaluate`] is the pure core: record in, derived and
//!   normalized values out.
//! - [`Calculator::recompute`] applies that to a [`Row`] with origin
//!   `Recompute`.
//! - [`Calculator::apply_rules`] runs the rules declared on one source field
//!   with origin `Rule`.

use rhai::{AST, Dynamic, Engine, INT, Scope};
use std::collections::HashMap;
use std::sync::Arc;

use super::cycle::{DependencyGraph, detect_cycle};
use super::deps::extract_dependencies;
use super::eval::{compile_formula, create_engine, eval_formula};
use super::preprocess::{FieldBindings, binding_name};
use super::row::{ChangeOrigin, Record, Row};
use super::schema::{ColumnSchema, ColumnType, Schema};
use super::value::Value;
use crate::error::{EngineError, Result};

struct CompiledFormula {
    position: usize,
    field: String,
    kind: ColumnType,
    /// None when the formula failed to compile; the column then evaluates to null.
    ast: Option<AST>,
}

struct CompiledRule {
    target: String,
    target_kind: ColumnType,
    ast: Option<AST>,
}

pub struct Calculator {
    schema: Arc<Schema>,
    engine: Engine,
    /// Formula columns in evaluation order.
    formulas: Vec<CompiledFormula>,
    /// Source field → rules, in declared order.
    rules: HashMap<String, Vec<CompiledRule>>,
}

impl Calculator {
    pub fn new(schema: Arc<Schema>) -> Result<Calculator> {
        let engine = create_engine();
        let bindings = FieldBindings::new(&schema);

        let mut graph = DependencyGraph::new();
        let mut declared = Vec::new();
        for (position, column) in schema.data_columns() {
            let Some(formula) = column.formula.as_deref().filter(|f| !f.trim().is_empty()) else {
                continue;
            };
            let deps = extract_dependencies(formula, &bindings)
                .into_iter()
                .filter(|dep| schema.is_formula(dep))
                .collect();
            graph.insert(column.field.clone(), deps);
            declared.push((position, column, formula));
        }

        for (_, column, _) in &declared {
            if let Some(path) = detect_cycle(&column.field, &graph) {
                return Err(EngineError::CircularFormula { path });
            }
        }

        let mut formulas = Vec::with_capacity(declared.len());
        for field in topo_order(&declared, &graph) {
            let Some((position, column, formula)) =
                declared.iter().find(|(_, c, _)| c.field == field)
            else {
                continue;
            };
            let ast = match compile_formula(&engine, &column.field, formula, &bindings) {
                Ok(ast) => Some(ast),
                Err(e) => {
                    log::warn!("{}", e);
                    None
                }
            };
            formulas.push(CompiledFormula {
                position: *position,
                field: column.field.clone(),
                kind: column.kind,
                ast,
            });
        }

        let mut rules: HashMap<String, Vec<CompiledRule>> = HashMap::new();
        for (_, column) in schema.data_columns() {
            for rule in &column.on_change {
                let Some(target) = schema.column(&rule.target) else {
                    log::warn!(
                        "rule on {} targets unknown column {}",
                        column.field,
                        rule.target
                    );
                    continue;
                };
                let ast = match compile_formula(&engine, &rule.target, &rule.expression, &bindings)
                {
                    Ok(ast) => Some(ast),
                    Err(e) => {
                        log::warn!("rule on {}: {}", column.field, e);
                        None
                    }
                };
                rules
                    .entry(column.field.clone())
                    .or_default()
                    .push(CompiledRule {
                        target: target.field.clone(),
                        target_kind: target.kind,
                        ast,
                    });
            }
        }

        Ok(Calculator {
            schema,
            engine,
            formulas,
            rules,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Formula fields in the order they are evaluated.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.formulas.iter().map(|f| f.field.as_str()).collect()
    }

    /// Derive every formula column from `record`.
    ///
    /// The result holds, for each data column, the value the row should
    /// carry: formula results coerced to the column type (null on any
    /// evaluation or coercion error), and non-formula values normalized to
    /// their column type. Non-formula values that do not coerce are left out
    /// so the raw input survives.
    pub fn evaluate(&self, record: &Record) -> Record {
        let mut out = Record::new();
        let mut scope = Scope::new();

        for (position, column) in self.schema.data_columns() {
            if column.has_formula() {
                scope.push_dynamic(binding_name(position), Dynamic::UNIT);
                continue;
            }
            let raw = record.get(&column.field).cloned().unwrap_or_default();
            let binding = match raw.coerce(column.kind) {
                Ok(value) => {
                    let binding = value.to_dynamic();
                    out.insert(column.field.clone(), value);
                    binding
                }
                Err(e) => {
                    log::debug!("{}: {}", column.field, e);
                    Dynamic::UNIT
                }
            };
            scope.push_dynamic(binding_name(position), binding);
        }

        for formula in &self.formulas {
            let value = self.eval_formula_column(formula, &mut scope);
            if let Some(slot) = scope.get_mut(&binding_name(formula.position)) {
                *slot = value.to_dynamic();
            }
            out.insert(formula.field.clone(), value);
        }

        // Keep schema order in the output.
        out.sort_by(|a, _, b, _| self.schema.position(a).cmp(&self.schema.position(b)));
        out
    }

    fn eval_formula_column(&self, formula: &CompiledFormula, scope: &mut Scope) -> Value {
        let Some(ast) = &formula.ast else {
            return Value::Null;
        };
        let result = eval_formula(&self.engine, ast, scope).and_then(|v| v.coerce(formula.kind));
        match result {
            Ok(value) => value,
            Err(e) => {
                log::debug!("formula {}: {}", formula.field, e);
                Value::Null
            }
        }
    }

    /// Recompute derived columns of `row` in place. Returns how many fields changed.
    pub fn recompute(&self, row: &Row) -> usize {
        if row.is_loading() {
            return 0;
        }
        let mut changed = 0;
        for (field, value) in self.evaluate(&row.to_record()) {
            if row.set_with_origin(&field, value, ChangeOrigin::Recompute) {
                changed += 1;
            }
        }
        changed
    }

    /// Run the on-change rules declared on `source` against `row`.
    ///
    /// Every column is bound with its current value; nulls are bound as `0`.
    /// Returns how many targets changed. Failing rules are logged and skipped.
    pub fn apply_rules(&self, source: &str, row: &Row) -> Result<usize> {
        if self.schema.column(source).is_none() {
            return Err(EngineError::UnknownColumn(source.to_string()));
        }
        let Some(rules) = self.rules.get(source) else {
            return Ok(0);
        };

        let mut changed = 0;
        for rule in rules {
            let Some(ast) = &rule.ast else {
                continue;
            };
            // Rebuilt per rule so later rules see earlier results.
            let mut scope = self.rule_scope(row);
            let result = eval_formula(&self.engine, ast, &mut scope)
                .and_then(|v| v.coerce(rule.target_kind));
            match result {
                Ok(value) => {
                    if row.set_with_origin(&rule.target, value, ChangeOrigin::Rule) {
                        changed += 1;
                    }
                }
                Err(e) => log::warn!("rule {} -> {}: {}", source, rule.target, e),
            }
        }
        Ok(changed)
    }

    fn rule_scope(&self, row: &Row) -> Scope<'static> {
        let mut scope = Scope::new();
        for (position, column) in self.schema.data_columns() {
            let raw = row.get(&column.field);
            // Rule arithmetic sees null as 0 and booleans as 0/1.
            let binding = match raw.coerce(column.kind).unwrap_or(raw) {
                Value::Null => Dynamic::from(0 as INT),
                Value::Boolean(b) => Dynamic::from(b as INT),
                value => value.to_dynamic(),
            };
            scope.push_dynamic(binding_name(position), binding);
        }
        scope
    }
}

/// Topological order of formula fields; ties go to declaration order.
fn topo_order(
    declared: &[(usize, &ColumnSchema, &str)],
    graph: &DependencyGraph,
) -> Vec<String> {
    let mut done: Vec<String> = Vec::with_capacity(declared.len());
    while done.len() < declared.len() {
        let next = declared.iter().find(|(_, column, _)| {
            !done.contains(&column.field)
                && graph
                    .get(&column.field)
                    .is_none_or(|deps| deps.iter().all(|d| done.contains(d)))
        });
        match next {
            Some((_, column, _)) => done.push(column.field.clone()),
            // Unreachable for acyclic graphs.
            None => break,
        }
    }
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::row::EventQueue;

    fn invoice() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            ColumnSchema::new("Id", ColumnType::Number),
            ColumnSchema::new("Quantity", ColumnType::Number),
            ColumnSchema::new("Price", ColumnType::Currency).with_rule("Discount", "Price * 0.1"),
            ColumnSchema::new("Discount", ColumnType::Currency),
            ColumnSchema::new("Total", ColumnType::Currency).with_formula("Quantity * Price"),
        ]))
    }

    #[test]
    fn test_recompute_total() {
        let calc = Calculator::new(invoice()).unwrap();
        let row = Row::new();
        row.set("Quantity", 3_i64);
        row.set("Price", 2.5);
        calc.recompute(&row);
        assert_eq!(row.get("Total"), Value::Decimal(7.5));
    }

    #[test]
    fn test_rule_sets_discount_and_recompute_keeps_it() {
        let calc = Calculator::new(invoice()).unwrap();
        let row = Row::new();
        row.set("Price", 100_i64);

        assert_eq!(calc.apply_rules("Price", &row).unwrap(), 1);
        assert_eq!(row.get("Discount"), Value::Decimal(10.0));

        calc.recompute(&row);
        assert_eq!(row.get("Discount"), Value::Decimal(10.0));
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let calc = Calculator::new(invoice()).unwrap();
        let record = Record::from([
            ("Quantity".to_string(), Value::text("4")),
            ("Price".to_string(), Value::Decimal(1.25)),
        ]);
        let first = calc.evaluate(&record);
        let second = calc.evaluate(&record);
        assert_eq!(first, second);
        assert_eq!(first.get("Quantity"), Some(&Value::Integer(4)));
        assert_eq!(first.get("Total"), Some(&Value::Decimal(5.0)));
        assert!(!first.contains_key("Id"));
    }

    #[test]
    fn test_recompute_writes_with_recompute_origin() {
        let calc = Calculator::new(invoice()).unwrap();
        let queue = EventQueue::new();
        let row = Row::new();
        row.set("Quantity", 2_i64);
        row.set("Price", 1.0);
        row.subscribe(&queue);

        calc.recompute(&row);
        let events = queue.drain();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.origin() == ChangeOrigin::Recompute));
    }

    #[test]
    fn test_division_by_zero_yields_null() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("A", ColumnType::Number),
            ColumnSchema::new("B", ColumnType::Number),
            ColumnSchema::new("Ratio", ColumnType::Currency).with_formula("A / B"),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("A", 1_i64);
        row.set("B", 0_i64);
        row.set("Ratio", 9.0);
        calc.recompute(&row);
        assert_eq!(row.get("Ratio"), Value::Null);
    }

    #[test]
    fn test_coercion_failure_keeps_raw_input() {
        let calc = Calculator::new(invoice()).unwrap();
        let row = Row::new();
        row.set("Quantity", "lots");
        row.set("Price", 2.0);
        calc.recompute(&row);
        assert_eq!(row.get("Quantity"), Value::text("lots"));
        assert_eq!(row.get("Total"), Value::Null);
    }

    #[test]
    fn test_formula_dependency_order() {
        // Gross is declared before the Net it reads.
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("Gross", ColumnType::Currency).with_formula("Net * 2"),
            ColumnSchema::new("Amount", ColumnType::Currency),
            ColumnSchema::new("Net", ColumnType::Currency).with_formula("Amount + 1"),
        ]));
        let calc = Calculator::new(schema).unwrap();
        assert_eq!(calc.evaluation_order(), vec!["Net", "Gross"]);

        let row = Row::new();
        row.set("Amount", 4.0);
        calc.recompute(&row);
        assert_eq!(row.get("Net"), Value::Decimal(5.0));
        assert_eq!(row.get("Gross"), Value::Decimal(10.0));
    }

    #[test]
    fn test_circular_formulas_are_rejected() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("A", ColumnType::Number).with_formula("B + 1"),
            ColumnSchema::new("B", ColumnType::Number).with_formula("A + 1"),
        ]));
        let err = Calculator::new(schema).err().unwrap();
        assert!(matches!(err, EngineError::CircularFormula { ref path } if path.len() == 3));
    }

    #[test]
    fn test_compile_error_evaluates_to_null() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("A", ColumnType::Number),
            ColumnSchema::new("Broken", ColumnType::Number).with_formula("A +* 2"),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("A", 1_i64);
        calc.recompute(&row);
        assert_eq!(row.get("Broken"), Value::Null);
    }

    #[test]
    fn test_rules_bind_null_as_zero() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("A", ColumnType::Number).with_rule("C", "A + B"),
            ColumnSchema::new("B", ColumnType::Number),
            ColumnSchema::new("C", ColumnType::Number),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("A", 5_i64);
        calc.apply_rules("A", &row).unwrap();
        assert_eq!(row.get("C"), Value::Integer(5));
    }

    #[test]
    fn test_rules_bind_booleans_as_numbers() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("Price", ColumnType::Currency),
            ColumnSchema::new("Paid", ColumnType::Boolean).with_rule("Due", "Price - Paid * Price"),
            ColumnSchema::new("Due", ColumnType::Currency),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("Price", 10.0);
        row.set("Paid", true);
        assert_eq!(calc.apply_rules("Paid", &row).unwrap(), 1);
        assert_eq!(row.get("Due"), Value::Decimal(0.0));

        row.set("Paid", false);
        calc.apply_rules("Paid", &row).unwrap();
        assert_eq!(row.get("Due"), Value::Decimal(10.0));
    }

    #[test]
    fn test_not_negates_whole_comparison() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("Price", ColumnType::Currency),
            ColumnSchema::new("Cheap", ColumnType::Number)
                .with_formula("IIF(NOT Price > 100, 1, 0)"),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("Price", 50.0);
        calc.recompute(&row);
        assert_eq!(row.get("Cheap"), Value::Integer(1));

        row.set("Price", 150.0);
        calc.recompute(&row);
        assert_eq!(row.get("Cheap"), Value::Integer(0));
    }

    #[test]
    fn test_rules_with_unknown_target_are_skipped() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("A", ColumnType::Number).with_rule("Missing", "A * 2"),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("A", 2_i64);
        assert_eq!(calc.apply_rules("A", &row).unwrap(), 0);
        assert!(!row.contains_key("Missing"));
        assert!(calc.apply_rules("Nope", &row).is_err());
    }

    #[test]
    fn test_string_formulas() {
        let schema = Arc::new(Schema::new(vec![
            ColumnSchema::new("First", ColumnType::Text),
            ColumnSchema::new("Last", ColumnType::Text),
            ColumnSchema::new("Full", ColumnType::Text)
                .with_formula("IIF(Last = '', First, First + ' ' + Last)"),
        ]));
        let calc = Calculator::new(schema).unwrap();
        let row = Row::new();
        row.set("First", "Ada");
        row.set("Last", "Lovelace");
        calc.recompute(&row);
        assert_eq!(row.get("Full"), Value::text("Ada Lovelace"));
    }
}
