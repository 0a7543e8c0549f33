//! Column schema and journal templates.
//!
//! A [`Template`] is what a journal is created from: a title, session
//! constants shown next to the table, and the ordered column list. The
//! calculation engine and the data source only ever see the [`Schema`]
//! derived from it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::value::Value;
use crate::error::{EngineError, Result};

/// Name of the synthetic identity column when a schema does not name one.
pub const DEFAULT_IDENTITY_FIELD: &str = "Id";

/// Declared type of a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[default]
    Text,
    /// Whole numbers.
    Number,
    /// Decimal amounts.
    Currency,
    Boolean,
    Date,
    DateTime,
    Time,
    Dropdown,
    DropdownEditable,
    /// Visual grouping only; carries no data.
    SectionHeader,
}

impl ColumnType {
    /// Columns whose values are free text (blank text counts as empty).
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            ColumnType::Text | ColumnType::Dropdown | ColumnType::DropdownEditable
        )
    }

    pub fn is_decorative(self) -> bool {
        self == ColumnType::SectionHeader
    }

    /// Value a fresh row gets when neither a default nor a session constant applies.
    pub fn default_value(self) -> Value {
        match self {
            ColumnType::Boolean => Value::Boolean(false),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Rule run when the owning column changes: recompute `target` from `expression`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecalcRule {
    #[serde(alias = "target_column")]
    pub target: String,
    pub expression: String,
}

/// One column of a journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub field: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ColumnType,
    #[serde(default)]
    pub default: Option<Value>,
    /// Session constant supplying the default for new rows.
    #[serde(default)]
    pub bind_constant: Option<String>,
    /// Read-only derived value.
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub on_change: Vec<RecalcRule>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

impl ColumnSchema {
    pub fn new(field: &str, kind: ColumnType) -> ColumnSchema {
        ColumnSchema {
            field: field.to_string(),
            header: None,
            kind,
            default: None,
            bind_constant: None,
            formula: None,
            on_change: Vec::new(),
            required: false,
            options: Vec::new(),
        }
    }

    pub fn with_formula(mut self, formula: &str) -> ColumnSchema {
        self.formula = Some(formula.to_string());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> ColumnSchema {
        self.default = Some(value.into());
        self
    }

    pub fn with_rule(mut self, target: &str, expression: &str) -> ColumnSchema {
        self.on_change.push(RecalcRule {
            target: target.to_string(),
            expression: expression.to_string(),
        });
        self
    }

    pub fn with_header(mut self, header: &str) -> ColumnSchema {
        self.header = Some(header.to_string());
        self
    }

    pub fn bound_to(mut self, constant: &str) -> ColumnSchema {
        self.bind_constant = Some(constant.to_string());
        self
    }

    pub fn required(mut self) -> ColumnSchema {
        self.required = true;
        self
    }

    pub fn has_formula(&self) -> bool {
        self.formula.as_deref().is_some_and(|f| !f.trim().is_empty())
    }

    /// Header text for messages, falling back to the field name.
    pub fn label(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.field)
    }
}

fn default_identity_field() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

/// The active column list of a journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Schema {
        Schema {
            columns,
            identity_field: default_identity_field(),
        }
    }

    pub fn with_identity_field(mut self, field: &str) -> Schema {
        self.identity_field = field.to_string();
        self
    }

    pub fn column(&self, field: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub fn is_identity(&self, field: &str) -> bool {
        field.eq_ignore_ascii_case(&self.identity_field)
    }

    pub fn is_formula(&self, field: &str) -> bool {
        self.column(field).is_some_and(ColumnSchema::has_formula)
    }

    /// Columns that carry row data: everything except section headers,
    /// unnamed columns and the identity column. Yields schema positions.
    pub fn data_columns(&self) -> impl Iterator<Item = (usize, &ColumnSchema)> + '_ {
        self.columns.iter().enumerate().filter(|(_, c)| {
            !c.kind.is_decorative() && !c.field.trim().is_empty() && !self.is_identity(&c.field)
        })
    }
}

/// A session constant: a per-journal value shown beside the table and
/// available as a default for bound columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConstant {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ColumnType,
    #[serde(default)]
    pub default: Option<Value>,
}

/// A journal template: title, session constants and columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub constants: Vec<SessionConstant>,
    pub columns: Vec<ColumnSchema>,
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
}

impl Template {
    pub fn from_toml_str(source: &str) -> Result<Template> {
        toml::from_str(source).map_err(|e| EngineError::Schema(e.to_string()))
    }

    pub fn schema(&self) -> Schema {
        Schema {
            columns: self.columns.clone(),
            identity_field: self.identity_field.clone(),
        }
    }

    /// Initial session values taken from constant defaults.
    pub fn default_session_values(&self) -> HashMap<String, Value> {
        self.constants
            .iter()
            .filter_map(|c| {
                let value = c.default.as_ref()?;
                let value = value.coerce(c.kind).unwrap_or_else(|_| value.clone());
                Some((c.key.clone(), value))
            })
            .collect()
    }
}

/// Explicitly owned cache of parsed templates, shared by every open view.
///
/// Clones share storage. Entries are invalidated by template id when a
/// template is updated.
#[derive(Clone, Default)]
pub struct SchemaCache {
    templates: Arc<DashMap<String, Arc<Template>>>,
}

impl SchemaCache {
    pub fn new() -> SchemaCache {
        SchemaCache::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.get(id).map(|t| t.value().clone())
    }

    /// Return the cached template, loading and caching it on a miss.
    pub fn get_or_load<F>(&self, id: &str, load: F) -> Result<Arc<Template>>
    where
        F: FnOnce() -> Result<Template>,
    {
        if let Some(template) = self.get(id) {
            return Ok(template);
        }
        // Load without holding a shard lock; the loader may consult the cache.
        let loaded = Arc::new(load()?);
        let entry = self
            .templates
            .entry(id.to_string())
            .or_insert_with(|| loaded.clone());
        Ok(entry.value().clone())
    }

    pub fn insert(&self, template: Template) -> Arc<Template> {
        let template = Arc::new(template);
        self.templates.insert(template.id.clone(), template.clone());
        template
    }

    /// Drop one template. Returns whether it was cached.
    pub fn invalidate(&self, id: &str) -> bool {
        self.templates.remove(id).is_some()
    }

    pub fn clear(&self) {
        self.templates.clear();
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE: &str = r#"
id = "invoice_simple"
title = "Simple invoice"

[[constants]]
key = "Company"
label = "Company name"
default = "Example Ltd"

[[columns]]
field = "Number"
type = "Number"
required = true

[[columns]]
field = "Section"
type = "SectionHeader"

[[columns]]
field = "Quantity"
type = "Number"
default = 1

[[columns]]
field = "Price"
type = "Currency"

[[columns.on_change]]
target = "Discount"
expression = "Price * 0.1"

[[columns]]
field = "Discount"
type = "Currency"

[[columns]]
field = "Total"
type = "Currency"
formula = "Quantity * Price"

[[columns]]
field = "Supplier"
bind_constant = "Company"
"#;

    #[test]
    fn test_template_from_toml() {
        let template = Template::from_toml_str(INVOICE).unwrap();
        assert_eq!(template.id, "invoice_simple");
        assert_eq!(template.columns.len(), 7);
        assert_eq!(template.identity_field, "Id");

        let schema = template.schema();
        let quantity = schema.column("Quantity").unwrap();
        assert_eq!(quantity.default, Some(Value::Integer(1)));
        assert_eq!(schema.column("Supplier").unwrap().kind, ColumnType::Text);
        assert!(schema.is_formula("Total"));
        assert_eq!(schema.column("Price").unwrap().on_change[0].target, "Discount");
    }

    #[test]
    fn test_data_columns_skip_headers_and_identity() {
        let schema = Schema::new(vec![
            ColumnSchema::new("id", ColumnType::Number),
            ColumnSchema::new("Group", ColumnType::SectionHeader),
            ColumnSchema::new("Name", ColumnType::Text),
        ]);
        let fields: Vec<&str> = schema.data_columns().map(|(_, c)| c.field.as_str()).collect();
        assert_eq!(fields, vec!["Name"]);
    }

    #[test]
    fn test_default_session_values() {
        let template = Template::from_toml_str(INVOICE).unwrap();
        let values = template.default_session_values();
        assert_eq!(values.get("Company"), Some(&Value::text("Example Ltd")));
    }

    #[test]
    fn test_invalid_template_is_schema_error() {
        let err = Template::from_toml_str("title = 3").unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));
    }

    #[test]
    fn test_schema_cache_loads_once_and_invalidates() {
        let cache = SchemaCache::new();
        let mut loads = 0;
        let first = cache
            .get_or_load("invoice_simple", || {
                loads += 1;
                Template::from_toml_str(INVOICE)
            })
            .unwrap();
        let second = cache
            .get_or_load("invoice_simple", || {
                loads += 1;
                Template::from_toml_str(INVOICE)
            })
            .unwrap();
        assert_eq!(loads, 1);
        assert!(Arc::ptr_eq(&first, &second));

        assert!(cache.invalidate("invoice_simple"));
        assert!(cache.is_empty());
        assert!(!cache.invalidate("invoice_simple"));
    }
}
