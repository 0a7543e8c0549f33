use super::schema::ColumnType;
use super::value::Value;

/// Format a value for display in a column of `kind`.
pub fn format_value(value: &Value, kind: ColumnType) -> String {
    match (value, kind) {
        (Value::Null, _) => String::new(),
        (Value::Decimal(n), ColumnType::Currency) => format_currency(*n),
        (Value::Integer(n), ColumnType::Currency) => format_currency(*n as f64),
        (Value::Decimal(n), _) => format_number(*n),
        (Value::Boolean(b), _) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        (Value::Date(d), _) => d.format("%d.%m.%Y").to_string(),
        (Value::DateTime(dt), _) => dt.format("%d.%m.%Y %H:%M").to_string(),
        (Value::Time(t), _) => t.format("%H:%M").to_string(),
        (other, _) => other.to_string(),
    }
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "#NAN!".to_string()
    } else if n.is_infinite() {
        "#INF!".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e10 {
        format!("{:.0}", n)
    } else {
        format!("{:.2}", n)
    }
}

fn format_currency(n: f64) -> String {
    if n.is_finite() {
        format!("{:.2}", n)
    } else {
        format_number(n)
    }
}
