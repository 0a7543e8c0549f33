//! Formula dialect translation.
//!
//! Column formulas and on-change rules are written in a small table-style
//! expression language: field names as bare words, `'single quoted'`
//! strings, `=`/`<>` comparisons and `AND`/`OR`/`NOT`. Before compiling
//! with Rhai they are rewritten here:
//!
//! - **Field names** (whole word, case-insensitive) → scope variables `col_<n>`
//!   where `n` is the column's schema position
//! - **Strings** `'it''s'` / `"say ""hi"""` → Rhai string literals
//! - **Operators** `<>` → `!=`, lone `=` → `==`, `AND`/`OR` → `&&`/`||`
//! - **Negation** `NOT a = b` → `!(a == b)`; the operand runs to the next
//!   `AND`/`OR`, argument separator or closing parenthesis at its own depth
//! - **Literals** `TRUE`/`FALSE` → `true`/`false`, `NULL` → `()`
//! - **Built-ins** are matched case-insensitively and rewritten to ALLCAPS
//!
//! Nothing inside a string literal is ever rewritten.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::schema::Schema;
use crate::builtins::BUILTIN_NAMES;

/// Stands in for `NOT` until the whole expression is assembled.
const NOT_MARK: char = '\u{1}';

/// Scope variable name for the column at `position`.
pub fn binding_name(position: usize) -> String {
    format!("col_{}", position)
}

/// Field-name matcher for one schema.
#[derive(Clone, Debug)]
pub struct FieldBindings {
    pattern: Option<Regex>,
    /// Lowercased field name → (schema position, declared name).
    fields: HashMap<String, (usize, String)>,
}

impl FieldBindings {
    /// Bindings for every data column of `schema`.
    pub fn new(schema: &Schema) -> FieldBindings {
        let mut fields = HashMap::new();
        for (position, column) in schema.data_columns() {
            fields
                .entry(column.field.to_lowercase())
                .or_insert((position, column.field.clone()));
        }

        // Longest names first so "Unit Price" wins over "Price".
        let mut names: Vec<&String> = fields.values().map(|(_, name)| name).collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let alternatives: Vec<String> = names.iter().map(|name| word_pattern(name)).collect();
        let pattern = if alternatives.is_empty() {
            None
        } else {
            Regex::new(&format!("(?i){}", alternatives.join("|"))).ok()
        };

        FieldBindings { pattern, fields }
    }

    /// Resolve a field name as written in a formula.
    pub fn lookup(&self, name: &str) -> Option<(usize, &str)> {
        self.fields
            .get(&name.to_lowercase())
            .map(|(position, field)| (*position, field.as_str()))
    }

    /// Replace field names in a code segment with their bindings.
    fn bind(&self, code: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return code.to_string();
        };
        pattern
            .replace_all(code, |caps: &regex::Captures| match self.lookup(&caps[0]) {
                Some((position, _)) => binding_name(position),
                None => caps[0].to_string(),
            })
            .to_string()
    }

    /// Declared names of the fields referenced in a code segment, in order of appearance.
    pub(crate) fn referenced(&self, code: &str) -> Vec<String> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        pattern
            .find_iter(code)
            .filter_map(|m| self.lookup(m.as_str()).map(|(_, field)| field.to_string()))
            .collect()
    }
}

fn word_pattern(name: &str) -> String {
    let escaped = regex::escape(name);
    let starts_word = name.chars().next().is_some_and(is_word_char);
    let ends_word = name.chars().last().is_some_and(is_word_char);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Piece of a formula: code to translate, or the text of a string literal.
#[derive(Debug, PartialEq)]
pub(crate) enum Segment<'a> {
    Code(&'a str),
    /// Unescaped contents; `closed` is false when the literal runs to end of input.
    Literal { text: String, closed: bool },
}

/// Split a formula into code and string-literal segments.
///
/// Both `'` and `"` delimit strings; a doubled delimiter inside a string
/// stands for one literal delimiter.
pub(crate) fn split_segments(formula: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut chars = formula.char_indices().peekable();
    let mut code_start = 0;

    while let Some((i, c)) = chars.next() {
        if c != '\'' && c != '"' {
            continue;
        }
        if code_start < i {
            segments.push(Segment::Code(&formula[code_start..i]));
        }

        let quote = c;
        let mut text = String::new();
        let mut closed = false;
        while let Some((_, ch)) = chars.next() {
            if ch == quote {
                if chars.peek().is_some_and(|&(_, next)| next == quote) {
                    chars.next();
                    text.push(quote);
                    continue;
                }
                closed = true;
                break;
            }
            text.push(ch);
        }
        segments.push(Segment::Literal { text, closed });
        code_start = chars.peek().map_or(formula.len(), |&(j, _)| j);
    }

    if code_start < formula.len() {
        segments.push(Segment::Code(&formula[code_start..]));
    }
    segments
}

/// Translate a formula into a Rhai expression.
pub fn preprocess_formula(formula: &str, bindings: &FieldBindings) -> String {
    let mut out = String::with_capacity(formula.len() + 16);
    for segment in split_segments(formula) {
        match segment {
            Segment::Code(code) => {
                let bound = bindings.bind(code);
                let words = translate_words(&bound);
                out.push_str(&translate_operators(&words));
            }
            Segment::Literal { text, closed } => {
                out.push('"');
                for ch in text.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(ch),
                    }
                }
                // Unterminated literals stay unterminated so compilation reports them.
                if closed {
                    out.push('"');
                }
            }
        }
    }
    close_negations(&out)
}

/// Expand each `NOT` mark into `!(` and close it where its operand ends.
fn close_negations(expr: &str) -> String {
    if !expr.contains(NOT_MARK) {
        return expr.to_string();
    }
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len() + 8);
    // Paren depth at which each open negation started.
    let mut open: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        match c {
            NOT_MARK => {
                out.push_str("!(");
                open.push(depth);
                i += 1;
                while chars.get(i).is_some_and(|ch| ch.is_whitespace()) {
                    i += 1;
                }
                continue;
            }
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                close_at(&mut out, &mut open, depth);
                depth = depth.saturating_sub(1);
            }
            ',' => close_at(&mut out, &mut open, depth),
            '&' if next == Some('&') => close_at(&mut out, &mut open, depth),
            '|' if next == Some('|') => close_at(&mut out, &mut open, depth),
            _ => {}
        }
        out.push(c);
        i += 1;
    }

    while open.pop().is_some() {
        push_close(&mut out);
    }
    out
}

fn close_at(out: &mut String, open: &mut Vec<usize>, depth: usize) {
    while open.last().is_some_and(|&d| d >= depth) {
        open.pop();
        push_close(out);
    }
}

/// Insert `)` before any trailing whitespace.
fn push_close(out: &mut String) {
    let end = out.trim_end().len();
    out.insert(end, ')');
}

fn keyword_re() -> &'static Regex {
    static KEYWORD_RE: OnceLock<Regex> = OnceLock::new();
    KEYWORD_RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("keyword regex must compile")
    })
}

fn translate_words(code: &str) -> String {
    keyword_re()
        .replace_all(code, |caps: &regex::Captures| {
            let word = &caps[0];
            let upper = word.to_ascii_uppercase();
            match upper.as_str() {
                "AND" => "&&".to_string(),
                "OR" => "||".to_string(),
                "NOT" => NOT_MARK.to_string(),
                "TRUE" => "true".to_string(),
                "FALSE" => "false".to_string(),
                "NULL" => "()".to_string(),
                _ if BUILTIN_NAMES.contains(&upper.as_str()) => upper,
                _ => word.to_string(),
            }
        })
        .to_string()
}

fn translate_operators(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();

        if c == '<' && next == Some('>') {
            out.push_str("!=");
            i += 2;
            continue;
        }
        if c == '=' && !matches!(prev, Some('<' | '>' | '!' | '=')) && next != Some('=') {
            out.push_str("==");
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}
