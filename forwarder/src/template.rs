//! Named-placeholder substitution for destination URL templates.
//!
//! `http://example.com/track?lat={latitude}&lon={longitude:.5f}&t={fixTime}`
//!
//! `{{` and `}}` produce literal braces. Values are substituted verbatim,
//! without percent-encoding.

use std::collections::HashMap;
use thiserror::Error;

pub type TemplateValues = HashMap<&'static str, TemplateValue>;

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Known field with no value in this event
    Absent,
}

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("field {0:?} has no value in this event")]
    MissingValue(String),

    #[error("empty placeholder at offset {0}")]
    EmptyPlaceholder(usize),

    #[error("unclosed placeholder at offset {0}")]
    UnclosedPlaceholder(usize),

    #[error("single '}}' at offset {0}")]
    UnmatchedBrace(usize),

    #[error("unsupported format spec {spec:?} for field {field:?}")]
    UnsupportedFormat { field: String, spec: String },
}

pub fn render(template: &str, values: &TemplateValues) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(c);
                }
                if !closed {
                    return Err(TemplateError::UnclosedPlaceholder(offset));
                }
                out.push_str(&substitute(&placeholder, offset, values)?);
            }
            '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(TemplateError::UnmatchedBrace(offset)),
            c => out.push(c),
        }
    }

    Ok(out)
}

fn substitute(
    placeholder: &str,
    offset: usize,
    values: &TemplateValues,
) -> Result<String, TemplateError> {
    let (field, spec) = match placeholder.split_once(':') {
        Some((field, spec)) => (field.trim(), Some(spec)),
        None => (placeholder.trim(), None),
    };

    if field.is_empty() {
        return Err(TemplateError::EmptyPlaceholder(offset));
    }

    let value = values
        .get(field)
        .ok_or_else(|| TemplateError::UnknownField(field.to_string()))?;

    let precision = match spec {
        None => None,
        Some(spec) => Some(parse_precision(spec).ok_or_else(|| {
            TemplateError::UnsupportedFormat {
                field: field.to_string(),
                spec: spec.to_string(),
            }
        })?),
    };

    match (value, precision) {
        (TemplateValue::Absent, _) => Err(TemplateError::MissingValue(field.to_string())),
        (TemplateValue::Float(v), Some(p)) => Ok(format!("{v:.p$}")),
        (TemplateValue::Int(v), Some(p)) => Ok(format!("{:.p$}", *v as f64)),
        (_, Some(_)) => Err(TemplateError::UnsupportedFormat {
            field: field.to_string(),
            spec: spec.unwrap_or_default().to_string(),
        }),
        (value, None) => Ok(format_value(value)),
    }
}

/// Accepts `.Nf`
fn parse_precision(spec: &str) -> Option<usize> {
    spec.strip_prefix('.')?.strip_suffix('f')?.parse().ok()
}

fn format_value(value: &TemplateValue) -> String {
    match value {
        TemplateValue::Str(s) => s.clone(),
        TemplateValue::Int(i) => i.to_string(),
        // Shortest round-trip form, always with a fractional part (43.0, 43.5)
        TemplateValue::Float(f) => format!("{f:?}"),
        TemplateValue::Bool(b) => b.to_string(),
        TemplateValue::Absent => String::new(),
    }
}
