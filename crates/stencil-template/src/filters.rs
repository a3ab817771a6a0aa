/*
 * filters.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in filters (`${value | name(args)}`).
//!
//! Filters are a closed whitelist; applying any other name is
//! [`TemplateError::UnknownFilter`].

use crate::error::{TemplateError, TemplateResult};
use crate::sandbox::{capitalize, join_capped, replace_capped, title_case};
use crate::value::{Args, Value, escape_html};

/// Names of every available filter.
pub const FILTER_NAMES: &[&str] = &[
    "abs",
    "capitalize",
    "count",
    "default",
    "e",
    "escape",
    "first",
    "float",
    "int",
    "join",
    "last",
    "length",
    "lower",
    "replace",
    "round",
    "safe",
    "string",
    "title",
    "trim",
    "upper",
];

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        })
}

pub(crate) fn length(value: &Value) -> TemplateResult<usize> {
    match value {
        Value::Str(s) | Value::Markup(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.len()),
        Value::Map(map) => Ok(map.len()),
        other => Err(TemplateError::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

/// Apply filter `name` to `value`.
pub fn apply_filter(name: &str, value: Value, args: &Args) -> TemplateResult<Value> {
    let result = match name {
        "safe" => match value {
            Value::Markup(_) => value,
            other => Value::Markup(other.to_string()),
        },
        "e" | "escape" => match value {
            Value::Markup(_) => value,
            other => Value::Markup(escape_html(&other.to_string())),
        },
        "upper" => Value::Str(value.to_string().to_uppercase()),
        "lower" => Value::Str(value.to_string().to_lowercase()),
        "title" => Value::Str(title_case(&value.to_string())),
        "capitalize" => Value::Str(capitalize(&value.to_string())),
        "trim" => Value::str(value.to_string().trim()),
        "default" => {
            let fallback = args
                .get(0, "default_value")
                .cloned()
                .unwrap_or_else(|| Value::str(""));
            let boolean = args.get(1, "boolean").is_some_and(Value::is_truthy);
            if value.is_none() || (boolean && !value.is_truthy()) {
                fallback
            } else {
                value
            }
        }
        "length" | "count" => {
            let n = length(&value)?;
            Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
        }
        "join" => {
            let separator = args
                .get(0, "d")
                .map(Value::to_string)
                .unwrap_or_default();
            match value {
                Value::List(items) => {
                    let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                    Value::Str(join_capped(&parts, &separator)?)
                }
                Value::Str(s) => {
                    let parts: Vec<String> = s.chars().map(String::from).collect();
                    Value::Str(join_capped(&parts, &separator)?)
                }
                other => {
                    return Err(TemplateError::type_error(format!(
                        "cannot join '{}'",
                        other.type_name()
                    )));
                }
            }
        }
        "first" => match value {
            Value::List(items) => items.into_iter().next().unwrap_or_default(),
            Value::Str(s) => s.chars().next().map(String::from).into(),
            other => {
                return Err(TemplateError::type_error(format!(
                    "'{}' object has no first item",
                    other.type_name()
                )));
            }
        },
        "last" => match value {
            Value::List(items) => items.into_iter().next_back().unwrap_or_default(),
            Value::Str(s) => s.chars().next_back().map(String::from).into(),
            other => {
                return Err(TemplateError::type_error(format!(
                    "'{}' object has no last item",
                    other.type_name()
                )));
            }
        },
        "string" => Value::Str(value.to_string()),
        "int" => {
            let fallback = args.get(0, "default").and_then(Value::as_int).unwrap_or(0);
            let n = match &value {
                Value::Int(i) => Some(*i),
                Value::Bool(b) => Some(i64::from(*b)),
                Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
                Value::Str(s) | Value::Markup(s) => parse_int(s),
                _ => None,
            };
            Value::Int(n.unwrap_or(fallback))
        }
        "float" => {
            let fallback = args.get(0, "default").and_then(Value::as_float).unwrap_or(0.0);
            let n = match &value {
                Value::Str(s) | Value::Markup(s) => s.trim().parse::<f64>().ok(),
                other => other.as_float(),
            };
            Value::Float(n.unwrap_or(fallback))
        }
        "round" => {
            let precision = args.get(0, "precision").and_then(Value::as_int).unwrap_or(0);
            let method = args
                .get(1, "method")
                .and_then(Value::as_str)
                .unwrap_or("common");
            let x = value.as_float().ok_or_else(|| {
                TemplateError::type_error(format!("cannot round '{}'", value.type_name()))
            })?;
            let exponent = i32::try_from(precision.clamp(-15, 15)).unwrap_or(0);
            let factor = 10f64.powi(exponent);
            let scaled = x * factor;
            let rounded = match method {
                "common" => scaled.round(),
                "floor" => scaled.floor(),
                "ceil" => scaled.ceil(),
                other => {
                    return Err(TemplateError::type_error(format!(
                        "method must be common, ceil or floor, not '{other}'"
                    )));
                }
            };
            Value::Float(rounded / factor)
        }
        "abs" => match value {
            Value::Int(i) => Value::Int(
                i.checked_abs()
                    .ok_or_else(|| TemplateError::type_error("integer overflow"))?,
            ),
            Value::Float(f) => Value::Float(f.abs()),
            other => {
                return Err(TemplateError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                )));
            }
        },
        "replace" => {
            let (Some(old), Some(new)) = (args.get(0, "old"), args.get(1, "new")) else {
                return Err(TemplateError::type_error("replace() needs old and new"));
            };
            let text = value.to_string();
            let replaced = replace_capped(&text, &old.to_string(), &new.to_string(), None)?;
            match value {
                Value::Markup(_) => Value::Markup(replaced),
                _ => Value::Str(replaced),
            }
        }
        _ => {
            return Err(TemplateError::UnknownFilter {
                name: name.to_string(),
            });
        }
    };
    Ok(result)
}
