/*
 * sandbox.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Attribute access policy.
//!
//! Every `.name`, `[key]` and method call in a template goes through this
//! module. Names starting with `_` are always rejected. Records are read only
//! through [`SandboxObject::get`] after their schema has declared the field
//! public. Built-in values expose a fixed set of read-only attributes and
//! side-effect-free methods; anything else is an error.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Timelike};

use crate::error::{TemplateError, TemplateResult};
use crate::value::{Args, FieldVisibility, SandboxObject, Value};

/// Prefix marking private attributes.
pub const PRIVATE_PREFIX: char = '_';

/// Maximum length of strings and lists built by size-multiplying operations.
pub const MAX_RANGE: usize = 100_000;

/// Reject a string of `len` bytes that would grow past [`MAX_RANGE`].
/// Results no longer than their `input` always pass.
pub fn check_len(len: usize, input: usize) -> TemplateResult<()> {
    if len > MAX_RANGE && len > input {
        return Err(TemplateError::LimitExceeded {
            what: "string length".to_string(),
            limit: MAX_RANGE,
        });
    }
    Ok(())
}

/// Join `parts` with `separator`, sizing the result before building it.
pub fn join_capped(parts: &[String], separator: &str) -> TemplateResult<String> {
    let input = parts.iter().fold(0usize, |acc, p| acc.saturating_add(p.len()));
    let separators = separator.len().saturating_mul(parts.len().saturating_sub(1));
    check_len(input.saturating_add(separators), input)?;
    Ok(parts.join(separator))
}

/// Replace up to `count` occurrences of `old`, sizing the result before building it.
pub fn replace_capped(
    s: &str,
    old: &str,
    new: &str,
    count: Option<usize>,
) -> TemplateResult<String> {
    // An empty pattern matches at every char boundary.
    let found = if old.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(old).count()
    };
    let hits = count.map_or(found, |n| n.min(found));
    let len = (s.len() - hits * old.len()).saturating_add(hits.saturating_mul(new.len()));
    check_len(len, s.len())?;
    Ok(match count {
        Some(n) => s.replacen(old, new, n),
        None => s.replace(old, new),
    })
}

/// Reject names that are private by convention.
pub fn check_name(name: &str) -> TemplateResult<()> {
    if name.starts_with(PRIVATE_PREFIX) {
        return Err(TemplateError::ForbiddenAttribute {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn unknown_attribute(value: &Value, name: &str) -> TemplateError {
    TemplateError::UnknownAttribute {
        type_name: value.type_name().to_string(),
        name: name.to_string(),
    }
}

/// Read a record field, enforcing the schema policy before touching the record.
fn object_field(object: &dyn SandboxObject, name: &str) -> TemplateResult<Value> {
    check_name(name)?;
    match object.visibility(name) {
        Some(FieldVisibility::Public) => object.get(name),
        Some(FieldVisibility::Private) => Err(TemplateError::ForbiddenAttribute {
            name: name.to_string(),
        }),
        None => Err(TemplateError::UnknownAttribute {
            type_name: object.model().to_string(),
            name: name.to_string(),
        }),
    }
}

/// Evaluate `value.name`.
pub fn get_attr(value: &Value, name: &str) -> TemplateResult<Value> {
    check_name(name)?;

    match value {
        Value::None => Ok(Value::None),
        Value::Object(object) => object_field(object.as_ref(), name),
        Value::Map(map) => Ok(map.get(name).cloned().unwrap_or_default()),
        Value::Date(date) => match name {
            "year" => Ok(Value::Int(i64::from(date.year()))),
            "month" => Ok(Value::Int(i64::from(date.month()))),
            "day" => Ok(Value::Int(i64::from(date.day()))),
            _ => Err(unknown_attribute(value, name)),
        },
        Value::DateTime(dt) => match name {
            "year" => Ok(Value::Int(i64::from(dt.year()))),
            "month" => Ok(Value::Int(i64::from(dt.month()))),
            "day" => Ok(Value::Int(i64::from(dt.day()))),
            "hour" => Ok(Value::Int(i64::from(dt.hour()))),
            "minute" => Ok(Value::Int(i64::from(dt.minute()))),
            "second" => Ok(Value::Int(i64::from(dt.second()))),
            _ => Err(unknown_attribute(value, name)),
        },
        _ => Err(unknown_attribute(value, name)),
    }
}

fn resolve_index(index: i64, len: usize) -> TemplateResult<usize> {
    let len = i64::try_from(len).map_err(|_| TemplateError::IndexOutOfRange { index })?;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| TemplateError::IndexOutOfRange { index })
    } else {
        Err(TemplateError::IndexOutOfRange { index })
    }
}

/// Evaluate `value[index]`.
pub fn get_item(value: &Value, index: &Value) -> TemplateResult<Value> {
    match (value, index) {
        (Value::None, _) => Ok(Value::None),
        (Value::List(items), _) => {
            let i = index.as_int().ok_or_else(|| {
                TemplateError::type_error(format!(
                    "list indices must be integers, not {}",
                    index.type_name()
                ))
            })?;
            Ok(items[resolve_index(i, items.len())?].clone())
        }
        (Value::Str(s) | Value::Markup(s), _) => {
            let i = index.as_int().ok_or_else(|| {
                TemplateError::type_error(format!(
                    "string indices must be integers, not {}",
                    index.type_name()
                ))
            })?;
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[resolve_index(i, chars.len())?].to_string()))
        }
        (Value::Map(map), Value::Str(key)) => {
            check_name(key)?;
            Ok(map.get(key).cloned().unwrap_or_default())
        }
        (Value::Object(object), Value::Str(key)) => object_field(object.as_ref(), key),
        _ => Err(TemplateError::type_error(format!(
            "'{}' object is not subscriptable by {}",
            value.type_name(),
            index.type_name()
        ))),
    }
}

fn arity(method: &str, args: &Args, min: usize, max: usize) -> TemplateResult<()> {
    if !args.keyword.is_empty() {
        return Err(TemplateError::type_error(format!(
            "{method}() takes no keyword arguments"
        )));
    }
    let n = args.positional.len();
    if n < min || n > max {
        return Err(TemplateError::type_error(format!(
            "{method}() takes {min} to {max} arguments ({n} given)"
        )));
    }
    Ok(())
}

fn str_arg<'v>(method: &str, value: &'v Value) -> TemplateResult<&'v str> {
    value.as_str().ok_or_else(|| {
        TemplateError::type_error(format!(
            "{method}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

/// Call a whitelisted method on a built-in value.
///
/// Returns `Ok(None)` when `name` is not a method of the receiver's type, so
/// the caller can fall back to attribute lookup.
pub fn call_method(receiver: &Value, name: &str, args: &Args) -> TemplateResult<Option<Value>> {
    check_name(name)?;
    match receiver {
        Value::Str(s) | Value::Markup(s) => string_method(s, name, args),
        Value::Map(map) => {
            let result = match name {
                "get" => {
                    arity(name, args, 1, 2)?;
                    let key = str_arg(name, &args.positional[0])?;
                    check_name(key)?;
                    map.get(key)
                        .cloned()
                        .or_else(|| args.positional.get(1).cloned())
                        .unwrap_or_default()
                }
                "keys" => {
                    arity(name, args, 0, 0)?;
                    Value::List(map.keys().map(|k| Value::str(k.as_str())).collect())
                }
                "values" => {
                    arity(name, args, 0, 0)?;
                    Value::List(map.values().cloned().collect())
                }
                "items" => {
                    arity(name, args, 0, 0)?;
                    Value::List(
                        map.iter()
                            .map(|(k, v)| Value::List(vec![Value::str(k.as_str()), v.clone()]))
                            .collect(),
                    )
                }
                _ => return Ok(None),
            };
            Ok(Some(result))
        }
        Value::Date(_) | Value::DateTime(_) if name == "strftime" => {
            arity(name, args, 1, 1)?;
            let format = str_arg(name, &args.positional[0])?;
            strftime(receiver, format).map(Some)
        }
        _ => Ok(None),
    }
}

/// Format a date or datetime without ever panicking on a bad pattern.
pub fn strftime(value: &Value, format: &str) -> TemplateResult<Value> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::type_error(format!(
            "invalid format string '{format}'"
        )));
    }

    let mut out = String::new();
    let written = match value {
        Value::Date(d) => write!(out, "{}", d.format_with_items(items.iter())),
        Value::DateTime(dt) => write!(out, "{}", dt.format_with_items(items.iter())),
        _ => {
            return Err(TemplateError::type_error(format!(
                "'{}' object has no attribute 'strftime'",
                value.type_name()
            )));
        }
    };
    // A date formatted with time specifiers fails here rather than panicking.
    written.map_err(|_| {
        TemplateError::type_error(format!(
            "format '{format}' does not apply to a {}",
            value.type_name()
        ))
    })?;
    Ok(Value::Str(out))
}

/// Python `str.title()`: uppercase the first letter of every alphabetic run.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Python `str.capitalize()`.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn strip_chars<'s>(s: &'s str, args: &Args, left: bool, right: bool) -> TemplateResult<&'s str> {
    let chars: Option<Vec<char>> = match args.positional.first() {
        None | Some(Value::None) => None,
        Some(value) => Some(str_arg("strip", value)?.chars().collect()),
    };
    let matches = |c: char| match &chars {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(matches);
    }
    if right {
        out = out.trim_end_matches(matches);
    }
    Ok(out)
}

fn affix_matches(method: &str, arg: &Value, test: impl Fn(&str) -> bool) -> TemplateResult<bool> {
    match arg {
        Value::List(options) => {
            for option in options {
                if test(str_arg(method, option)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Ok(test(str_arg(method, other)?)),
    }
}

fn string_method(s: &str, name: &str, args: &Args) -> TemplateResult<Option<Value>> {
    let result = match name {
        "upper" => {
            arity(name, args, 0, 0)?;
            Value::Str(s.to_uppercase())
        }
        "lower" => {
            arity(name, args, 0, 0)?;
            Value::Str(s.to_lowercase())
        }
        "title" => {
            arity(name, args, 0, 0)?;
            Value::Str(title_case(s))
        }
        "capitalize" => {
            arity(name, args, 0, 0)?;
            Value::Str(capitalize(s))
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(name, args, 0, 1)?;
            let left = name != "rstrip";
            let right = name != "lstrip";
            Value::str(strip_chars(s, args, left, right)?)
        }
        "replace" => {
            arity(name, args, 2, 3)?;
            let old = str_arg(name, &args.positional[0])?;
            let new = str_arg(name, &args.positional[1])?;
            let count = match args.positional.get(2).and_then(Value::as_int) {
                Some(count) if count >= 0 => Some(usize::try_from(count).unwrap_or(usize::MAX)),
                _ => None,
            };
            Value::Str(replace_capped(s, old, new, count)?)
        }
        "startswith" => {
            arity(name, args, 1, 1)?;
            Value::Bool(affix_matches(name, &args.positional[0], |p| s.starts_with(p))?)
        }
        "endswith" => {
            arity(name, args, 1, 1)?;
            Value::Bool(affix_matches(name, &args.positional[0], |p| s.ends_with(p))?)
        }
        "split" => {
            arity(name, args, 0, 2)?;
            let max_split = args
                .positional
                .get(1)
                .and_then(Value::as_int)
                .filter(|n| *n >= 0)
                .and_then(|n| usize::try_from(n).ok());
            let parts: Vec<Value> = match args.positional.first() {
                None | Some(Value::None) => {
                    let words = s.split_whitespace().map(Value::str);
                    match max_split {
                        Some(n) => words.take(n + 1).collect(),
                        None => words.collect(),
                    }
                }
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(TemplateError::type_error("empty separator"));
                    }
                    match max_split {
                        Some(n) => s.splitn(n + 1, sep).map(Value::str).collect(),
                        None => s.split(sep).map(Value::str).collect(),
                    }
                }
            };
            Value::List(parts)
        }
        "join" => {
            arity(name, args, 1, 1)?;
            let Value::List(items) = &args.positional[0] else {
                return Err(TemplateError::type_error(format!(
                    "can only join a list, not {}",
                    args.positional[0].type_name()
                )));
            };
            let parts: Vec<String> = items.iter().map(Value::to_string).collect();
            Value::Str(join_capped(&parts, s)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Partner {
        reads: AtomicUsize,
    }

    impl SandboxObject for Partner {
        fn model(&self) -> &str {
            "res.partner"
        }
        fn id(&self) -> Option<i64> {
            Some(1)
        }
        fn visibility(&self, name: &str) -> Option<FieldVisibility> {
            match name {
                "name" => Some(FieldVisibility::Public),
                "password" => Some(FieldVisibility::Private),
                _ => None,
            }
        }
        fn get(&self, name: &str) -> TemplateResult<Value> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Value::str(format!("value of {name}")))
        }
    }

    #[test]
    fn test_underscore_is_forbidden_everywhere() {
        let map = Value::from(json!({"_hidden": 1}));
        assert!(matches!(
            get_attr(&map, "_hidden"),
            Err(TemplateError::ForbiddenAttribute { .. })
        ));
        assert!(matches!(
            get_item(&map, &Value::str("_hidden")),
            Err(TemplateError::ForbiddenAttribute { .. })
        ));
        assert!(matches!(
            call_method(&Value::str("x"), "__class__", &Args::default()),
            Err(TemplateError::ForbiddenAttribute { .. })
        ));
    }

    #[test]
    fn test_private_field_never_reaches_record() {
        let partner = Arc::new(Partner::default());
        let value = Value::Object(partner.clone());

        let err = get_attr(&value, "password").unwrap_err();
        assert_eq!(
            err,
            TemplateError::ForbiddenAttribute {
                name: "password".to_string()
            }
        );
        assert!(get_item(&value, &Value::str("password")).is_err());
        assert!(matches!(
            get_attr(&value, "write"),
            Err(TemplateError::UnknownAttribute { .. })
        ));
        assert_eq!(partner.reads.load(Ordering::SeqCst), 0);

        assert_eq!(get_attr(&value, "name").unwrap(), Value::str("value of name"));
        assert_eq!(partner.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_none_propagates() {
        assert_eq!(get_attr(&Value::None, "email").unwrap(), Value::None);
        assert_eq!(get_item(&Value::None, &Value::Int(0)).unwrap(), Value::None);
    }

    #[test]
    fn test_map_missing_key_is_none() {
        let map = Value::from(json!({"lang": "fr_FR"}));
        assert_eq!(get_attr(&map, "lang").unwrap(), Value::str("fr_FR"));
        assert_eq!(get_attr(&map, "tz").unwrap(), Value::None);
    }

    #[test]
    fn test_list_indexing() {
        let list = Value::from(json!([10, 20, 30]));
        assert_eq!(get_item(&list, &Value::Int(-1)).unwrap(), Value::Int(30));
        assert_eq!(
            get_item(&list, &Value::Int(3)),
            Err(TemplateError::IndexOutOfRange { index: 3 })
        );
    }

    #[test]
    fn test_date_attributes() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date"));
        assert_eq!(get_attr(&date, "month").unwrap(), Value::Int(2));
        assert!(get_attr(&date, "hour").is_err());
    }

    #[test]
    fn test_string_methods() {
        let call = |s: &str, name: &str, args: Vec<Value>| {
            call_method(&Value::str(s), name, &Args::new(args))
                .unwrap()
                .unwrap()
        };
        assert_eq!(call("hello world", "title", vec![]), Value::str("Hello World"));
        assert_eq!(call("hELLO", "capitalize", vec![]), Value::str("Hello"));
        assert_eq!(call("  x  ", "strip", vec![]), Value::str("x"));
        assert_eq!(call("xxaxx", "lstrip", vec![Value::str("x")]), Value::str("axx"));
        assert_eq!(
            call("a,b,c", "split", vec![Value::str(",")]),
            Value::from(json!(["a", "b", "c"]))
        );
        assert_eq!(
            call(", ", "join", vec![Value::from(json!(["a", 1]))]),
            Value::str("a, 1")
        );
        assert_eq!(
            call("invoice.pdf", "endswith", vec![Value::from(json!([".doc", ".pdf"]))]),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_growing_strings_are_sized_before_building() {
        let limit = || TemplateError::LimitExceeded {
            what: "string length".to_string(),
            limit: MAX_RANGE,
        };
        let items = Value::List(vec![Value::str(""); 1_000]);
        let separator = Value::str("x".repeat(1_000));
        assert_eq!(
            call_method(&separator, "join", &Args::new(vec![items])),
            Err(limit())
        );

        let text = Value::str("a".repeat(1_000));
        let args = Args::new(vec![Value::str("a"), Value::str("b".repeat(1_000))]);
        assert_eq!(call_method(&text, "replace", &args), Err(limit()));
        let args = Args::new(vec![Value::str(""), Value::str("b".repeat(1_000))]);
        assert_eq!(call_method(&text, "replace", &args), Err(limit()));

        // A bounded count keeps the result small.
        let args = Args::new(vec![Value::str("a"), Value::str("b".repeat(1_000)), Value::Int(2)]);
        let replaced = call_method(&text, "replace", &args).unwrap().unwrap();
        assert_eq!(replaced.to_string().len(), 2_998);
    }

    #[test]
    fn test_replace_counts_match_std() {
        assert_eq!(replace_capped("abc", "", "-", None).unwrap(), "-a-b-c-");
        assert_eq!(replace_capped("aaaa", "aa", "b", None).unwrap(), "bb");
        assert_eq!(replace_capped("aaaa", "a", "bb", Some(1)).unwrap(), "bbaaa");
        assert_eq!(join_capped(&[], ",").unwrap(), "");

        // Shrinking or same-size results pass even above the cap.
        let big = "a".repeat(MAX_RANGE + 10);
        assert_eq!(replace_capped(&big, "a", "b", None).unwrap().len(), big.len());
        assert_eq!(join_capped(&[big.clone()], "xyz").unwrap(), big);
    }

    #[test]
    fn test_unlisted_methods_fall_through() {
        assert_eq!(
            call_method(&Value::str("x"), "format", &Args::default()).unwrap(),
            None
        );
        assert_eq!(
            call_method(&Value::Int(1), "bit_length", &Args::default()).unwrap(),
            None
        );
    }

    #[test]
    fn test_map_methods() {
        let map = Value::from(json!({"a": 1, "b": 2}));
        let keys = call_method(&map, "keys", &Args::default()).unwrap().unwrap();
        assert_eq!(keys, Value::from(json!(["a", "b"])));
        let got = call_method(&map, "get", &Args::new(vec![Value::str("z"), Value::Int(0)]))
            .unwrap()
            .unwrap();
        assert_eq!(got, Value::Int(0));
    }

    #[test]
    fn test_strftime_never_panics() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 7, 4).expect("valid date"));
        assert_eq!(strftime(&date, "%d/%m/%Y").unwrap(), Value::str("04/07/2024"));
        assert!(strftime(&date, "%Q").is_err());
        assert!(strftime(&date, "%H:%M").is_err());
    }
}
