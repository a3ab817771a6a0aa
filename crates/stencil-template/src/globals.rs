/*
 * globals.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in global helpers available in every environment.
//!
//! These are the only callables a template can reach besides the helpers the
//! host binds per render. None of them has side effects.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use url::form_urlencoded;

use crate::delta::RelativeDelta;
use crate::error::{TemplateError, TemplateResult};
use crate::filters::{apply_filter, length};
use crate::value::{Args, Helper, Value};

type BuiltinFn = fn(&Args) -> TemplateResult<Value>;

fn builtin(name: &'static str, func: BuiltinFn) -> (String, Value) {
    (name.to_string(), Value::Function(Helper::new(name, func)))
}

/// Build the global table shared by all environments.
pub fn builtin_globals() -> BTreeMap<String, Value> {
    let namespace: BTreeMap<String, Value> = [
        builtin("now", now),
        builtin("today", today),
        builtin("date", date),
        builtin("datetime", datetime),
    ]
    .into_iter()
    .collect();

    let mut globals: BTreeMap<String, Value> = [
        builtin("str", str_),
        builtin("len", len),
        builtin("abs", abs),
        builtin("min", min),
        builtin("max", max),
        builtin("sum", sum),
        builtin("round", round),
        builtin("filter", filter),
        builtin("map", map),
        builtin("reduce", reduce),
        builtin("quote", quote),
        builtin("urlencode", urlencode),
        builtin("relativedelta", relativedelta),
    ]
    .into_iter()
    .collect();
    globals.insert("datetime".to_string(), Value::Map(namespace));
    globals
}

fn required<'a>(
    args: &'a Args,
    index: usize,
    name: &str,
    func: &str,
) -> TemplateResult<&'a Value> {
    args.get(index, name).ok_or_else(|| {
        TemplateError::type_error(format!("{func}() missing required argument '{name}'"))
    })
}

fn int_arg(args: &Args, index: usize, name: &str, func: &str) -> TemplateResult<Option<i64>> {
    match args.get(index, name) {
        None | Some(Value::None) => Ok(None),
        Some(value) => value.as_int().map(Some).ok_or_else(|| {
            TemplateError::type_error(format!(
                "{func}() argument '{name}' must be int, not {}",
                value.type_name()
            ))
        }),
    }
}

fn list_arg<'a>(value: &'a Value, func: &str) -> TemplateResult<&'a [Value]> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(TemplateError::type_error(format!(
            "{func}() argument must be a list, not {}",
            other.type_name()
        ))),
    }
}

fn callable<'a>(value: &'a Value, func: &str) -> TemplateResult<&'a Helper> {
    match value {
        Value::Function(helper) => Ok(helper),
        other => Err(TemplateError::NotCallable {
            type_name: format!("{} (in {func}())", other.type_name()),
        }),
    }
}

fn str_(args: &Args) -> TemplateResult<Value> {
    Ok(Value::Str(
        args.positional.first().map(Value::to_string).unwrap_or_default(),
    ))
}

fn len(args: &Args) -> TemplateResult<Value> {
    let n = length(required(args, 0, "obj", "len")?)?;
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn abs(args: &Args) -> TemplateResult<Value> {
    apply_filter("abs", required(args, 0, "x", "abs")?.clone(), &Args::default())
}

fn extreme(args: &Args, func: &str, wanted: Ordering) -> TemplateResult<Value> {
    let candidates: &[Value] = match args.positional.as_slice() {
        [single] => list_arg(single, func)?,
        many => many,
    };
    let mut best: Option<&Value> = None;
    for candidate in candidates {
        best = match best {
            None => Some(candidate),
            Some(current) => match candidate.compare(current) {
                Some(ordering) if ordering == wanted => Some(candidate),
                Some(_) => Some(current),
                None => {
                    return Err(TemplateError::type_error(format!(
                        "'{func}' not supported between '{}' and '{}'",
                        candidate.type_name(),
                        current.type_name()
                    )));
                }
            },
        };
    }
    best.cloned()
        .ok_or_else(|| TemplateError::type_error(format!("{func}() arg is an empty sequence")))
}

fn min(args: &Args) -> TemplateResult<Value> {
    extreme(args, "min", Ordering::Less)
}

fn max(args: &Args) -> TemplateResult<Value> {
    extreme(args, "max", Ordering::Greater)
}

fn sum(args: &Args) -> TemplateResult<Value> {
    let items = list_arg(required(args, 0, "iterable", "sum")?, "sum")?;
    let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
    for item in items {
        total = match (&total, item) {
            (Value::Int(a), Value::Int(b)) => Value::Int(
                a.checked_add(*b)
                    .ok_or_else(|| TemplateError::type_error("integer overflow"))?,
            ),
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Value::Float(x + y),
                _ => {
                    return Err(TemplateError::type_error(format!(
                        "unsupported operand type(s) for +: '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    )));
                }
            },
        };
    }
    Ok(total)
}

fn round(args: &Args) -> TemplateResult<Value> {
    let number = required(args, 0, "number", "round")?;
    let x = number.as_float().ok_or_else(|| {
        TemplateError::type_error(format!(
            "type {} doesn't define __round__ method",
            number.type_name()
        ))
    })?;
    match int_arg(args, 1, "ndigits", "round")? {
        None => {
            let rounded = x.round_ties_even();
            if !rounded.is_finite() || rounded.abs() >= 9.2e18 {
                return Err(TemplateError::type_error("cannot convert float to integer"));
            }
            Ok(Value::Int(rounded as i64))
        }
        Some(digits) => {
            if let Value::Int(_) = number {
                if digits >= 0 {
                    return Ok(number.clone());
                }
            }
            let exponent = i32::try_from(digits.clamp(-15, 15)).unwrap_or(0);
            let factor = 10f64.powi(exponent);
            Ok(Value::Float((x * factor).round_ties_even() / factor))
        }
    }
}

fn filter(args: &Args) -> TemplateResult<Value> {
    let predicate = required(args, 0, "function", "filter")?;
    let items = list_arg(required(args, 1, "iterable", "filter")?, "filter")?;
    let mut kept = Vec::new();
    for item in items {
        let keep = match predicate {
            Value::None => item.is_truthy(),
            other => callable(other, "filter")?
                .call(&Args::new(vec![item.clone()]))?
                .is_truthy(),
        };
        if keep {
            kept.push(item.clone());
        }
    }
    Ok(Value::List(kept))
}

fn map(args: &Args) -> TemplateResult<Value> {
    let helper = callable(required(args, 0, "function", "map")?, "map")?;
    let items = list_arg(required(args, 1, "iterable", "map")?, "map")?;
    let mapped = items
        .iter()
        .map(|item| helper.call(&Args::new(vec![item.clone()])))
        .collect::<TemplateResult<Vec<_>>>()?;
    Ok(Value::List(mapped))
}

fn reduce(args: &Args) -> TemplateResult<Value> {
    let helper = callable(required(args, 0, "function", "reduce")?, "reduce")?;
    let items = list_arg(required(args, 1, "iterable", "reduce")?, "reduce")?;
    let mut iter = items.iter();
    let mut acc = match args.get(2, "initial") {
        Some(initial) => initial.clone(),
        None => iter.next().cloned().ok_or_else(|| {
            TemplateError::type_error("reduce() of empty iterable with no initial value")
        })?,
    };
    for item in iter {
        acc = helper.call(&Args::new(vec![acc, item.clone()]))?;
    }
    Ok(acc)
}

/// Percent-encode `s`, leaving unreserved characters and `safe` untouched.
pub fn url_quote(s: &str, safe: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || "_.-~".contains(c) || safe.contains(c) {
            out.push(c);
        } else if c == ' ' {
            out.push_str("%20");
        } else {
            let mut buf = [0u8; 4];
            out.extend(form_urlencoded::byte_serialize(c.encode_utf8(&mut buf).as_bytes()));
        }
    }
    out
}

fn quote(args: &Args) -> TemplateResult<Value> {
    let value = required(args, 0, "string", "quote")?.to_string();
    let safe = args
        .get(1, "safe")
        .map(Value::to_string)
        .unwrap_or_else(|| "/".to_string());
    Ok(Value::Str(url_quote(&value, &safe)))
}

fn not_a_pair() -> TemplateError {
    TemplateError::type_error("urlencode() expects key/value pairs")
}

fn urlencode(args: &Args) -> TemplateResult<Value> {
    let query = required(args, 0, "query", "urlencode")?;
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    match query {
        Value::Map(map) => {
            for (key, value) in map {
                serializer.append_pair(key, &value.to_string());
            }
        }
        Value::List(pairs) => {
            for pair in pairs {
                let Value::List(kv) = pair else {
                    return Err(not_a_pair());
                };
                let [key, value] = kv.as_slice() else {
                    return Err(not_a_pair());
                };
                serializer.append_pair(&key.to_string(), &value.to_string());
            }
        }
        other => {
            return Err(TemplateError::type_error(format!(
                "urlencode() expects a dict, not {}",
                other.type_name()
            )));
        }
    }
    Ok(Value::Str(serializer.finish()))
}

fn relativedelta(args: &Args) -> TemplateResult<Value> {
    if !args.positional.is_empty() {
        return Err(TemplateError::type_error(
            "relativedelta() only accepts keyword arguments",
        ));
    }

    let overflow = || TemplateError::type_error("relativedelta() argument out of range");
    let mut delta = RelativeDelta::default();
    for (name, value) in &args.keyword {
        let n = value.as_int().ok_or_else(|| {
            TemplateError::type_error(format!(
                "relativedelta() argument '{name}' must be int, not {}",
                value.type_name()
            ))
        })?;
        let (unit, scale) = match name.as_str() {
            "years" => ("months", 12),
            "months" => ("months", 1),
            "weeks" => ("days", 7),
            "days" => ("days", 1),
            "hours" => ("seconds", 3600),
            "minutes" => ("seconds", 60),
            "seconds" => ("seconds", 1),
            other => {
                return Err(TemplateError::type_error(format!(
                    "relativedelta() got an unexpected keyword argument '{other}'"
                )));
            }
        };
        let amount = n.checked_mul(scale).ok_or_else(overflow)?;
        let slot = match unit {
            "months" => &mut delta.months,
            "days" => &mut delta.days,
            _ => &mut delta.seconds,
        };
        *slot = slot.checked_add(amount).ok_or_else(overflow)?;
    }
    Ok(Value::Delta(delta))
}

fn now(_args: &Args) -> TemplateResult<Value> {
    Ok(Value::DateTime(Utc::now().naive_utc()))
}

fn today(_args: &Args) -> TemplateResult<Value> {
    Ok(Value::Date(Utc::now().date_naive()))
}

fn ymd(args: &Args, func: &str) -> TemplateResult<NaiveDate> {
    let part = |index: usize, name: &str| -> TemplateResult<i64> {
        int_arg(args, index, name, func)?.ok_or_else(|| {
            TemplateError::type_error(format!("{func}() missing required argument '{name}'"))
        })
    };
    let (year, month, day) = (part(0, "year")?, part(1, "month")?, part(2, "day")?);
    i32::try_from(year)
        .ok()
        .zip(u32::try_from(month).ok())
        .zip(u32::try_from(day).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| {
            TemplateError::type_error(format!("{func}(): day is out of range for month"))
        })
}

fn date(args: &Args) -> TemplateResult<Value> {
    Ok(Value::Date(ymd(args, "date")?))
}

fn datetime(args: &Args) -> TemplateResult<Value> {
    let day = ymd(args, "datetime")?;
    let hour = int_arg(args, 3, "hour", "datetime")?.unwrap_or(0);
    let minute = int_arg(args, 4, "minute", "datetime")?.unwrap_or(0);
    let second = int_arg(args, 5, "second", "datetime")?.unwrap_or(0);
    u32::try_from(hour)
        .ok()
        .zip(u32::try_from(minute).ok())
        .zip(u32::try_from(second).ok())
        .and_then(|((h, m), s)| day.and_hms_opt(h, m, s))
        .map(Value::DateTime)
        .ok_or_else(|| TemplateError::type_error("datetime(): time is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(name: &str, args: Args) -> TemplateResult<Value> {
        let globals = builtin_globals();
        match globals.get(name) {
            Some(Value::Function(helper)) => helper.call(&args),
            other => panic!("{name} is not a global function: {other:?}"),
        }
    }

    fn list(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_len_and_str() {
        assert_eq!(
            call("len", Args::new(vec![list(json!([1, 2, 3]))])).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            call("str", Args::new(vec![Value::Float(3.0)])).unwrap(),
            Value::str("3.0")
        );
    }

    #[test]
    fn test_min_max_sum() {
        let numbers = list(json!([3, 1, 2]));
        assert_eq!(
            call("min", Args::new(vec![numbers.clone()])).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            call("max", Args::new(vec![Value::Int(4), Value::Int(9)])).unwrap(),
            Value::Int(9)
        );
        assert_eq!(call("sum", Args::new(vec![numbers])).unwrap(), Value::Int(6));
        assert!(call("max", Args::new(vec![list(json!([]))])).is_err());
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(
            call("round", Args::new(vec![Value::Float(2.5)])).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            call("round", Args::new(vec![Value::Float(3.5)])).unwrap(),
            Value::Int(4)
        );
        assert_eq!(
            call("round", Args::new(vec![Value::Float(1.26), Value::Int(1)])).unwrap(),
            Value::Float(1.3)
        );
    }

    #[test]
    fn test_filter_map_reduce() {
        let double = Value::function("double", |args: &Args| {
            Ok(Value::Int(args.positional[0].as_int().unwrap_or(0) * 2))
        });
        let add = Value::function("add", |args: &Args| {
            let a = args.positional[0].as_int().unwrap_or(0);
            let b = args.positional[1].as_int().unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        let items = list(json!([0, 1, 2]));

        assert_eq!(
            call("filter", Args::new(vec![Value::None, items.clone()])).unwrap(),
            list(json!([1, 2]))
        );
        assert_eq!(
            call("map", Args::new(vec![double, items.clone()])).unwrap(),
            list(json!([0, 2, 4]))
        );
        assert_eq!(
            call("reduce", Args::new(vec![add, items])).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_map_requires_a_helper() {
        let err = call("map", Args::new(vec![Value::str("upper"), list(json!(["a"]))]));
        assert!(matches!(err, Err(TemplateError::NotCallable { .. })));
    }

    #[test]
    fn test_quote_and_urlencode() {
        assert_eq!(url_quote("a b/c&d", "/"), "a%20b/c%26d");
        assert_eq!(url_quote("é", ""), "%C3%A9");
        assert_eq!(
            call("urlencode", Args::new(vec![list(json!({"q": "a b", "page": 2}))])).unwrap(),
            Value::str("page=2&q=a+b")
        );
    }

    #[test]
    fn test_relativedelta_keywords() {
        let args = Args::default()
            .with_keyword("years", Value::Int(1))
            .with_keyword("weeks", Value::Int(2))
            .with_keyword("hours", Value::Int(1));
        assert_eq!(
            call("relativedelta", args).unwrap(),
            Value::Delta(RelativeDelta::new(12, 14, 3600))
        );
        let bad = Args::default().with_keyword("fortnights", Value::Int(1));
        assert!(call("relativedelta", bad).is_err());
    }

    #[test]
    fn test_datetime_namespace() {
        let globals = builtin_globals();
        let Some(Value::Map(namespace)) = globals.get("datetime") else {
            panic!("datetime should be a namespace map");
        };
        let Some(Value::Function(date)) = namespace.get("date") else {
            panic!("datetime.date should be a function");
        };
        let args = Args::new(vec![Value::Int(2024), Value::Int(2), Value::Int(29)]);
        assert_eq!(
            date.call(&args).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date"))
        );
        let invalid = Args::new(vec![Value::Int(2023), Value::Int(2), Value::Int(29)]);
        assert!(date.call(&invalid).is_err());
    }
}
