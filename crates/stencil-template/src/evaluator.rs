/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template evaluation engine.
//!
//! This module walks a compiled template against an [`EvalContext`]. Every
//! attribute read, subscript and method call is delegated to
//! [`crate::sandbox`]; this module only implements control flow and
//! operators.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::ast::{
    BinaryOp, CallArgs, Conditional, Const, Expr, ForLoop, LoopTarget, TemplateNode, UnaryOp,
};
use crate::context::BindingContext;
use crate::environment::Environment;
use crate::error::{TemplateError, TemplateResult};
use crate::eval_context::EvalContext;
use crate::filters::apply_filter;
use crate::parser::Template;
use crate::sandbox::{self, MAX_RANGE};
use crate::value::{Args, Value, escape_html};

impl Template {
    /// Render this template with the given bindings.
    ///
    /// # Arguments
    /// * `env` - The environment supplying globals and the autoescape mode
    /// * `bindings` - The variable bindings for evaluation
    ///
    /// # Returns
    /// The rendered output string, or the first evaluation error.
    pub fn render(&self, env: &Environment, bindings: &BindingContext) -> TemplateResult<String> {
        if let Some(missing) = env
            .required_helpers()
            .iter()
            .find(|name| !bindings.has_helper(name))
        {
            return Err(TemplateError::MissingHelper {
                name: missing.clone(),
            });
        }

        let mut ctx = EvalContext::new(env, bindings);
        let mut out = String::with_capacity(self.source.len());
        render_nodes(&self.nodes, &mut ctx, &mut out)?;
        Ok(out)
    }
}

/// Evaluate a list of template nodes, appending output to `out`.
pub fn render_nodes(
    nodes: &[TemplateNode],
    ctx: &mut EvalContext<'_>,
    out: &mut String,
) -> TemplateResult<()> {
    for node in nodes {
        render_node(node, ctx, out)?;
    }
    Ok(())
}

fn render_node(
    node: &TemplateNode,
    ctx: &mut EvalContext<'_>,
    out: &mut String,
) -> TemplateResult<()> {
    match node {
        TemplateNode::Literal(literal) => {
            out.push_str(&literal.text);
            Ok(())
        }
        TemplateNode::Print(print) => {
            let value = eval_expr(&print.expr, ctx)?;
            write_value(&value, ctx.autoescape(), out);
            Ok(())
        }
        TemplateNode::Conditional(conditional) => render_conditional(conditional, ctx, out),
        TemplateNode::ForLoop(for_loop) => render_for_loop(for_loop, ctx, out),
        // Comments produce no output
        TemplateNode::Comment(_) => Ok(()),
    }
}

fn write_value(value: &Value, autoescape: bool, out: &mut String) {
    match value {
        Value::Markup(s) => out.push_str(s),
        other if autoescape => out.push_str(&escape_html(&other.to_string())),
        other => {
            // Writing to a String cannot fail.
            let _ = write!(out, "{other}");
        }
    }
}

fn render_conditional(
    conditional: &Conditional,
    ctx: &mut EvalContext<'_>,
    out: &mut String,
) -> TemplateResult<()> {
    for (condition, body) in &conditional.branches {
        if eval_expr(condition, ctx)?.is_truthy() {
            return render_nodes(body, ctx, out);
        }
    }
    match &conditional.else_branch {
        Some(body) => render_nodes(body, ctx, out),
        None => Ok(()),
    }
}

fn iterate(value: Value) -> TemplateResult<Vec<Value>> {
    match value {
        Value::None => Ok(Vec::new()),
        Value::List(items) => Ok(items),
        Value::Map(map) => Ok(map.into_keys().map(Value::Str).collect()),
        Value::Str(s) | Value::Markup(s) => {
            Ok(s.chars().map(|c| Value::Str(c.to_string())).collect())
        }
        other => Err(TemplateError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn render_for_loop(
    for_loop: &ForLoop,
    ctx: &mut EvalContext<'_>,
    out: &mut String,
) -> TemplateResult<()> {
    let items = iterate(eval_expr(&for_loop.iter, ctx)?)?;

    if items.is_empty() {
        return match &for_loop.else_branch {
            Some(body) => render_nodes(body, ctx, out),
            None => Ok(()),
        };
    }

    ctx.push_scope()?;
    let result = render_iterations(for_loop, items, ctx, out);
    ctx.pop_scope();
    result
}

fn render_iterations(
    for_loop: &ForLoop,
    items: Vec<Value>,
    ctx: &mut EvalContext<'_>,
    out: &mut String,
) -> TemplateResult<()> {
    let length = items.len();

    for (index, item) in items.into_iter().enumerate() {
        match &for_loop.target {
            LoopTarget::Single(name) => ctx.set_local(name.as_str(), item),
            LoopTarget::Tuple(names) => {
                let parts = match item {
                    Value::List(parts) => parts,
                    other => {
                        return Err(TemplateError::type_error(format!(
                            "cannot unpack non-sequence {}",
                            other.type_name()
                        )));
                    }
                };
                if parts.len() != names.len() {
                    return Err(TemplateError::type_error(format!(
                        "expected {} values to unpack, got {}",
                        names.len(),
                        parts.len()
                    )));
                }
                for (name, part) in names.iter().zip(parts) {
                    ctx.set_local(name.as_str(), part);
                }
            }
        }

        let loop_info: BTreeMap<String, Value> = [
            ("index", Value::Int(as_int(index + 1))),
            ("index0", Value::Int(as_int(index))),
            ("first", Value::Bool(index == 0)),
            ("last", Value::Bool(index + 1 == length)),
            ("length", Value::Int(as_int(length))),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        ctx.set_local("loop", Value::Map(loop_info));

        render_nodes(&for_loop.body, ctx, out)?;
    }

    Ok(())
}

fn as_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ============================================================================
// Expressions
// ============================================================================

/// Evaluate an expression to a value.
pub fn eval_expr(expr: &Expr, ctx: &EvalContext<'_>) -> TemplateResult<Value> {
    match expr {
        Expr::Const(constant, _) => Ok(match constant {
            Const::None => Value::None,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(i) => Value::Int(*i),
            Const::Float(f) => Value::Float(*f),
            Const::Str(s) => Value::Str(s.clone()),
        }),

        Expr::List(items, _) => Ok(Value::List(
            items
                .iter()
                .map(|item| eval_expr(item, ctx))
                .collect::<TemplateResult<_>>()?,
        )),

        Expr::Name(name, _) => ctx.lookup(name),

        Expr::Attr { base, name, .. } => {
            let base = eval_expr(base, ctx)?;
            sandbox::get_attr(&base, name)
        }

        Expr::Item { base, index, .. } => {
            let base = eval_expr(base, ctx)?;
            let index = eval_expr(index, ctx)?;
            sandbox::get_item(&base, &index)
        }

        Expr::Call { func, args, .. } => {
            let args = eval_args(args, ctx)?;
            if let Expr::Attr { base, name, .. } = func.as_ref() {
                let receiver = eval_expr(base, ctx)?;
                if let Some(result) = sandbox::call_method(&receiver, name, &args)? {
                    return Ok(result);
                }
                let callee = sandbox::get_attr(&receiver, name)?;
                return call_value(&callee, &args);
            }
            let callee = eval_expr(func, ctx)?;
            call_value(&callee, &args)
        }

        Expr::Filter { expr, name, args, .. } => {
            let value = eval_expr(expr, ctx)?;
            let args = eval_args(args, ctx)?;
            apply_filter(name, value, &args)
        }

        Expr::Unary { op, expr, .. } => {
            let value = eval_expr(expr, ctx)?;
            unary_op(*op, value)
        }

        Expr::Binary { op, left, right, .. } => {
            let left = eval_expr(left, ctx)?;
            let right = eval_expr(right, ctx)?;
            binary_op(*op, &left, &right)
        }

        Expr::Or { left, right, .. } => {
            let left = eval_expr(left, ctx)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval_expr(right, ctx)
            }
        }

        Expr::And { left, right, .. } => {
            let left = eval_expr(left, ctx)?;
            if left.is_truthy() {
                eval_expr(right, ctx)
            } else {
                Ok(left)
            }
        }

        Expr::Conditional {
            cond,
            then,
            otherwise,
            ..
        } => {
            if eval_expr(cond, ctx)?.is_truthy() {
                eval_expr(then, ctx)
            } else {
                match otherwise {
                    Some(otherwise) => eval_expr(otherwise, ctx),
                    None => Ok(Value::None),
                }
            }
        }
    }
}

fn eval_args(args: &CallArgs, ctx: &EvalContext<'_>) -> TemplateResult<Args> {
    let positional = args
        .positional
        .iter()
        .map(|arg| eval_expr(arg, ctx))
        .collect::<TemplateResult<Vec<_>>>()?;
    let keyword = args
        .keyword
        .iter()
        .map(|(name, arg)| Ok((name.clone(), eval_expr(arg, ctx)?)))
        .collect::<TemplateResult<Vec<_>>>()?;
    Ok(Args {
        positional,
        keyword,
    })
}

fn call_value(callee: &Value, args: &Args) -> TemplateResult<Value> {
    match callee {
        Value::Function(helper) => helper.call(args),
        other => Err(TemplateError::NotCallable {
            type_name: other.type_name().to_string(),
        }),
    }
}

fn overflow() -> TemplateError {
    TemplateError::type_error("integer overflow")
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> TemplateError {
    TemplateError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn unary_op(op: UnaryOp, value: Value) -> TemplateResult<Value> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Delta(d)) => Ok(Value::Delta(d.checked_neg()?)),
        (UnaryOp::Pos, value @ (Value::Int(_) | Value::Float(_) | Value::Delta(_))) => Ok(value),
        (_, value) => Err(TemplateError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

/// Text of a value as it appears inside markup: escaped unless already safe.
fn markup_text(value: &Value) -> String {
    match value {
        Value::Markup(s) => s.clone(),
        other => escape_html(&other.to_string()),
    }
}

fn check_size(len: usize, what: &str) -> TemplateResult<()> {
    if len > MAX_RANGE {
        return Err(TemplateError::LimitExceeded {
            what: what.to_string(),
            limit: MAX_RANGE,
        });
    }
    Ok(())
}

fn repeat_count(n: i64, unit_len: usize, what: &str) -> TemplateResult<usize> {
    let n = usize::try_from(n.max(0)).map_err(|_| overflow())?;
    let total = unit_len.checked_mul(n).unwrap_or(usize::MAX);
    check_size(total, what)?;
    Ok(n)
}

/// Apply a binary operator.
pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> TemplateResult<Value> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => sub(left, right),
        BinaryOp::Mul => mul(left, right),
        BinaryOp::Div => {
            let (a, b) = floats(op, left, right)?;
            if b == 0.0 {
                return Err(TemplateError::DivisionByZero);
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::FloorDiv => match (left.as_int(), right.as_int()) {
            (Some(_), Some(0)) => Err(TemplateError::DivisionByZero),
            (Some(a), Some(b)) if is_int(left) && is_int(right) => {
                let q = a.checked_div(b).ok_or_else(overflow)?;
                let floor = if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q };
                Ok(Value::Int(floor))
            }
            _ => {
                let (a, b) = floats(op, left, right)?;
                if b == 0.0 {
                    return Err(TemplateError::DivisionByZero);
                }
                Ok(Value::Float((a / b).floor()))
            }
        },
        BinaryOp::Mod => match left {
            Value::Str(format) => Ok(Value::Str(percent_format(format, right, false)?)),
            Value::Markup(format) => Ok(Value::Markup(percent_format(format, right, true)?)),
            _ if is_int(left) && is_int(right) => {
                let (a, b) = (left.as_int().unwrap_or(0), right.as_int().unwrap_or(0));
                if b == 0 {
                    return Err(TemplateError::DivisionByZero);
                }
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
            }
            _ => {
                let (a, b) = floats(op, left, right)?;
                if b == 0.0 {
                    return Err(TemplateError::DivisionByZero);
                }
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        },
        BinaryOp::Concat => {
            if matches!(left, Value::Markup(_)) || matches!(right, Value::Markup(_)) {
                Ok(Value::Markup(markup_text(left) + &markup_text(right)))
            } else {
                Ok(Value::Str(format!("{left}{right}")))
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = left.compare(right).ok_or_else(|| {
                TemplateError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::In => contains(right, left).map(Value::Bool),
        BinaryOp::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
    }
}

fn is_int(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Bool(_))
}

fn floats(op: BinaryOp, left: &Value, right: &Value) -> TemplateResult<(f64, f64)> {
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported(op, left, right)),
    }
}

fn add(left: &Value, right: &Value) -> TemplateResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Str(_) | Value::Markup(_), Value::Str(_) | Value::Markup(_)) => {
            Ok(Value::Markup(markup_text(left) + &markup_text(right)))
        }
        (Value::List(a), Value::List(b)) => {
            check_size(a.len() + b.len(), "list length")?;
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (Value::Date(date), Value::Delta(delta)) | (Value::Delta(delta), Value::Date(date)) => {
            if delta.has_time() {
                Ok(Value::DateTime(delta.apply_to_date_as_datetime(*date)?))
            } else {
                Ok(Value::Date(delta.apply_to_date(*date)?))
            }
        }
        (Value::DateTime(dt), Value::Delta(delta)) | (Value::Delta(delta), Value::DateTime(dt)) => {
            Ok(Value::DateTime(delta.apply_to_datetime(*dt)?))
        }
        (Value::Delta(a), Value::Delta(b)) => Ok(Value::Delta(a.checked_add(b)?)),
        _ => {
            let (a, b) = floats(BinaryOp::Add, left, right)?;
            Ok(Value::Float(a + b))
        }
    }
}

fn sub(left: &Value, right: &Value) -> TemplateResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
        (Value::Date(_) | Value::DateTime(_) | Value::Delta(_), Value::Delta(delta)) => {
            add(left, &Value::Delta(delta.checked_neg()?))
        }
        _ => {
            let (a, b) = floats(BinaryOp::Sub, left, right)?;
            Ok(Value::Float(a - b))
        }
    }
}

fn mul(left: &Value, right: &Value) -> TemplateResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            let count = repeat_count(*n, s.len(), "string length")?;
            Ok(Value::Str(s.repeat(count)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let count = repeat_count(*n, items.len(), "list length")?;
            let mut repeated = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                repeated.extend(items.iter().cloned());
            }
            Ok(Value::List(repeated))
        }
        _ => {
            let (a, b) = floats(BinaryOp::Mul, left, right)?;
            Ok(Value::Float(a * b))
        }
    }
}

fn contains(container: &Value, item: &Value) -> TemplateResult<bool> {
    match container {
        Value::Str(haystack) | Value::Markup(haystack) => match item.as_str() {
            Some(needle) => Ok(haystack.contains(needle)),
            None => Err(TemplateError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                item.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|candidate| candidate == item)),
        Value::Map(map) => Ok(item.as_str().is_some_and(|key| map.contains_key(key))),
        other => Err(TemplateError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// ============================================================================
// printf-style formatting
// ============================================================================

struct Spec {
    key: Option<String>,
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

type FormatChars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn parse_number(chars: &mut FormatChars<'_>) -> TemplateResult<Option<usize>> {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    if digits.is_empty() {
        return Ok(None);
    }
    let n = digits.parse::<usize>().unwrap_or(usize::MAX);
    check_size(n, "format width")?;
    Ok(Some(n))
}

fn parse_spec(chars: &mut FormatChars<'_>) -> TemplateResult<Spec> {
    let mut key = None;
    if chars.peek() == Some(&'(') {
        chars.next();
        let mut name = String::new();
        loop {
            match chars.next() {
                Some(')') => break,
                Some(c) => name.push(c),
                None => return Err(TemplateError::type_error("incomplete format key")),
            }
        }
        key = Some(name);
    }

    let (mut left_align, mut zero_pad, mut plus_sign) = (false, false, false);
    while let Some(&c) = chars.peek() {
        match c {
            '-' => left_align = true,
            '0' => zero_pad = true,
            '+' => plus_sign = true,
            ' ' => {}
            _ => break,
        }
        chars.next();
    }

    let width = parse_number(chars)?.unwrap_or(0);
    let precision = if chars.peek() == Some(&'.') {
        chars.next();
        Some(parse_number(chars)?.unwrap_or(0))
    } else {
        None
    };

    let conversion = chars
        .next()
        .ok_or_else(|| TemplateError::type_error("incomplete format"))?;

    Ok(Spec {
        key,
        left_align,
        zero_pad,
        plus_sign,
        width,
        precision,
        conversion,
    })
}

fn format_one(spec: &Spec, value: &Value, markup: bool) -> TemplateResult<String> {
    let numeric_error = |kind: &str| {
        TemplateError::type_error(format!(
            "%{} format: a {kind} is required, not {}",
            spec.conversion,
            value.type_name()
        ))
    };

    let (body, numeric) = match spec.conversion {
        's' => {
            let text = if markup {
                markup_text(value)
            } else {
                value.to_string()
            };
            let text = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            (text, false)
        }
        'r' => (value.repr(), false),
        'd' | 'i' => {
            let n = match value {
                Value::Float(f) if f.is_finite() => f.trunc() as i64,
                other => other.as_int().ok_or_else(|| numeric_error("number"))?,
            };
            let text = if spec.plus_sign && n >= 0 {
                format!("+{n}")
            } else {
                n.to_string()
            };
            (text, true)
        }
        'f' | 'F' => {
            let f = value.as_float().ok_or_else(|| numeric_error("real number"))?;
            let precision = spec.precision.unwrap_or(6);
            let text = format!("{f:.precision$}");
            let text = if spec.plus_sign && f >= 0.0 {
                format!("+{text}")
            } else {
                text
            };
            (text, true)
        }
        other => {
            return Err(TemplateError::type_error(format!(
                "unsupported format character '{other}'"
            )));
        }
    };

    let len = body.chars().count();
    if len >= spec.width {
        return Ok(body);
    }
    let padding = spec.width - len;
    Ok(if spec.left_align {
        format!("{body}{}", " ".repeat(padding))
    } else if spec.zero_pad && numeric {
        match body.strip_prefix(['-', '+']) {
            Some(digits) => format!("{}{}{digits}", &body[..1], "0".repeat(padding)),
            None => format!("{}{body}", "0".repeat(padding)),
        }
    } else {
        format!("{}{body}", " ".repeat(padding))
    })
}

/// Python `str % args` formatting.
fn percent_format(format: &str, args: &Value, markup: bool) -> TemplateResult<String> {
    let positional: &[Value] = match args {
        Value::List(items) => items,
        other => std::slice::from_ref(other),
    };
    let mut next = 0;
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let spec = parse_spec(&mut chars)?;
        let value = match &spec.key {
            Some(key) => match args {
                Value::Map(map) => map.get(key).cloned().ok_or_else(|| {
                    TemplateError::type_error(format!("format key '{key}' not found"))
                })?,
                _ => return Err(TemplateError::type_error("format requires a mapping")),
            },
            None => {
                let value = positional.get(next).cloned().ok_or_else(|| {
                    TemplateError::type_error("not enough arguments for format string")
                })?;
                next += 1;
                value
            }
        };
        out.push_str(&format_one(&spec, &value, markup)?);
        check_size(out.len(), "formatted string length")?;
    }

    if next > 0 && next < positional.len() {
        return Err(TemplateError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(source: &str, bindings: &BindingContext) -> TemplateResult<String> {
        let env = Environment::new(false);
        Template::compile(source)?.render(&env, bindings)
    }

    fn render_ok(source: &str) -> String {
        render(source, &BindingContext::new()).expect("render should succeed")
    }

    #[test]
    fn test_literal_and_arithmetic() {
        assert_eq!(render_ok("1 + 2 = ${1 + 2}"), "1 + 2 = 3");
        assert_eq!(
            render_ok("${7 // 2} ${-7 // 2} ${7 % -3} ${7 / 2}"),
            "3 -4 -2 3.5"
        );
        assert_eq!(render_ok("${'ab' ~ 3}"), "ab3");
    }

    #[test]
    fn test_or_returns_operand() {
        assert_eq!(render_ok("${None or '''N/A'''}"), "N/A");
        assert_eq!(render_ok("${'x' or 'y'}"), "x");
        assert_eq!(render_ok("${0 and 'y'}"), "0");
    }

    #[test]
    fn test_conditional_expression_without_else() {
        assert_eq!(render_ok("[${'yes' if False}]"), "[]");
    }

    #[test]
    fn test_percent_formatting() {
        assert_eq!(
            render_ok("${'%s has %d items' % ('cart', 3)}"),
            "cart has 3 items"
        );
        assert_eq!(render_ok("${'%.2f' % 3.14159}"), "3.14");
        assert_eq!(render_ok("${'%05.1f|%-4s|' % (2.5, 'ab')}"), "002.5|ab  |");
        assert_eq!(render_ok("${'100%%' % ()}"), "100%");
        assert!(render("${'%s %s' % 'one'}", &BindingContext::new()).is_err());
        assert!(render("${'%s' % (1, 2)}", &BindingContext::new()).is_err());
    }

    #[test]
    fn test_for_loop_variables() {
        let mut bindings = BindingContext::new();
        bindings.insert("items", Value::from(json!(["a", "b", "c"])));
        let out = render(
            "<% for x in items %>${loop.index}:${x}${'' if loop.last else ','}<% endfor %>",
            &bindings,
        )
        .unwrap();
        assert_eq!(out, "1:a,2:b,3:c");
    }

    #[test]
    fn test_for_else_and_tuple_unpacking() {
        let mut bindings = BindingContext::new();
        bindings.insert("ctx", Value::from(json!({"lang": "fr", "tz": "UTC"})));
        bindings.insert("empty", Value::List(vec![]));
        let source = concat!(
            "<% for k, v in ctx.items() %>${k}=${v};<% endfor %>",
            "<% for x in empty %>x<% else %>none<% endfor %>",
        );
        let out = render(source, &bindings).unwrap();
        assert_eq!(out, "lang=fr;tz=UTC;none");
    }

    #[test]
    fn test_loop_scope_does_not_leak() {
        let out = render("<% for x in [1] %><% endfor %>${x}", &BindingContext::new());
        assert_eq!(
            out,
            Err(TemplateError::UndefinedName {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn test_repetition_limit() {
        let err = render("${'ab' * 60000}", &BindingContext::new()).unwrap_err();
        assert!(matches!(err, TemplateError::LimitExceeded { .. }));
        assert_eq!(render_ok("${'ab' * 3}${'x' * -1}"), "ababab");
    }

    #[test]
    fn test_calls_only_reach_helpers() {
        let mut bindings = BindingContext::new();
        bindings.insert("name", "Azure");
        let err = render("${name()}", &bindings).unwrap_err();
        assert_eq!(
            err,
            TemplateError::NotCallable {
                type_name: "str".to_string()
            }
        );
        let err = render("${name.format(1)}", &bindings).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(
            render_ok("${datetime.date(2024, 1, 31) + relativedelta(months=1)}"),
            "2024-02-29"
        );
        assert_eq!(
            render_ok("${(datetime.date(2024, 3, 1) - relativedelta(days=1)).day}"),
            "29"
        );
        assert_eq!(
            render_ok("${datetime.date(2024, 3, 1) + relativedelta(hours=6)}"),
            "2024-03-01 06:00:00"
        );
    }

    #[test]
    fn test_comparison_type_error() {
        let err = render("${'a' < 1}", &BindingContext::new()).unwrap_err();
        assert!(matches!(err, TemplateError::TypeError { .. }));
    }

    #[test]
    fn test_membership() {
        assert_eq!(
            render_ok("${'b' in ['a', 'b']} ${'z' not in 'xyz'}"),
            "True False"
        );
    }

    #[test]
    fn test_markup_concatenation_escapes_plain_side() {
        assert_eq!(render_ok("${'<b>' | safe ~ '<i>'}"), "<b>&lt;i&gt;");
    }
}
