//! Expression evaluation
//!
//! Evaluates a prepared expression against an optional row. Comparison
//! and logic follow SQL three-valued semantics: NULL propagates through
//! arithmetic and comparison, AND/OR treat NULL as unknown, and a
//! condition only holds when it evaluates to true.
//!
//! Compiled sub-selects need catalog access, supplied through an
//! `ExecutionContext`. Contexts are optional so constraint checks can
//! evaluate subquery-free expressions without one.

use crate::catalog::Connection;
use crate::error::{Error, Result};
use crate::planning::plan::QueryPlan;
use crate::types::expression::Expression;
use crate::types::value::{Row, Value};
use std::cmp::Ordering;

/// Everything plan evaluation needs from the outside world.
pub struct ExecutionContext<'a> {
    connection: &'a Connection,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        ExecutionContext { connection }
    }

    pub fn connection(&self) -> &Connection {
        self.connection
    }
}

/// Three-valued truth, before collapsing to a row decision.
fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(Error::TypeMismatch {
            expected: "boolean".into(),
            found: other.type_name().into(),
        }),
    }
}

fn from_truth(t: Option<bool>) -> Value {
    match t {
        Some(b) => Value::Bool(b),
        None => Value::Null,
    }
}

/// Evaluates a prepared expression. `row` supplies `Field` lookups; `ctx`
/// supplies catalog access for compiled sub-selects.
pub fn evaluate(
    expr: &Expression,
    row: Option<&Row>,
    ctx: Option<&ExecutionContext>,
) -> Result<Value> {
    use Expression::*;
    Ok(match expr {
        Constant(v) => v.clone(),
        Column(c) => {
            return Err(Error::InvalidValue(format!(
                "unresolved column reference {}",
                c
            )));
        }
        Field(i) => {
            let row = row.ok_or_else(|| {
                Error::InvalidValue("field reference outside a row context".into())
            })?;
            row.get(*i)
                .cloned()
                .ok_or_else(|| Error::InvalidValue(format!("field #{} out of range", i)))?
        }

        And(l, r) => {
            let l = truth(&evaluate(l, row, ctx)?)?;
            if l == Some(false) {
                return Ok(Value::Bool(false));
            }
            let r = truth(&evaluate(r, row, ctx)?)?;
            from_truth(match (l, r) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            })
        }
        Or(l, r) => {
            let l = truth(&evaluate(l, row, ctx)?)?;
            if l == Some(true) {
                return Ok(Value::Bool(true));
            }
            let r = truth(&evaluate(r, row, ctx)?)?;
            from_truth(match (l, r) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            })
        }
        Not(e) => from_truth(truth(&evaluate(e, row, ctx)?)?.map(|b| !b)),

        Equal(l, r) => compare(l, r, row, ctx, |o| o == Ordering::Equal)?,
        NotEqual(l, r) => compare(l, r, row, ctx, |o| o != Ordering::Equal)?,
        GreaterThan(l, r) => compare(l, r, row, ctx, |o| o == Ordering::Greater)?,
        GreaterThanOrEqual(l, r) => compare(l, r, row, ctx, |o| o != Ordering::Less)?,
        LessThan(l, r) => compare(l, r, row, ctx, |o| o == Ordering::Less)?,
        LessThanOrEqual(l, r) => compare(l, r, row, ctx, |o| o != Ordering::Greater)?,

        Add(l, r) => arithmetic(l, r, row, ctx, add_values)?,
        Subtract(l, r) => arithmetic(l, r, row, ctx, subtract_values)?,
        Multiply(l, r) => arithmetic(l, r, row, ctx, multiply_values)?,
        Divide(l, r) => arithmetic(l, r, row, ctx, divide_values)?,
        Negate(e) => match evaluate(e, row, ctx)? {
            Value::Null => Value::Null,
            Value::Integer(i) => Value::Integer(
                i.checked_neg()
                    .ok_or_else(|| Error::InvalidValue("integer overflow".into()))?,
            ),
            Value::Double(f) => Value::Double(-f),
            Value::Decimal(d) => Value::Decimal(-d),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "number".into(),
                    found: other.type_name().into(),
                });
            }
        },

        Like {
            expr,
            pattern,
            negated,
        } => {
            let text = evaluate(expr, row, ctx)?;
            let pattern = evaluate(pattern, row, ctx)?;
            match (text, pattern) {
                (Value::Null, _) | (_, Value::Null) => Value::Null,
                (Value::Str(text), Value::Str(pattern)) => {
                    Value::Bool(like_match(&text, &pattern) != *negated)
                }
                (text, pattern) => {
                    return Err(Error::TypeMismatch {
                        expected: "string".into(),
                        found: if matches!(text, Value::Str(_)) {
                            pattern.type_name().into()
                        } else {
                            text.type_name().into()
                        },
                    });
                }
            }
        }
        Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = evaluate(expr, row, ctx)?;
            let low = evaluate(low, row, ctx)?;
            let high = evaluate(high, row, ctx)?;
            let ge = value.compare(&low).map(|o| o != Ordering::Less);
            let le = value.compare(&high).map(|o| o != Ordering::Greater);
            let outcome = match (ge, le) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            from_truth(outcome.map(|b| b != *negated))
        }
        InList {
            expr,
            list,
            negated,
        } => {
            let value = evaluate(expr, row, ctx)?;
            let mut items = Vec::with_capacity(list.len());
            for item in list {
                items.push(evaluate(item, row, ctx)?);
            }
            from_truth(membership(&value, &items).map(|b| b != *negated))
        }
        IsNull { expr, negated } => {
            Value::Bool(evaluate(expr, row, ctx)?.is_null() != *negated)
        }

        Function(name, args) => {
            if expr.is_aggregate() {
                return Err(Error::InvalidValue(format!(
                    "aggregate function {} outside an aggregation",
                    name
                )));
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, row, ctx)?);
            }
            scalar_function(name, values)?
        }

        Subquery(_) => {
            return Err(Error::InvalidValue("unresolved sub-select".into()));
        }
        Subplan(plan) => scalar_subplan(plan, ctx)?,
        InSubplan {
            expr,
            plan,
            negated,
        } => {
            let value = evaluate(expr, row, ctx)?;
            let rows = run_subplan(plan, ctx)?;
            let mut items = Vec::with_capacity(rows.len());
            for mut r in rows {
                if r.len() != 1 {
                    return Err(Error::ArityMismatch(
                        "IN sub-select must produce exactly one column".into(),
                    ));
                }
                items.push(r.remove(0));
            }
            from_truth(membership(&value, &items).map(|b| b != *negated))
        }
    })
}

/// Three-valued membership test over already-evaluated items.
fn membership(value: &Value, items: &[Value]) -> Option<bool> {
    if value.is_null() {
        return None;
    }
    let mut saw_null = false;
    for item in items {
        match value.compare(item) {
            Some(Ordering::Equal) => return Some(true),
            Some(_) => {}
            None => saw_null = true,
        }
    }
    if saw_null { None } else { Some(false) }
}

fn compare(
    l: &Expression,
    r: &Expression,
    row: Option<&Row>,
    ctx: Option<&ExecutionContext>,
    test: impl Fn(Ordering) -> bool,
) -> Result<Value> {
    let l = evaluate(l, row, ctx)?;
    let r = evaluate(r, row, ctx)?;
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    match l.compare(&r) {
        Some(ord) => Ok(Value::Bool(test(ord))),
        None => Err(Error::TypeMismatch {
            expected: l.type_name().into(),
            found: r.type_name().into(),
        }),
    }
}

fn arithmetic(
    l: &Expression,
    r: &Expression,
    row: Option<&Row>,
    ctx: Option<&ExecutionContext>,
    op: impl Fn(&Value, &Value) -> Result<Value>,
) -> Result<Value> {
    let l = evaluate(l, row, ctx)?;
    let r = evaluate(r, row, ctx)?;
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    op(&l, &r)
}

fn numeric_pair(l: &Value, r: &Value) -> Result<()> {
    for v in [l, r] {
        if !v.is_number() {
            return Err(Error::TypeMismatch {
                expected: "number".into(),
                found: v.type_name().into(),
            });
        }
    }
    Ok(())
}

fn overflow() -> Error {
    Error::InvalidValue("integer overflow".into())
}

/// Adds two non-null values, widening across the numeric family. Strings
/// concatenate.
pub(crate) fn add_values(l: &Value, r: &Value) -> Result<Value> {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return Ok(Value::Str(format!("{}{}", a, b)));
    }
    numeric_pair(l, r)?;
    Ok(match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            Value::Integer(a.checked_add(*b).ok_or_else(overflow)?)
        }
        _ if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) => {
            Value::Double(l.as_f64()? + r.as_f64()?)
        }
        _ => Value::Decimal(
            l.as_decimal()?
                .checked_add(r.as_decimal()?)
                .ok_or_else(overflow)?,
        ),
    })
}

pub(crate) fn subtract_values(l: &Value, r: &Value) -> Result<Value> {
    numeric_pair(l, r)?;
    Ok(match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            Value::Integer(a.checked_sub(*b).ok_or_else(overflow)?)
        }
        _ if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) => {
            Value::Double(l.as_f64()? - r.as_f64()?)
        }
        _ => Value::Decimal(
            l.as_decimal()?
                .checked_sub(r.as_decimal()?)
                .ok_or_else(overflow)?,
        ),
    })
}

pub(crate) fn multiply_values(l: &Value, r: &Value) -> Result<Value> {
    numeric_pair(l, r)?;
    Ok(match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            Value::Integer(a.checked_mul(*b).ok_or_else(overflow)?)
        }
        _ if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) => {
            Value::Double(l.as_f64()? * r.as_f64()?)
        }
        _ => Value::Decimal(
            l.as_decimal()?
                .checked_mul(r.as_decimal()?)
                .ok_or_else(overflow)?,
        ),
    })
}

pub(crate) fn divide_values(l: &Value, r: &Value) -> Result<Value> {
    numeric_pair(l, r)?;
    let zero = match r {
        Value::Integer(b) => *b == 0,
        Value::Double(b) => *b == 0.0,
        Value::Decimal(b) => b.is_zero(),
        _ => false,
    };
    if zero {
        return Err(Error::InvalidValue("division by zero".into()));
    }
    Ok(match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => Value::Integer(a / b),
        _ if matches!(l, Value::Double(_)) || matches!(r, Value::Double(_)) => {
            Value::Double(l.as_f64()? / r.as_f64()?)
        }
        _ => Value::Decimal(
            l.as_decimal()?
                .checked_div(r.as_decimal()?)
                .ok_or_else(overflow)?,
        ),
    })
}

/// The scalar function library.
fn scalar_function(name: &str, mut args: Vec<Value>) -> Result<Value> {
    let one_arg = |args: &mut Vec<Value>| -> Result<Value> {
        if args.len() != 1 {
            return Err(Error::ArityMismatch(format!(
                "function takes one argument, got {}",
                args.len()
            )));
        }
        Ok(args.remove(0))
    };
    match name.to_ascii_uppercase().as_str() {
        "UPPER" => match one_arg(&mut args)? {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            other => Err(Error::TypeMismatch {
                expected: "string".into(),
                found: other.type_name().into(),
            }),
        },
        "LOWER" => match one_arg(&mut args)? {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
            other => Err(Error::TypeMismatch {
                expected: "string".into(),
                found: other.type_name().into(),
            }),
        },
        "LENGTH" => match one_arg(&mut args)? {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::Integer(s.chars().count() as i64)),
            Value::Binary(b) => Ok(Value::Integer(b.len() as i64)),
            other => Err(Error::TypeMismatch {
                expected: "string".into(),
                found: other.type_name().into(),
            }),
        },
        "ABS" => match one_arg(&mut args)? {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => Ok(Value::Integer(i.checked_abs().ok_or_else(overflow)?)),
            Value::Double(f) => Ok(Value::Double(f.abs())),
            Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
            other => Err(Error::TypeMismatch {
                expected: "number".into(),
                found: other.type_name().into(),
            }),
        },
        other => Err(Error::InvalidValue(format!("unknown function {}", other))),
    }
}

fn run_subplan(plan: &QueryPlan, ctx: Option<&ExecutionContext>) -> Result<Vec<Row>> {
    let ctx = ctx.ok_or_else(|| {
        Error::InvalidValue("sub-select evaluated without an execution context".into())
    })?;
    plan.evaluate(ctx)
}

/// A scalar sub-select yields NULL for no rows, its single value for one
/// row, and an error otherwise.
fn scalar_subplan(plan: &QueryPlan, ctx: Option<&ExecutionContext>) -> Result<Value> {
    let mut rows = run_subplan(plan, ctx)?;
    match rows.len() {
        0 => Ok(Value::Null),
        1 => {
            let mut row = rows.remove(0);
            if row.len() != 1 {
                return Err(Error::ArityMismatch(
                    "scalar sub-select must produce exactly one column".into(),
                ));
            }
            Ok(row.remove(0))
        }
        n => Err(Error::InvalidValue(format!(
            "scalar sub-select produced {} rows",
            n
        ))),
    }
}

/// SQL LIKE: `%` matches any run, `_` matches one character, `\` escapes.
pub(crate) fn like_match(text: &str, pattern: &str) -> bool {
    fn matches(text: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => {
                (0..=text.len()).any(|skip| matches(&text[skip..], rest))
            }
            Some(('_', rest)) => !text.is_empty() && matches(&text[1..], rest),
            Some(('\\', rest)) => match rest.split_first() {
                Some((escaped, rest)) => {
                    text.first() == Some(escaped) && matches(&text[1..], rest)
                }
                None => false,
            },
            Some((c, rest)) => text.first() == Some(c) && matches(&text[1..], rest),
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    matches(&text, &pattern)
}
