//! SQL values
//!
//! Values carry a total ordering (`total_cmp`) used for sorting, grouping
//! and set composition. SQL comparison semantics (NULL-propagating, with
//! numeric cross-type comparison) live in the expression evaluator; the
//! total ordering here exists so rows can be keyed deterministically.

use crate::error::{Error, Result};
use crate::types::data_type::SqlType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A row of values.
pub type Row = Vec<Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Decimal(Decimal),
    Str(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interprets the value as a condition outcome. NULL is not true.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Decimal(d) => d
                .to_i64()
                .ok_or_else(|| Error::InvalidValue(format!("{} out of integer range", d))),
            Value::Double(f) if f.fract() == 0.0 => Ok(*f as i64),
            other => Err(Error::TypeMismatch {
                expected: "integer".into(),
                found: other.type_name().into(),
            }),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Double(f) => Ok(*f),
            Value::Decimal(d) => d
                .to_f64()
                .ok_or_else(|| Error::InvalidValue(format!("{} out of double range", d))),
            other => Err(Error::TypeMismatch {
                expected: "number".into(),
                found: other.type_name().into(),
            }),
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal> {
        match self {
            Value::Integer(i) => Ok(Decimal::from(*i)),
            Value::Decimal(d) => Ok(*d),
            Value::Double(f) => Decimal::from_f64(*f)
                .ok_or_else(|| Error::InvalidValue(format!("{} not representable as decimal", f))),
            other => Err(Error::TypeMismatch {
                expected: "number".into(),
                found: other.type_name().into(),
            }),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Double(_) | Value::Decimal(_))
    }

    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Decimal(_) => "numeric",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Binary(_) => "binary",
        }
    }

    /// True if the value is storable in a column of the given type without
    /// coercion beyond the numeric family.
    pub fn matches_type(&self, ty: &SqlType) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(_) => matches!(ty, SqlType::Boolean | SqlType::Bit),
            Value::Integer(_) | Value::Double(_) | Value::Decimal(_) => ty.is_numeric(),
            Value::Str(_) => ty.is_string(),
            Value::Date(_) => matches!(ty, SqlType::Date),
            Value::Time(_) => matches!(ty, SqlType::Time),
            Value::Timestamp(_) => matches!(ty, SqlType::Timestamp),
            Value::Binary(_) => matches!(
                ty,
                SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Object
            ),
        }
    }

    /// SQL comparison: NULL compared with anything is None.
    /// Numbers compare across representations.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if self.is_number() && other.is_number() {
            // Decimal comparison when either side is decimal, else double
            if matches!(self, Value::Decimal(_)) || matches!(other, Value::Decimal(_)) {
                if let (Ok(a), Ok(b)) = (self.as_decimal(), other.as_decimal()) {
                    return Some(a.cmp(&b));
                }
            }
            let (a, b) = (self.as_f64().ok()?, other.as_f64().ok()?);
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total ordering over all values: NULL sorts first, then by type rank,
    /// with numbers comparing across representations.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Integer(_) | Value::Double(_) | Value::Decimal(_) => 2,
                Value::Str(_) => 3,
                Value::Date(_) => 4,
                Value::Time(_) => 5,
                Value::Timestamp(_) => 6,
                Value::Binary(_) => 7,
            }
        }
        match rank(self).cmp(&rank(other)) {
            Ordering::Equal => match (self, other) {
                // NaN and mixed-number edge cases fall back to bit order
                (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
                _ => Ordering::Equal,
            },
            ord => ord,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "DATE '{}'", d),
            Value::Time(t) => write!(f, "TIME '{}'", t),
            Value::Timestamp(ts) => write!(f, "TIMESTAMP '{}'", ts),
            Value::Binary(b) => write!(f, "<binary {} bytes>", b.len()),
        }
    }
}

/// Row key with a total order, for grouping, DISTINCT and set composition.
#[derive(Clone, Debug, PartialEq)]
pub struct RowKey(pub Vec<Value>);

impl Eq for RowKey {}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Double(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Integer(3).compare(&Value::Decimal(Decimal::new(25, 1))),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
    }

    #[test]
    fn total_order_puts_null_first() {
        let mut vals = vec![Value::Str("a".into()), Value::Null, Value::Integer(1)];
        vals.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(vals[0], Value::Null);
        assert_eq!(vals[1], Value::Integer(1));
    }
}
