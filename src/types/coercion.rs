//! Value-to-column coercion
//!
//! Applied to every row before it reaches the table store: numeric
//! widening, decimal rescale, CHAR padding, VARCHAR size enforcement and
//! string-to-temporal parsing.

use crate::error::{Error, Result};
use crate::types::data_type::SqlType;
use crate::types::schema::TableSchema;
use crate::types::value::{Row, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Coerces a value to a column type, or explains why it cannot be stored.
pub fn coerce_value(value: Value, ty: &SqlType, column: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = |value: &Value| Error::TypeMismatch {
        expected: ty.to_string(),
        found: format!("{} in column '{}'", value.type_name(), column),
    };
    match ty {
        SqlType::Boolean | SqlType::Bit => match value {
            Value::Bool(_) => Ok(value),
            Value::Integer(0) => Ok(Value::Bool(false)),
            Value::Integer(1) => Ok(Value::Bool(true)),
            other => Err(mismatch(&other)),
        },
        SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
            let i = value.as_i64().map_err(|_| mismatch(&value))?;
            let bounds = match ty {
                SqlType::TinyInt => (i8::MIN as i64, i8::MAX as i64),
                SqlType::SmallInt => (i16::MIN as i64, i16::MAX as i64),
                SqlType::Integer => (i32::MIN as i64, i32::MAX as i64),
                _ => (i64::MIN, i64::MAX),
            };
            if i < bounds.0 || i > bounds.1 {
                return Err(Error::InvalidValue(format!(
                    "{} out of range for {} column '{}'",
                    i, ty, column
                )));
            }
            Ok(Value::Integer(i))
        }
        SqlType::Float | SqlType::Real | SqlType::Double => {
            let f = value.as_f64().map_err(|_| mismatch(&value))?;
            Ok(Value::Double(f))
        }
        SqlType::Numeric { scale, .. } => {
            let d = match &value {
                Value::Integer(i) => Decimal::from(*i),
                Value::Decimal(d) => *d,
                Value::Double(f) => Decimal::from_f64(*f)
                    .ok_or_else(|| Error::InvalidValue(format!("{} is not a valid numeric", f)))?,
                other => return Err(mismatch(other)),
            };
            let d = match scale {
                Some(s) => d.round_dp(*s as u32),
                None => d,
            };
            Ok(Value::Decimal(d))
        }
        SqlType::Char { size } => {
            let Value::Str(s) = value else {
                return Err(mismatch(&value));
            };
            if s.chars().count() > *size {
                return Err(Error::InvalidValue(format!(
                    "value too long for CHAR({}) column '{}'",
                    size, column
                )));
            }
            // CHAR pads to its declared size
            let pad = size - s.chars().count();
            Ok(Value::Str(s + &" ".repeat(pad)))
        }
        SqlType::VarChar { size } | SqlType::LongVarChar { size } => {
            let Value::Str(s) = value else {
                return Err(mismatch(&value));
            };
            if s.chars().count() > *size {
                return Err(Error::InvalidValue(format!(
                    "value too long for {} column '{}'",
                    ty, column
                )));
            }
            Ok(Value::Str(s))
        }
        SqlType::Date => match &value {
            Value::Date(_) => Ok(value),
            Value::Str(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| Error::InvalidValue(format!("invalid date literal '{}'", s))),
            other => Err(mismatch(other)),
        },
        SqlType::Time => match &value {
            Value::Time(_) => Ok(value),
            Value::Str(s) => NaiveTime::parse_from_str(s, "%H:%M:%S")
                .map(Value::Time)
                .map_err(|_| Error::InvalidValue(format!("invalid time literal '{}'", s))),
            other => Err(mismatch(other)),
        },
        SqlType::Timestamp => match &value {
            Value::Timestamp(_) => Ok(value),
            Value::Date(d) => Ok(Value::Timestamp(d.and_time(NaiveTime::MIN))),
            Value::Str(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(Value::Timestamp)
                .map_err(|_| Error::InvalidValue(format!("invalid timestamp literal '{}'", s))),
            other => Err(mismatch(other)),
        },
        SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Object => {
            match value {
                Value::Binary(_) => Ok(value),
                other => Err(mismatch(&other)),
            }
        }
    }
}

/// Coerces a whole row to a table schema, enforcing NOT NULL.
pub fn coerce_row(row: Row, schema: &TableSchema) -> Result<Row> {
    if row.len() != schema.columns.len() {
        return Err(Error::ArityMismatch(format!(
            "row has {} values, table {} has {} columns",
            row.len(),
            schema.name,
            schema.columns.len()
        )));
    }
    row.into_iter()
        .zip(schema.columns.iter())
        .map(|(value, column)| {
            if value.is_null() {
                if column.not_null {
                    return Err(Error::NullConstraintViolation(column.name.clone()));
                }
                return Ok(Value::Null);
            }
            coerce_value(value, &column.sql_type, &column.name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_pads_and_varchar_bounds() {
        let padded = coerce_value(Value::Str("ab".into()), &SqlType::Char { size: 4 }, "c").unwrap();
        assert_eq!(padded, Value::Str("ab  ".into()));
        assert!(coerce_value(Value::Str("toolong".into()), &SqlType::VarChar { size: 3 }, "c").is_err());
    }

    #[test]
    fn numeric_rescales_to_declared_scale() {
        let v = coerce_value(
            Value::Double(1.005),
            &SqlType::Numeric {
                size: Some(10),
                scale: Some(2),
            },
            "n",
        )
        .unwrap();
        let Value::Decimal(d) = v else { panic!() };
        assert_eq!(d.scale(), 2);
    }

    #[test]
    fn strings_parse_into_temporals() {
        assert!(matches!(
            coerce_value(Value::Str("2024-02-29".into()), &SqlType::Date, "d"),
            Ok(Value::Date(_))
        ));
        assert!(coerce_value(Value::Str("not a date".into()), &SqlType::Date, "d").is_err());
    }
}
