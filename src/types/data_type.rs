//! SQL column types
//!
//! Type names are resolved case-insensitively to exactly one type code.
//! Size/scale legality is enforced here, at declaration time, so the rest
//! of the engine never sees an ill-formed type.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum size for variable-length string columns.
pub const MAX_STRING_SIZE: usize = i32::MAX as usize;

/// A resolved SQL column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    /// NUMERIC/DECIMAL with optional precision and scale.
    Numeric {
        size: Option<u16>,
        scale: Option<u8>,
    },
    /// Fixed-length string, padded to `size`.
    Char {
        size: usize,
    },
    VarChar {
        size: usize,
    },
    LongVarChar {
        size: usize,
    },
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    Boolean,
    /// Serialized object column; the class constraint lives on the column.
    Object,
}

impl SqlType {
    /// Resolves a type name (case-insensitive) plus optional size/scale to
    /// exactly one type code, rejecting declarations the type cannot carry.
    pub fn resolve(name: &str, size: Option<i64>, scale: Option<i64>) -> Result<SqlType> {
        let upper = name.to_ascii_uppercase();

        let no_size = |ty: SqlType| -> Result<SqlType> {
            if size.is_some() || scale.is_some() {
                return Err(Error::InvalidType {
                    name: upper.clone(),
                    reason: "type does not take a size or scale".into(),
                });
            }
            Ok(ty)
        };
        let no_scale = || -> Result<()> {
            if scale.is_some() {
                return Err(Error::InvalidType {
                    name: upper.clone(),
                    reason: "type does not take a scale".into(),
                });
            }
            Ok(())
        };
        let string_size = |default: usize| -> Result<usize> {
            no_scale()?;
            match size {
                None => Ok(default),
                Some(s) if s > 0 => Ok(s as usize),
                Some(s) => Err(Error::InvalidType {
                    name: upper.clone(),
                    reason: format!("size must be positive, got {}", s),
                }),
            }
        };

        match upper.as_str() {
            "BIT" => no_size(SqlType::Bit),
            "TINYINT" => no_size(SqlType::TinyInt),
            "SMALLINT" => no_size(SqlType::SmallInt),
            "INTEGER" | "INT" => no_size(SqlType::Integer),
            "BIGINT" => no_size(SqlType::BigInt),
            "FLOAT" => no_size(SqlType::Float),
            "REAL" => no_size(SqlType::Real),
            "DOUBLE" | "DOUBLE PRECISION" => no_size(SqlType::Double),
            "NUMERIC" | "DECIMAL" => {
                let size = match size {
                    None => None,
                    Some(s) if s > 0 && s <= u16::MAX as i64 => Some(s as u16),
                    Some(s) => {
                        return Err(Error::InvalidType {
                            name: upper,
                            reason: format!("invalid precision {}", s),
                        });
                    }
                };
                let scale = match (scale, size) {
                    (None, _) => None,
                    (Some(_), None) => {
                        return Err(Error::InvalidType {
                            name: upper,
                            reason: "scale requires a precision".into(),
                        });
                    }
                    (Some(s), Some(precision)) if s >= 0 && s <= precision as i64 => {
                        Some(s as u8)
                    }
                    (Some(s), Some(_)) => {
                        return Err(Error::InvalidType {
                            name: upper,
                            reason: format!("scale {} exceeds precision", s),
                        });
                    }
                };
                Ok(SqlType::Numeric { size, scale })
            }
            "CHAR" | "CHARACTER" => Ok(SqlType::Char {
                size: string_size(1)?,
            }),
            "VARCHAR" | "CHARACTER VARYING" => Ok(SqlType::VarChar {
                size: string_size(MAX_STRING_SIZE)?,
            }),
            "LONGVARCHAR" | "LONG VARCHAR" | "TEXT" => Ok(SqlType::LongVarChar {
                size: string_size(MAX_STRING_SIZE)?,
            }),
            "DATE" => no_size(SqlType::Date),
            "TIME" => no_size(SqlType::Time),
            "TIMESTAMP" => no_size(SqlType::Timestamp),
            "BINARY" => no_size(SqlType::Binary),
            "VARBINARY" => no_size(SqlType::VarBinary),
            "LONGVARBINARY" | "LONG VARBINARY" | "BLOB" => no_size(SqlType::LongVarBinary),
            "BOOLEAN" | "BOOL" => no_size(SqlType::Boolean),
            "OBJECT" => no_size(SqlType::Object),
            _ => Err(Error::UnknownType(name.to_string())),
        }
    }

    /// True for the numeric family (integers, floats, NUMERIC).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::Bit
                | SqlType::TinyInt
                | SqlType::SmallInt
                | SqlType::Integer
                | SqlType::BigInt
                | SqlType::Float
                | SqlType::Real
                | SqlType::Double
                | SqlType::Numeric { .. }
        )
    }

    /// True for the string family.
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            SqlType::Char { .. } | SqlType::VarChar { .. } | SqlType::LongVarChar { .. }
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Bit => write!(f, "BIT"),
            SqlType::TinyInt => write!(f, "TINYINT"),
            SqlType::SmallInt => write!(f, "SMALLINT"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Float => write!(f, "FLOAT"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::Double => write!(f, "DOUBLE"),
            SqlType::Numeric { size, scale } => match (size, scale) {
                (Some(p), Some(s)) => write!(f, "NUMERIC({}, {})", p, s),
                (Some(p), None) => write!(f, "NUMERIC({})", p),
                _ => write!(f, "NUMERIC"),
            },
            SqlType::Char { size } => write!(f, "CHAR({})", size),
            SqlType::VarChar { size } if *size == MAX_STRING_SIZE => write!(f, "VARCHAR"),
            SqlType::VarChar { size } => write!(f, "VARCHAR({})", size),
            SqlType::LongVarChar { .. } => write!(f, "LONGVARCHAR"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Time => write!(f, "TIME"),
            SqlType::Timestamp => write!(f, "TIMESTAMP"),
            SqlType::Binary => write!(f, "BINARY"),
            SqlType::VarBinary => write!(f, "VARBINARY"),
            SqlType::LongVarBinary => write!(f, "LONGVARBINARY"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Object => write!(f, "OBJECT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_resolve_case_insensitively() {
        assert_eq!(
            SqlType::resolve("integer", None, None).unwrap(),
            SqlType::Integer
        );
        assert_eq!(
            SqlType::resolve("InTeGeR", None, None).unwrap(),
            SqlType::Integer
        );
        assert_eq!(SqlType::resolve("INT", None, None).unwrap(), SqlType::Integer);
        assert_eq!(
            SqlType::resolve("decimal", Some(10), Some(2)).unwrap(),
            SqlType::Numeric {
                size: Some(10),
                scale: Some(2)
            }
        );
        assert!(matches!(
            SqlType::resolve("FROBNICATOR", None, None),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn char_defaults_to_size_one_and_rejects_scale() {
        assert_eq!(
            SqlType::resolve("CHAR", None, None).unwrap(),
            SqlType::Char { size: 1 }
        );
        assert_eq!(
            SqlType::resolve("char", Some(12), None).unwrap(),
            SqlType::Char { size: 12 }
        );
        assert!(SqlType::resolve("CHAR", Some(12), Some(2)).is_err());
    }

    #[test]
    fn varchar_defaults_to_max_and_rejects_scale() {
        assert_eq!(
            SqlType::resolve("VARCHAR", None, None).unwrap(),
            SqlType::VarChar {
                size: MAX_STRING_SIZE
            }
        );
        assert_eq!(
            SqlType::resolve("varchar", Some(50), None).unwrap(),
            SqlType::VarChar { size: 50 }
        );
        assert!(SqlType::resolve("VARCHAR", Some(50), Some(1)).is_err());
        assert_eq!(
            SqlType::resolve("LONGVARCHAR", None, None).unwrap(),
            SqlType::LongVarChar {
                size: MAX_STRING_SIZE
            }
        );
    }

    #[test]
    fn temporal_bit_and_binary_reject_size_and_scale() {
        for name in ["DATE", "TIME", "TIMESTAMP", "BIT", "BINARY", "VARBINARY", "LONGVARBINARY"] {
            assert!(SqlType::resolve(name, None, None).is_ok(), "{name}");
            assert!(SqlType::resolve(name, Some(4), None).is_err(), "{name}");
            assert!(SqlType::resolve(name, None, Some(2)).is_err(), "{name}");
        }
    }

    #[test]
    fn numeric_scale_rules() {
        assert!(SqlType::resolve("NUMERIC", None, None).is_ok());
        assert!(SqlType::resolve("NUMERIC", Some(10), None).is_ok());
        // Scale without precision
        assert!(SqlType::resolve("NUMERIC", None, Some(2)).is_err());
        // Scale larger than precision
        assert!(SqlType::resolve("NUMERIC", Some(3), Some(5)).is_err());
    }
}
