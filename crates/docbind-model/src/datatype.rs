//! Content datatypes, values and string conversion.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared datatype of an attribute value or element text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    /// No content allowed.
    Void,
    String,
    Boolean,
    Integer,
    Float,
    /// Supertype of every datatype.
    Any,
}

impl Datatype {
    pub fn name(self) -> &'static str {
        match self {
            Datatype::Void => "void",
            Datatype::String => "string",
            Datatype::Boolean => "boolean",
            Datatype::Integer => "integer",
            Datatype::Float => "float",
            Datatype::Any => "any",
        }
    }

    /// True if a value of type `other` may be used where `self` is declared.
    pub fn is_assignable_from(self, other: Datatype) -> bool {
        self == other || self == Datatype::Any
    }

    /// True if `value` is an instance of this datatype.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Datatype::Void => false,
            Datatype::Any => true,
            _ => value.datatype() == self,
        }
    }
}

impl PartialOrd for Datatype {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datatype {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name().cmp(other.name())
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed attribute value or element text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn datatype(&self) -> Datatype {
        match self {
            Value::Boolean(_) => Datatype::Boolean,
            Value::Integer(_) => Datatype::Integer,
            Value::Float(_) => Datatype::Float,
            Value::String(_) => Datatype::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert this value to `datatype`.
    ///
    /// Values already of the target type pass through unchanged. Strings are
    /// parsed; any other value is rendered to a string first.
    pub fn convert(self, datatype: Datatype) -> Result<Value, ParseError> {
        if datatype == Datatype::Any || self.datatype() == datatype {
            return Ok(self);
        }
        let text = match self {
            Value::String(s) => s,
            other => other.to_string(),
        };
        convert_str(&text, datatype)
    }
}

/// Parse a raw string into a value of `datatype`.
pub fn convert_str(text: &str, datatype: Datatype) -> Result<Value, ParseError> {
    let invalid = || ParseError::InvalidValue {
        value: text.to_string(),
        datatype,
    };
    match datatype {
        Datatype::String | Datatype::Any => Ok(Value::String(text.to_string())),
        Datatype::Boolean => match text.trim() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(invalid()),
        },
        Datatype::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid()),
        Datatype::Float => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid()),
        Datatype::Void => Err(ParseError::ContentNotAllowed {
            value: text.to_string(),
        }),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_conversion() {
        assert_eq!(
            convert_str("1", Datatype::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            convert_str("false", Datatype::Boolean).unwrap(),
            Value::Boolean(false)
        );
        assert!(convert_str("yes", Datatype::Boolean).is_err());
    }

    #[test]
    fn test_numeric_conversion() {
        assert_eq!(
            convert_str(" 42 ", Datatype::Integer).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            convert_str("2.5", Datatype::Float).unwrap(),
            Value::Float(2.5)
        );
        let err = convert_str("4x", Datatype::Integer).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn test_void_rejects_text() {
        assert!(matches!(
            convert_str("x", Datatype::Void),
            Err(ParseError::ContentNotAllowed { .. })
        ));
    }

    #[test]
    fn test_convert_passes_matching_values_through() {
        assert_eq!(
            Value::Integer(3).convert(Datatype::Integer).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            Value::Integer(3).convert(Datatype::String).unwrap(),
            Value::String("3".into())
        );
    }

    #[test]
    fn test_assignability() {
        assert!(Datatype::Any.is_assignable_from(Datatype::Integer));
        assert!(!Datatype::Integer.is_assignable_from(Datatype::Any));
        assert!(Datatype::String.accepts(&Value::from("a")));
        assert!(!Datatype::Void.accepts(&Value::from("a")));
    }
}
