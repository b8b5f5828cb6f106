//! Runtime values seen by embedded template code.
//!
//! Values follow JavaScript conventions closely enough for templates written
//! against a JSON data model: `undefined` is distinct from `null`, numbers are
//! doubles, and composite values are reference counted so that handing the
//! whole content tree to every page is cheap.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};

use crate::date::JalaliDate;

/// A template value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Missing value.
    #[default]
    Undefined,
    /// JSON `null`.
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<BTreeMap<String, Value>>),
    /// A calendar date found under a `…date` key.
    Date(Arc<JalaliDate>),
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }

    /// Build an array value.
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Arc::new(items))
    }

    /// Build an object value.
    pub fn object(fields: BTreeMap<String, Value>) -> Self {
        Self::Object(Arc::new(fields))
    }

    /// JavaScript truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Date(_) => true,
        }
    }

    /// `undefined` or `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) | Self::Date(_) => "object",
        }
    }

    /// Borrow the string contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up an object field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Text produced when the value is written into the page.
    ///
    /// `undefined` and `null` render as nothing.
    #[must_use]
    pub fn to_output(&self) -> String {
        match self {
            Self::Undefined | Self::Null => String::new(),
            other => other.to_js_string(),
        }
    }

    /// JavaScript `String(value)`.
    #[must_use]
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Array(items) => {
                let mut out = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&item.to_output());
                }
                out
            }
            Self::Object(_) | Self::Date(_) => "[object Object]".to_string(),
        }
    }

    /// JavaScript `Number(value)`.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            Self::Object(_) | Self::Date(_) => f64::NAN,
        }
    }

    /// `===`.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Date(a), Self::Date(b)) => Arc::ptr_eq(a, b),
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// `==`.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Self::Number(_) | Self::Bool(_), Self::String(_))
            | (Self::String(_), Self::Number(_) | Self::Bool(_))
            | (Self::Bool(_), Self::Number(_))
            | (Self::Number(_), Self::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_eq(other),
        }
    }
}

/// Format a number the way JavaScript prints it.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(Arc::from(s)),
            serde_json::Value::Array(items) => {
                Self::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Self::object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::array(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Self::Number(_) => serializer.serialize_unit(),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields.iter() {
                    if !matches!(value, Self::Undefined) {
                        map.serialize_entry(key, value)?;
                    }
                }
                map.end()
            }
            Self::Date(date) => {
                let mut map = serializer.serialize_map(None)?;
                for name in JalaliDate::FIELDS {
                    if let Some(value) = date.field(name)
                        && !matches!(value, Self::Undefined)
                    {
                        map.serialize_entry(name, value)?;
                    }
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"title": "Home", "tags": ["a", "b"], "draft": false}));
        assert_eq!(value.field("title"), Some(&Value::string("Home")));
        assert_eq!(
            value.field("tags").map(Value::to_js_string).as_deref(),
            Some("a,b")
        );
        assert_eq!(value.field("draft"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::string("0").is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_output_of_missing_values_is_empty() {
        assert_eq!(Value::Undefined.to_output(), "");
        assert_eq!(Value::Null.to_output(), "");
        assert_eq!(Value::Undefined.to_js_string(), "undefined");
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(Value::Number(1.0).loose_eq(&Value::string("1")));
        assert!(!Value::Number(1.0).strict_eq(&Value::string("1")));
    }

    #[test]
    fn test_serialize_roundtrip_shape() {
        let value = Value::from(json!({"a": [1, 2.5, null], "b": "x"}));
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"a":[1,2.5,null],"b":"x"}"#);
    }
}
