//! core::value
//!
//! Typed attribute values held by the attribute store.
//!
//! # Representation
//!
//! [`AttributeValue`] mirrors the field types a schema can declare. Values
//! travel to and from engines as JSON; the JSON form is lossy (dates and
//! keys become strings), and the field schema restores the precise type
//! when documents are read back (see `schema::FieldDefinition::cast`).
//!
//! # Example
//!
//! ```
//! use soukai::core::value::AttributeValue;
//!
//! let value = AttributeValue::from(vec!["a", "b"]);
//! assert!(value.is_array());
//! assert_eq!(value.to_json(), serde_json::json!(["a", "b"]));
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::types::{format_date, Url};

/// Attribute map keyed by field name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Plain text
    String(String),
    /// Any number (integers are represented exactly up to 2^53)
    Number(f64),
    /// Boolean flag
    Boolean(bool),
    /// A point in time (UTC)
    Date(DateTime<Utc>),
    /// A reference to another resource (id or url)
    Key(String),
    /// Multi-valued attribute
    Array(Vec<AttributeValue>),
    /// Nested object
    Object(Attributes),
}

impl AttributeValue {
    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Number(_) => "number",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Date(_) => "date",
            AttributeValue::Key(_) => "key",
            AttributeValue::Array(_) => "array",
            AttributeValue::Object(_) => "object",
        }
    }

    /// Text content of strings and keys.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) | AttributeValue::Key(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            AttributeValue::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Attributes> {
        match self {
            AttributeValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, AttributeValue::Array(_))
    }

    /// The value as a list: arrays yield their items, scalars yield themselves.
    pub fn into_items(self) -> Vec<AttributeValue> {
        match self {
            AttributeValue::Array(items) => items,
            other => vec![other],
        }
    }

    /// Keys referenced by this value (a key, a string, or an array of them).
    pub fn keys(&self) -> Vec<&str> {
        match self {
            AttributeValue::Array(items) => items.iter().filter_map(|item| item.as_str()).collect(),
            other => other.as_str().into_iter().collect(),
        }
    }

    /// Convert to JSON for engine documents.
    ///
    /// Whole numbers are written as JSON integers, dates as
    /// `YYYY-MM-DDTHH:mm:ss.mmmZ` strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            AttributeValue::String(s) | AttributeValue::Key(s) => Value::String(s.clone()),
            AttributeValue::Number(n) => number_to_json(*n),
            AttributeValue::Boolean(b) => Value::Bool(*b),
            AttributeValue::Date(d) => Value::String(format_date(d)),
            AttributeValue::Array(items) => {
                Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Read an untyped value from JSON.
    ///
    /// Returns `None` for `null`. Strings stay strings; the field schema
    /// decides later whether they are dates or keys.
    pub fn from_json(value: &serde_json::Value) -> Option<AttributeValue> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            Value::Number(n) => n.as_f64().map(AttributeValue::Number),
            Value::String(s) => Some(AttributeValue::String(s.clone())),
            Value::Array(items) => Some(AttributeValue::Array(
                items.iter().filter_map(AttributeValue::from_json).collect(),
            )),
            Value::Object(fields) => Some(AttributeValue::Object(
                fields
                    .iter()
                    .filter_map(|(name, value)| {
                        AttributeValue::from_json(value).map(|v| (name.clone(), v))
                    })
                    .collect(),
            )),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{:?}", s),
            AttributeValue::Key(k) => write!(f, "<{}>", k),
            AttributeValue::Date(d) => write!(f, "{}", format_date(d)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Number(f64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Date(value)
    }
}

impl From<Url> for AttributeValue {
    fn from(value: Url) -> Self {
        AttributeValue::Key(value.into())
    }
}

impl From<&Url> for AttributeValue {
    fn from(value: &Url) -> Self {
        AttributeValue::Key(value.as_str().to_string())
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Attributes> for AttributeValue {
    fn from(value: Attributes) -> Self {
        AttributeValue::Object(value)
    }
}

/// Build an [`Attributes`] map.
///
/// ```
/// use soukai::attributes;
/// use soukai::core::value::AttributeValue;
///
/// let attrs = attributes! { "name" => "Alice", "age" => 30 };
/// assert_eq!(attrs.get("age"), Some(&AttributeValue::Number(30.0)));
/// ```
#[macro_export]
macro_rules! attributes {
    () => {
        $crate::core::value::Attributes::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut attributes = $crate::core::value::Attributes::new();
        $(
            attributes.insert(
                ::std::string::String::from($name),
                $crate::core::value::AttributeValue::from($value),
            );
        )+
        attributes
    }};
}
