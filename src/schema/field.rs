//! schema::field
//!
//! Field definitions and type casting.
//!
//! # Casting
//!
//! Values reach a model from three places: application code, engine
//! documents (JSON) and RDF literals. [`FieldDefinition::cast`] turns any of
//! them into the declared type:
//!
//! | Declared | Accepts |
//! |---|---|
//! | String | strings, keys, numbers, booleans, dates |
//! | Number | numbers, numeric strings |
//! | Boolean | booleans, `"true"`/`"false"` |
//! | Date | dates, date strings, epoch milliseconds |
//! | Key | keys, strings |
//! | Array | arrays (items cast one by one), single values (wrapped) |
//! | Object | objects (declared fields cast, others kept) |
//!
//! After the type cast, the field's deserializer (if any) runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{date_from_millis, format_date, parse_date, truncate_to_millis};
use crate::core::value::{AttributeValue, Attributes};

/// A value could not be cast to a field's type.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot cast {value} to {expected}")]
pub struct CastError {
    pub value: String,
    pub expected: FieldType,
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Key,
    Array,
    Object,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::Key => "Key",
            FieldType::Array => "Array",
            FieldType::Object => "Object",
        };
        f.write_str(name)
    }
}

impl FromStr for FieldType {
    type Err = String;

    /// Parse a type name, ignoring case.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "key" => Ok(FieldType::Key),
            "array" => Ok(FieldType::Array),
            "object" => Ok(FieldType::Object),
            _ => Err(format!("unknown field type '{}'", name)),
        }
    }
}

/// Custom conversion hooks for a field.
///
/// `serialize` runs before a value is written (to a document or RDF),
/// `deserialize` runs after a value is read and cast.
#[derive(Clone, Copy)]
pub struct FieldCodec {
    pub serialize: fn(&AttributeValue) -> AttributeValue,
    pub deserialize: fn(&AttributeValue) -> AttributeValue,
}

impl fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCodec")
    }
}

/// Declaration of a single field.
///
/// # Example
///
/// ```
/// use soukai::schema::FieldDefinition;
/// use soukai::core::value::AttributeValue;
///
/// let tags = FieldDefinition::array(FieldDefinition::string())
///     .default_value(Vec::<String>::new())
///     .rdf_property("schema:keywords");
///
/// let cast = tags.cast(&AttributeValue::from("rust")).unwrap();
/// assert_eq!(cast, AttributeValue::from(vec!["rust"]));
/// ```
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<AttributeValue>,
    /// RDF predicate; resolved to a full IRI when the schema is defined
    pub rdf_property: Option<String>,
    /// Item type of arrays
    pub items: Option<Box<FieldDefinition>>,
    /// Nested fields of objects
    pub fields: Option<BTreeMap<String, FieldDefinition>>,
    pub codec: Option<FieldCodec>,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            rdf_property: None,
            items: None,
            fields: None,
            codec: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn key() -> Self {
        Self::new(FieldType::Key)
    }

    pub fn array(items: FieldDefinition) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(FieldType::Array)
        }
    }

    pub fn object(fields: BTreeMap<String, FieldDefinition>) -> Self {
        Self {
            fields: Some(fields),
            ..Self::new(FieldType::Object)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<AttributeValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn rdf_property(mut self, property: impl Into<String>) -> Self {
        self.rdf_property = Some(property.into());
        self
    }

    pub fn codec(mut self, codec: FieldCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn is_array(&self) -> bool {
        self.field_type == FieldType::Array
    }

    /// Cast a value to this field's type, then run the deserializer.
    pub fn cast(&self, value: &AttributeValue) -> Result<AttributeValue, CastError> {
        let cast = self.cast_type(value)?;
        Ok(match &self.codec {
            Some(codec) => (codec.deserialize)(&cast),
            None => cast,
        })
    }

    /// Run the serializer (if any) on a value about to be written.
    pub fn serialize(&self, value: &AttributeValue) -> AttributeValue {
        match &self.codec {
            Some(codec) => (codec.serialize)(value),
            None => value.clone(),
        }
    }

    /// Cast one array item (values of non-array fields are cast whole).
    pub fn cast_item(&self, value: &AttributeValue) -> Result<AttributeValue, CastError> {
        match &self.items {
            Some(items) if self.is_array() => items.cast(value),
            _ => self.cast(value),
        }
    }

    fn cast_type(&self, value: &AttributeValue) -> Result<AttributeValue, CastError> {
        let fail = || CastError {
            value: value.to_string(),
            expected: self.field_type,
        };

        match (self.field_type, value) {
            (FieldType::String, AttributeValue::String(_)) => Ok(value.clone()),
            (FieldType::String, AttributeValue::Key(k)) => Ok(AttributeValue::String(k.clone())),
            (FieldType::String, AttributeValue::Date(d)) => {
                Ok(AttributeValue::String(format_date(d)))
            }
            (FieldType::String, AttributeValue::Number(_) | AttributeValue::Boolean(_)) => {
                Ok(AttributeValue::String(value.to_json().to_string()))
            }

            (FieldType::Number, AttributeValue::Number(_)) => Ok(value.clone()),
            (FieldType::Number, AttributeValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(AttributeValue::Number)
                .map_err(|_| fail()),

            (FieldType::Boolean, AttributeValue::Boolean(_)) => Ok(value.clone()),
            (FieldType::Boolean, AttributeValue::String(s)) => match s.as_str() {
                "true" | "1" => Ok(AttributeValue::Boolean(true)),
                "false" | "0" => Ok(AttributeValue::Boolean(false)),
                _ => Err(fail()),
            },

            (FieldType::Date, AttributeValue::Date(date)) => {
                Ok(AttributeValue::Date(truncate_to_millis(*date)))
            }
            (FieldType::Date, AttributeValue::String(s)) => parse_date(s)
                .map(|date| AttributeValue::Date(truncate_to_millis(date)))
                .map_err(|_| fail()),
            (FieldType::Date, AttributeValue::Number(n)) => date_from_millis(*n as i64)
                .map(AttributeValue::Date)
                .map_err(|_| fail()),

            (FieldType::Key, AttributeValue::Key(_)) => Ok(value.clone()),
            (FieldType::Key, AttributeValue::String(s)) => Ok(AttributeValue::Key(s.clone())),

            (FieldType::Array, AttributeValue::Array(items)) => items
                .iter()
                .map(|item| self.cast_item(item))
                .collect::<Result<Vec<_>, _>>()
                .map(AttributeValue::Array),
            (FieldType::Array, single) => {
                Ok(AttributeValue::Array(vec![self.cast_item(single)?]))
            }

            (FieldType::Object, AttributeValue::Object(object)) => {
                let mut cast = Attributes::new();
                for (name, value) in object {
                    let value = match self.fields.as_ref().and_then(|fields| fields.get(name)) {
                        Some(field) => field.cast(value)?,
                        None => value.clone(),
                    };
                    cast.insert(name.clone(), value);
                }
                Ok(AttributeValue::Object(cast))
            }

            _ => Err(fail()),
        }
    }
}
