//! schema::declaration
//!
//! Serializable schema declarations.
//!
//! Schemas can be declared as data (JSON or TOML) instead of code. A
//! declaration is turned into a [`SchemaBuilder`] and goes through the
//! same validation as builder-made schemas, so unknown type names or
//! arrays without item types fail with `InvalidModelDefinition`.
//!
//! ```toml
//! name = "Person"
//! collection = "https://pod.example/people/"
//! rdf_classes = ["schema:Person"]
//!
//! [rdf_contexts]
//! schema = "https://schema.org/"
//!
//! [fields.name]
//! type = "string"
//! required = true
//!
//! [relations.friends]
//! kind = "belongsToMany"
//! model = "Person"
//! foreign_key = "friendUrls"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::value::AttributeValue;
use crate::errors::{Result, SoukaiError};
use crate::relations::{OnDelete, RelationDeclaration, RelationKind};

use super::definition::{ModelSchema, SchemaBuilder, Timestamps};
use super::field::{FieldDefinition, FieldType};

/// A schema declared as data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaDeclaration {
    pub name: String,
    pub collection: Option<String>,
    pub rdf_contexts: BTreeMap<String, String>,
    pub rdf_classes: Vec<String>,
    pub default_vocab: Option<String>,
    pub timestamps: Option<bool>,
    pub history: Option<bool>,
    pub fields: BTreeMap<String, FieldDeclaration>,
    pub relations: BTreeMap<String, RelationSpec>,
}

/// A field declared as data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldDeclaration {
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub rdf_property: Option<String>,
    pub items: Option<Box<FieldDeclaration>>,
    pub fields: Option<BTreeMap<String, FieldDeclaration>>,
}

/// A relation declared as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationSpec {
    pub kind: RelationKind,
    pub model: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub same_document: bool,
    #[serde(default)]
    pub on_delete: OnDelete,
}

impl SchemaDeclaration {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SoukaiError::invalid_definition("<declaration>", e.to_string()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| SoukaiError::invalid_definition("<declaration>", e.message().to_string()))
    }

    /// Convert into a builder (not yet validated).
    pub fn into_builder(self) -> Result<SchemaBuilder> {
        let name = self.name;
        let mut builder = ModelSchema::builder(name.clone());

        if let Some(collection) = self.collection {
            builder = builder.collection(collection);
        }
        for (prefix, namespace) in self.rdf_contexts {
            builder = builder.rdf_context(prefix, namespace);
        }
        for class in self.rdf_classes {
            builder = builder.rdf_class(class);
        }
        if let Some(vocab) = self.default_vocab {
            builder = builder.default_vocab(vocab);
        }
        if let Some(timestamps) = self.timestamps {
            builder = builder.timestamps(if timestamps {
                Timestamps::all()
            } else {
                Timestamps::none()
            });
        }
        if let Some(history) = self.history {
            builder = builder.history(history);
        }

        for (field_name, field) in self.fields {
            let definition = field
                .into_definition()
                .map_err(|message| {
                    SoukaiError::invalid_definition(&name, format!("field '{}': {}", field_name, message))
                })?;
            builder = builder.field(field_name, definition);
        }

        for (relation_name, relation) in self.relations {
            let mut declaration =
                RelationDeclaration::new(relation.kind, relation.model.as_str(), relation.foreign_key.as_deref())
                    .on_delete(relation.on_delete);
            if relation.same_document {
                declaration = declaration.same_document();
            }
            builder = builder.relation(relation_name, declaration);
        }

        Ok(builder)
    }

    /// Convert and validate.
    pub fn build(self) -> Result<ModelSchema> {
        self.into_builder()?.build()
    }
}

impl FieldDeclaration {
    fn into_definition(self) -> std::result::Result<FieldDefinition, String> {
        let field_type: FieldType = self.field_type.parse()?;

        let mut definition = FieldDefinition::new(field_type);
        definition.required = self.required;
        definition.rdf_property = self.rdf_property;
        definition.default = self.default.as_ref().and_then(AttributeValue::from_json);

        if let Some(items) = self.items {
            definition.items = Some(Box::new(items.into_definition()?));
        }
        if let Some(fields) = self.fields {
            let mut nested = BTreeMap::new();
            for (name, field) in fields {
                nested.insert(name, field.into_definition()?);
            }
            definition.fields = Some(nested);
        }

        Ok(definition)
    }
}
