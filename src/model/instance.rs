//! model::instance
//!
//! Model instances and typed attribute access.
//!
//! # Construction
//!
//! [`Model::new`] casts every given attribute through the schema (unknown
//! attributes are kept as given), then fills declared defaults for missing
//! fields. Cast failures surface immediately as `InvalidModelAttributes`;
//! required fields are checked when the model is saved or read from RDF.
//!
//! # Relations
//!
//! Relation state is created on first access from the schema declaration
//! and kept for the lifetime of the instance (see [`crate::relations`]).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use super::attributes::AttributeStore;
use super::registry::ModelClass;
use crate::core::types::Url;
use crate::core::value::{AttributeValue, Attributes};
use crate::errors::{Result, SoukaiError};
use crate::history::Operation;
use crate::relations::Relation;
use crate::schema::{FieldDefinition, ModelSchema};

/// An instance of a booted model class.
#[derive(Clone)]
pub struct Model {
    class: ModelClass,
    pub(crate) store: AttributeStore,
    pub(crate) relations: BTreeMap<String, Relation>,
    /// RDF classes the resource was read with
    pub(crate) types: Vec<String>,
    /// CRDT operations recorded for this resource
    pub(crate) operations: Vec<Operation>,
    pub(crate) deleted_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.class.name())
            .field("exists", &self.store.exists())
            .field("attributes", self.store.attributes())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Model {
    /// A new (unsaved) instance.
    ///
    /// # Errors
    ///
    /// - `InvalidModelAttributes` if a value does not cast to its field type
    pub fn new(class: &ModelClass, attributes: Attributes) -> Result<Self> {
        let mut model = Self {
            class: class.clone(),
            store: AttributeStore::new(class.schema().primary_key()),
            relations: BTreeMap::new(),
            types: Vec::new(),
            operations: Vec::new(),
            deleted_at: None,
        };

        for (name, value) in attributes {
            model.set(name, value)?;
        }
        for (name, value) in class.schema().defaults() {
            if !model.store.has(&name) {
                model.store.set(name, value);
            }
        }

        Ok(model)
    }

    pub fn class(&self) -> &ModelClass {
        &self.class
    }

    pub fn schema(&self) -> &ModelSchema {
        self.class.schema()
    }

    pub fn exists(&self) -> bool {
        self.store.exists()
    }

    pub fn attributes(&self) -> &Attributes {
        self.store.attributes()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.store.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(AttributeValue::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(AttributeValue::as_bool)
    }

    pub fn get_date(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).and_then(AttributeValue::as_date).copied()
    }

    /// Keys held by a key or array-of-keys field.
    pub fn get_keys(&self, name: &str) -> Vec<&str> {
        self.get(name).map(AttributeValue::keys).unwrap_or_default()
    }

    /// Primary key value (`id` or `url`).
    pub fn key(&self) -> Option<&str> {
        self.store.id()
    }

    /// Resource url of an RDF model.
    pub fn url(&self) -> Option<Url> {
        if !self.schema().is_rdf() {
            return None;
        }
        self.key().and_then(|url| Url::new(url).ok())
    }

    /// Set an attribute, casting it through its field definition.
    ///
    /// # Errors
    ///
    /// - `InvalidModelAttributes` if the value does not cast
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Result<()> {
        let name = name.into();
        let value = self.cast(&name, &value.into())?;
        self.store.set(name, value);
        Ok(())
    }

    /// Set several attributes.
    pub fn fill(&mut self, attributes: Attributes) -> Result<()> {
        for (name, value) in attributes {
            self.set(name, value)?;
        }
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Option<AttributeValue> {
        self.store.unset(name)
    }

    pub fn is_dirty(&self, name: Option<&str>) -> bool {
        self.store.is_dirty(name)
    }

    /// When the resource was deleted, if it was.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// RDF classes this resource was read with (schema classes for new models).
    pub fn rdf_types(&self) -> Vec<&str> {
        if self.types.is_empty() {
            self.schema().rdf_classes().iter().map(String::as_str).collect()
        } else {
            self.types.iter().map(String::as_str).collect()
        }
    }

    /// Recorded CRDT operations, in date order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Relation state, if it was accessed before.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Relation state, created on first access.
    ///
    /// # Errors
    ///
    /// - `Soukai` if the schema declares no such relation
    pub fn relation_mut(&mut self, name: &str) -> Result<&mut Relation> {
        if !self.relations.contains_key(name) {
            let declaration = self.schema().relation(name).cloned().ok_or_else(|| {
                SoukaiError::soukai(format!(
                    "model {} has no relation named '{}'",
                    self.class.name(),
                    name
                ))
            })?;
            self.relations
                .insert(name.to_string(), Relation::new(name, declaration));
        }
        self.relations
            .get_mut(name)
            .ok_or_else(|| SoukaiError::soukai(format!("relation '{}' unavailable", name)))
    }

    /// The related model of a loaded single relation.
    pub fn related(&self, name: &str) -> Option<&Model> {
        self.relations.get(name).and_then(Relation::model)
    }

    /// The related models of a loaded relation.
    pub fn related_many(&self, name: &str) -> Vec<&Model> {
        self.relations
            .get(name)
            .map(Relation::models)
            .unwrap_or_default()
    }

    pub fn is_relation_loaded(&self, name: &str) -> bool {
        self.relations.get(name).map_or(false, Relation::is_loaded)
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// - `InvalidModelAttributes` listing every missing required field
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<String> = self
            .schema()
            .fields()
            .iter()
            .filter(|(name, field)| field.required && !self.store.has(name))
            .map(|(name, _)| name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SoukaiError::invalid_attributes(
                self.class.name(),
                format!("missing required attributes: {}", missing.join(", ")),
                missing,
            ))
        }
    }

    fn cast(&self, name: &str, value: &AttributeValue) -> Result<AttributeValue> {
        let schema = self.schema();
        if name == schema.primary_key() {
            return FieldDefinition::key()
                .cast(value)
                .map_err(|e| self.invalid(name, e.to_string()));
        }

        match schema.field(name) {
            Some(field) => field.cast(value).map_err(|e| self.invalid(name, e.to_string())),
            None => Ok(value.clone()),
        }
    }

    fn invalid(&self, name: &str, message: String) -> SoukaiError {
        SoukaiError::invalid_attributes(
            self.class.name(),
            format!("'{}': {}", name, message),
            vec![name.to_string()],
        )
    }

    /// Build a persisted instance from stored attributes.
    pub(crate) fn hydrate(class: &ModelClass, attributes: Attributes) -> Result<Self> {
        let mut model = Self::new(class, attributes)?;
        model.store.mark_persisted()?;
        Ok(model)
    }
}
