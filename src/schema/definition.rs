//! schema::definition
//!
//! Model schemas, their builder and definition-time validation.
//!
//! # Lifecycle
//!
//! A [`SchemaBuilder`] collects fields, relations and RDF settings;
//! [`define_schema`] validates them and produces an immutable
//! [`ModelSchema`]. Each defined schema gets a unique class identity, which
//! the registry uses to refuse booting the same class twice. Extending a
//! schema ([`ModelSchema::extend`]) starts a new builder from a copy, so
//! the base schema is never mutated.
//!
//! # Validation
//!
//! Definition fails with `InvalidModelDefinition` when:
//! - a field is named after the primary key (`id`/`url`) or a relation
//! - an array has no item type, or an object has no field map
//! - a default value does not cast to its field's type
//! - a `belongsTo*` relation names an undeclared foreign key field
//! - containment or same-document relations are declared on a non-RDF model
//! - an RDF property or class uses an unknown prefix (absolute IRIs are
//!   recognized by a `scheme://` authority or a `urn:` scheme)
//!
//! # Example
//!
//! ```
//! use soukai::schema::{FieldDefinition, ModelSchema};
//!
//! let schema = ModelSchema::builder("Person")
//!     .rdf_context("schema", "https://schema.org/")
//!     .rdf_class("schema:Person")
//!     .collection("https://pod.example/people/")
//!     .field("name", FieldDefinition::string().required())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.primary_key(), "url");
//! assert_eq!(
//!     schema.field("name").unwrap().rdf_property.as_deref(),
//!     Some("https://schema.org/name")
//! );
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::config::{Config, DEFAULT_RESOURCE_HASH};
use crate::core::value::Attributes;
use crate::errors::{Result, SoukaiError};
use crate::rdf::vocab;
use crate::relations::{OnDelete, RelationDeclaration, RelationKind};

use super::field::{FieldDefinition, FieldType};

/// Primary key of plain models.
pub const ID_FIELD: &str = "id";
/// Primary key of RDF models.
pub const URL_FIELD: &str = "url";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Vocabulary for RDF fields when no context is declared.
pub const DEFAULT_VOCAB: &str = "http://www.w3.org/ns/solid/terms#";

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Which timestamp fields a schema maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: bool,
    pub updated_at: bool,
}

impl Timestamps {
    pub fn all() -> Self {
        Self {
            created_at: true,
            updated_at: true,
        }
    }

    pub fn none() -> Self {
        Self {
            created_at: false,
            updated_at: false,
        }
    }
}

/// RDF settings of a schema (all IRIs expanded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdfSchema {
    pub classes: Vec<String>,
    /// Prefix map, in declaration order
    pub context: Vec<(String, String)>,
    pub default_vocab: String,
}

/// An immutable, validated model schema.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    class_id: u64,
    name: String,
    collection: Option<String>,
    fields: BTreeMap<String, FieldDefinition>,
    relations: BTreeMap<String, RelationDeclaration>,
    rdf: Option<RdfSchema>,
    timestamps: Timestamps,
    history: bool,
    default_resource_hash: String,
}

impl ModelSchema {
    /// Start a schema definition.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Start a derived schema from a copy of this one.
    pub fn extend(&self, name: impl Into<String>) -> SchemaBuilder {
        let timestamp_field = |field: &str| {
            (field == CREATED_AT_FIELD && self.timestamps.created_at)
                || (field == UPDATED_AT_FIELD && self.timestamps.updated_at)
        };

        SchemaBuilder {
            name: name.into(),
            collection: self.collection.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(field, _)| !timestamp_field(field))
                .map(|(field, definition)| (field.clone(), definition.clone()))
                .collect(),
            relations: self.relations.clone(),
            rdf: self.rdf.is_some(),
            rdf_classes: self
                .rdf
                .as_ref()
                .map(|rdf| rdf.classes.clone())
                .unwrap_or_default(),
            rdf_context: self
                .rdf
                .as_ref()
                .map(|rdf| rdf.context.clone())
                .unwrap_or_default(),
            default_vocab: self.rdf.as_ref().map(|rdf| rdf.default_vocab.clone()),
            timestamps: self.timestamps,
            history: self.history,
            default_resource_hash: self.default_resource_hash.clone(),
        }
    }

    /// Identity of the class this schema defines.
    pub fn class_id(&self) -> u64 {
        self.class_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine collection (container url for RDF models).
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn primary_key(&self) -> &'static str {
        if self.is_rdf() {
            URL_FIELD
        } else {
            ID_FIELD
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldDefinition> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, RelationDeclaration> {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDeclaration> {
        self.relations.get(name)
    }

    /// Relations keyed by `foreign_key`, in name order.
    pub fn relations_with_foreign_key(&self, foreign_key: &str) -> Vec<(&str, &RelationDeclaration)> {
        self.relations
            .iter()
            .filter(|(_, relation)| relation.foreign_key.as_deref() == Some(foreign_key))
            .map(|(name, relation)| (name.as_str(), relation))
            .collect()
    }

    pub fn is_rdf(&self) -> bool {
        self.rdf.is_some()
    }

    pub fn rdf(&self) -> Option<&RdfSchema> {
        self.rdf.as_ref()
    }

    pub fn rdf_classes(&self) -> &[String] {
        self.rdf.as_ref().map_or(&[], |rdf| rdf.classes.as_slice())
    }

    /// Prefixes for the Turtle writer.
    pub fn prefixes(&self) -> Vec<(String, String)> {
        self.rdf
            .as_ref()
            .map(|rdf| rdf.context.clone())
            .unwrap_or_default()
    }

    /// The field mapped to an RDF property.
    pub fn field_for_property(&self, property: &str) -> Option<(&str, &FieldDefinition)> {
        self.fields
            .iter()
            .find(|(_, field)| field.rdf_property.as_deref() == Some(property))
            .map(|(name, field)| (name.as_str(), field))
    }

    pub fn timestamps(&self) -> Timestamps {
        self.timestamps
    }

    /// Whether `field` is a maintained timestamp.
    pub fn is_timestamp(&self, field: &str) -> bool {
        (field == CREATED_AT_FIELD && self.timestamps.created_at)
            || (field == UPDATED_AT_FIELD && self.timestamps.updated_at)
    }

    /// Whether saves record CRDT operations.
    pub fn history(&self) -> bool {
        self.history
    }

    pub fn default_resource_hash(&self) -> &str {
        &self.default_resource_hash
    }

    /// Default values of every field that declares one.
    pub fn defaults(&self) -> Attributes {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.default.clone().map(|value| (name.clone(), value)))
            .collect()
    }
}

/// Collects a schema definition.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    fields: BTreeMap<String, FieldDefinition>,
    relations: BTreeMap<String, RelationDeclaration>,
    rdf: bool,
    rdf_classes: Vec<String>,
    rdf_context: Vec<(String, String)>,
    default_vocab: Option<String>,
    timestamps: Timestamps,
    history: bool,
    default_resource_hash: String,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
            rdf: false,
            rdf_classes: Vec::new(),
            rdf_context: Vec::new(),
            default_vocab: None,
            timestamps: Timestamps::all(),
            history: false,
            default_resource_hash: DEFAULT_RESOURCE_HASH.to_string(),
        }
    }

    /// Apply configured defaults (timestamps, history, resource hash, prefixes).
    pub fn with_config(mut self, config: &Config) -> Self {
        self.timestamps = if config.timestamps() {
            Timestamps::all()
        } else {
            Timestamps::none()
        };
        self.history = config.history();
        self.default_resource_hash = config.default_resource_hash().to_string();
        for (prefix, namespace) in config.prefixes() {
            if !self.rdf_context.iter().any(|(existing, _)| *existing == prefix) {
                self.rdf_context.push((prefix, namespace));
            }
        }
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.fields.insert(name.into(), definition);
        self
    }

    pub fn relation(mut self, name: impl Into<String>, declaration: RelationDeclaration) -> Self {
        self.relations.insert(name.into(), declaration);
        self
    }

    pub fn belongs_to_one(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationDeclaration::belongs_to_one(related, foreign_key))
    }

    pub fn belongs_to_many(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationDeclaration::belongs_to_many(related, foreign_key))
    }

    pub fn has_one(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationDeclaration::has_one(related, foreign_key))
    }

    pub fn has_many(self, name: &str, related: &str, foreign_key: &str) -> Self {
        self.relation(name, RelationDeclaration::has_many(related, foreign_key))
    }

    pub fn contains(self, name: &str, related: &str) -> Self {
        self.relation(name, RelationDeclaration::contains(related))
    }

    pub fn is_contained_by(self, name: &str, related: &str) -> Self {
        self.relation(name, RelationDeclaration::is_contained_by(related))
    }

    /// Map this model to RDF (implied by any RDF setting).
    pub fn rdf(mut self) -> Self {
        self.rdf = true;
        self
    }

    pub fn rdf_class(mut self, class: impl Into<String>) -> Self {
        self.rdf = true;
        self.rdf_classes.push(class.into());
        self
    }

    /// Declare a prefix. The first declared prefix is the default
    /// vocabulary unless one is set explicitly.
    pub fn rdf_context(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.rdf = true;
        let prefix = prefix.into();
        let namespace = namespace.into();
        match self.rdf_context.iter_mut().find(|(existing, _)| *existing == prefix) {
            Some(entry) => entry.1 = namespace,
            None => self.rdf_context.push((prefix, namespace)),
        }
        self
    }

    pub fn default_vocab(mut self, namespace: impl Into<String>) -> Self {
        self.rdf = true;
        self.default_vocab = Some(namespace.into());
        self
    }

    pub fn timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn default_resource_hash(mut self, hash: impl Into<String>) -> Self {
        self.default_resource_hash = hash.into();
        self
    }

    /// Validate and build the schema. See [`define_schema`].
    pub fn build(self) -> Result<ModelSchema> {
        define_schema(self)
    }
}

/// Validate a schema definition.
///
/// # Errors
///
/// Returns `SoukaiError::InvalidModelDefinition` describing the first
/// problem found (see the module documentation for the rules).
pub fn define_schema(builder: SchemaBuilder) -> Result<ModelSchema> {
    let SchemaBuilder {
        name,
        collection,
        mut fields,
        relations,
        rdf,
        rdf_classes,
        rdf_context,
        default_vocab,
        timestamps,
        history,
        default_resource_hash,
    } = builder;

    let invalid = |message: String| SoukaiError::invalid_definition(name.clone(), message);

    if name.trim().is_empty() {
        return Err(invalid("model name cannot be empty".into()));
    }
    if default_resource_hash.is_empty() || default_resource_hash.contains(['#', '/']) {
        return Err(invalid(format!(
            "invalid resource hash '{}'",
            default_resource_hash
        )));
    }

    for reserved in [ID_FIELD, URL_FIELD] {
        if fields.contains_key(reserved) {
            return Err(invalid(format!("'{}' is a reserved field name", reserved)));
        }
    }

    for (field_name, field) in &fields {
        validate_field(field_name, field).map_err(&invalid)?;
    }

    if timestamps.created_at && !fields.contains_key(CREATED_AT_FIELD) {
        let mut field = FieldDefinition::date();
        if rdf {
            field = field.rdf_property(vocab::PURL_CREATED);
        }
        fields.insert(CREATED_AT_FIELD.to_string(), field);
    }
    if timestamps.updated_at && !fields.contains_key(UPDATED_AT_FIELD) {
        let mut field = FieldDefinition::date();
        if rdf {
            field = field.rdf_property(vocab::PURL_MODIFIED);
        }
        fields.insert(UPDATED_AT_FIELD.to_string(), field);
    }

    for (relation_name, relation) in &relations {
        if fields.contains_key(relation_name) {
            return Err(invalid(format!(
                "relation '{}' collides with a field of the same name",
                relation_name
            )));
        }
        if relation_name == ID_FIELD || relation_name == URL_FIELD {
            return Err(invalid(format!("'{}' is a reserved field name", relation_name)));
        }
        validate_relation(relation_name, relation, &fields, rdf).map_err(&invalid)?;
    }

    let rdf = if rdf {
        let default_vocab = default_vocab
            .or_else(|| rdf_context.first().map(|(_, namespace)| namespace.clone()))
            .unwrap_or_else(|| DEFAULT_VOCAB.to_string());

        let classes = rdf_classes
            .iter()
            .map(|class| expand_iri(class, &rdf_context, &default_vocab))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(&invalid)?;

        for (field_name, field) in fields.iter_mut() {
            resolve_properties(field_name, field, &rdf_context, &default_vocab)
                .map_err(&invalid)?;
        }

        Some(RdfSchema {
            classes,
            context: rdf_context,
            default_vocab,
        })
    } else {
        None
    };

    Ok(ModelSchema {
        class_id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
        name,
        collection,
        fields,
        relations,
        rdf,
        timestamps,
        history,
        default_resource_hash,
    })
}

fn validate_field(name: &str, field: &FieldDefinition) -> std::result::Result<(), String> {
    match field.field_type {
        FieldType::Array => match &field.items {
            Some(items) => validate_field(&format!("{}[]", name), items)?,
            None => return Err(format!("array field '{}' has no item type", name)),
        },
        FieldType::Object => match &field.fields {
            Some(nested) => {
                for (nested_name, nested_field) in nested {
                    validate_field(&format!("{}.{}", name, nested_name), nested_field)?;
                }
            }
            None => return Err(format!("object field '{}' has no fields", name)),
        },
        _ => {}
    }

    if let Some(default) = &field.default {
        field
            .cast(default)
            .map_err(|e| format!("invalid default for '{}': {}", name, e))?;
    }

    Ok(())
}

fn validate_relation(
    name: &str,
    relation: &RelationDeclaration,
    fields: &BTreeMap<String, FieldDefinition>,
    rdf: bool,
) -> std::result::Result<(), String> {
    if relation.related.name().is_empty() {
        return Err(format!("relation '{}' has no related model", name));
    }

    match relation.kind {
        RelationKind::BelongsToOne | RelationKind::BelongsToMany => {
            let foreign_key = relation
                .foreign_key
                .as_deref()
                .ok_or_else(|| format!("relation '{}' has no foreign key", name))?;
            let field = fields.get(foreign_key).ok_or_else(|| {
                format!(
                    "foreign key '{}' of relation '{}' is not a declared field",
                    foreign_key, name
                )
            })?;
            if relation.kind == RelationKind::BelongsToMany && !field.is_array() {
                return Err(format!(
                    "foreign key '{}' of relation '{}' must be an array",
                    foreign_key, name
                ));
            }
        }
        RelationKind::HasOne | RelationKind::HasMany => {
            if relation.foreign_key.is_none() {
                return Err(format!("relation '{}' has no foreign key", name));
            }
        }
        RelationKind::Contains | RelationKind::IsContainedBy => {
            if !rdf {
                return Err(format!(
                    "{} relation '{}' requires an RDF model",
                    relation.kind, name
                ));
            }
            if relation.same_document {
                return Err(format!(
                    "{} relation '{}' cannot use the same document",
                    relation.kind, name
                ));
            }
        }
    }

    if relation.same_document && !rdf {
        return Err(format!(
            "same-document relation '{}' requires an RDF model",
            name
        ));
    }
    if relation.on_delete == OnDelete::Cascade && relation.kind == RelationKind::IsContainedBy {
        return Err(format!(
            "relation '{}' cannot cascade deletes to its container",
            name
        ));
    }

    Ok(())
}

/// Expand a class or property name.
///
/// `prefix:local` names use the context (then well-known prefixes),
/// absolute IRIs are kept, bare names join the default vocabulary. Any
/// other `x:y` name has an unknown prefix.
fn expand_iri(
    name: &str,
    context: &[(String, String)],
    default_vocab: &str,
) -> std::result::Result<String, String> {
    let prefixes = context
        .iter()
        .map(|(prefix, namespace)| (prefix.as_str(), namespace.as_str()));
    if let Some(expanded) = vocab::expand(name, prefixes) {
        return Ok(expanded);
    }

    if let Some((prefix, rest)) = name.split_once(':') {
        if !rest.starts_with("//") && prefix != "urn" {
            return Err(format!("unknown prefix '{}' in '{}'", prefix, name));
        }
        return oxrdf::NamedNodeRef::new(name)
            .map(|iri| iri.as_str().to_string())
            .map_err(|_| format!("cannot expand '{}'", name));
    }

    Ok(format!("{}{}", default_vocab, name))
}

fn resolve_properties(
    name: &str,
    field: &mut FieldDefinition,
    context: &[(String, String)],
    default_vocab: &str,
) -> std::result::Result<(), String> {
    let property = field.rdf_property.as_deref().unwrap_or(name);
    field.rdf_property = Some(expand_iri(property, context, default_vocab)?);

    if let Some(nested) = field.fields.as_mut() {
        for (nested_name, nested_field) in nested.iter_mut() {
            resolve_properties(nested_name, nested_field, context, default_vocab)?;
        }
    }

    Ok(())
}
