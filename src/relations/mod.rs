//! relations
//!
//! Relation declarations and per-instance relation state.
//!
//! # Kinds
//!
//! | Kind | Foreign key lives on | Resolved by |
//! |---|---|---|
//! | `BelongsToOne` | owner (single key) | reading the referenced model |
//! | `BelongsToMany` | owner (array of keys) | reading every referenced model |
//! | `HasOne` | related model | querying related models by key |
//! | `HasMany` | related model | querying related models by key |
//! | `Contains` | nobody | listing the owner container |
//! | `IsContainedBy` | nobody | reading the owner's container |
//!
//! Related model classes are referenced by registry name
//! ([`ModelReference`]) and resolved on first use, so model definitions
//! can refer to each other in any order.
//!
//! # Modules
//!
//! - [`resolver`] - load, attach, detach and save
//! - [`polymorphic`] - picking among relations that share a foreign key

pub mod polymorphic;
pub mod resolver;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::Model;

/// Kind of relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    BelongsToOne,
    BelongsToMany,
    HasOne,
    HasMany,
    Contains,
    IsContainedBy,
}

impl RelationKind {
    /// Whether the relation resolves to many models.
    pub fn is_multiple(&self) -> bool {
        matches!(
            self,
            RelationKind::BelongsToMany | RelationKind::HasMany | RelationKind::Contains
        )
    }

    /// Whether the owner stores the foreign key.
    pub fn owner_has_foreign_key(&self) -> bool {
        matches!(self, RelationKind::BelongsToOne | RelationKind::BelongsToMany)
    }

    /// Whether the related model stores the foreign key.
    pub fn related_has_foreign_key(&self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::HasMany)
    }

    /// Whether membership follows from urls instead of a foreign key.
    pub fn is_containment(&self) -> bool {
        matches!(self, RelationKind::Contains | RelationKind::IsContainedBy)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::BelongsToOne => "belongsToOne",
            RelationKind::BelongsToMany => "belongsToMany",
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
            RelationKind::Contains => "contains",
            RelationKind::IsContainedBy => "isContainedBy",
        };
        f.write_str(name)
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "belongsToOne" => Ok(RelationKind::BelongsToOne),
            "belongsToMany" => Ok(RelationKind::BelongsToMany),
            "hasOne" => Ok(RelationKind::HasOne),
            "hasMany" => Ok(RelationKind::HasMany),
            "contains" => Ok(RelationKind::Contains),
            "isContainedBy" => Ok(RelationKind::IsContainedBy),
            _ => Err(format!("unknown relation kind '{}'", name)),
        }
    }
}

/// What happens to related models when the owner is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDelete {
    /// Delete related models first
    Cascade,
    /// Leave related models alone
    #[default]
    Ignore,
}

/// Lazy reference to a model class, by registry name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelReference(String);

impl ModelReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelReference {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declaration of a relation on a model schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDeclaration {
    pub kind: RelationKind,
    pub related: ModelReference,
    /// Field holding the key; `None` for containment relations
    pub foreign_key: Option<String>,
    /// Related models are stored in the owner's document
    pub same_document: bool,
    pub on_delete: OnDelete,
}

impl RelationDeclaration {
    pub fn new(
        kind: RelationKind,
        related: impl Into<ModelReference>,
        foreign_key: Option<&str>,
    ) -> Self {
        Self {
            kind,
            related: related.into(),
            foreign_key: foreign_key.map(str::to_string),
            same_document: false,
            on_delete: OnDelete::Ignore,
        }
    }

    pub fn belongs_to_one(related: impl Into<ModelReference>, foreign_key: &str) -> Self {
        Self::new(RelationKind::BelongsToOne, related, Some(foreign_key))
    }

    pub fn belongs_to_many(related: impl Into<ModelReference>, foreign_key: &str) -> Self {
        Self::new(RelationKind::BelongsToMany, related, Some(foreign_key))
    }

    pub fn has_one(related: impl Into<ModelReference>, foreign_key: &str) -> Self {
        Self::new(RelationKind::HasOne, related, Some(foreign_key))
    }

    pub fn has_many(related: impl Into<ModelReference>, foreign_key: &str) -> Self {
        Self::new(RelationKind::HasMany, related, Some(foreign_key))
    }

    pub fn contains(related: impl Into<ModelReference>) -> Self {
        Self::new(RelationKind::Contains, related, None)
    }

    pub fn is_contained_by(related: impl Into<ModelReference>) -> Self {
        Self::new(RelationKind::IsContainedBy, related, None)
    }

    pub fn same_document(mut self) -> Self {
        self.same_document = true;
        self
    }

    pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = on_delete;
        self
    }
}

/// Resolved related models.
#[derive(Debug, Clone)]
pub enum RelatedModels {
    One(Option<Box<Model>>),
    Many(Vec<Model>),
}

impl RelatedModels {
    fn empty(kind: RelationKind) -> Self {
        if kind.is_multiple() {
            RelatedModels::Many(Vec::new())
        } else {
            RelatedModels::One(None)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RelatedModels::One(model) => model.is_none(),
            RelatedModels::Many(models) => models.is_empty(),
        }
    }

    pub fn models(&self) -> Vec<&Model> {
        match self {
            RelatedModels::One(model) => model.iter().map(|model| model.as_ref()).collect(),
            RelatedModels::Many(models) => models.iter().collect(),
        }
    }

    pub(crate) fn models_mut(&mut self) -> Vec<&mut Model> {
        match self {
            RelatedModels::One(model) => model.iter_mut().map(|model| model.as_mut()).collect(),
            RelatedModels::Many(models) => models.iter_mut().collect(),
        }
    }
}

/// Relation state of one model instance.
///
/// Created on first access and kept for the instance's lifetime;
/// [`Relation::unload`] (or reloading the owner) discards loaded data.
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    declaration: RelationDeclaration,
    related: Option<RelatedModels>,
    /// Models detached since the last save
    detached: Vec<Model>,
}

impl Relation {
    pub fn new(name: impl Into<String>, declaration: RelationDeclaration) -> Self {
        Self {
            name: name.into(),
            declaration,
            related: None,
            detached: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaration(&self) -> &RelationDeclaration {
        &self.declaration
    }

    pub fn kind(&self) -> RelationKind {
        self.declaration.kind
    }

    pub fn is_loaded(&self) -> bool {
        self.related.is_some()
    }

    /// Whether there are no related models (unloaded relations are empty).
    pub fn is_empty(&self) -> bool {
        self.related.as_ref().map_or(true, RelatedModels::is_empty)
    }

    /// The related model of a single relation.
    pub fn model(&self) -> Option<&Model> {
        match &self.related {
            Some(RelatedModels::One(model)) => model.as_deref(),
            _ => None,
        }
    }

    /// Related models (empty when not loaded).
    pub fn models(&self) -> Vec<&Model> {
        self.related
            .as_ref()
            .map(RelatedModels::models)
            .unwrap_or_default()
    }

    pub fn models_mut(&mut self) -> Vec<&mut Model> {
        self.related
            .as_mut()
            .map(RelatedModels::models_mut)
            .unwrap_or_default()
    }

    pub fn detached(&self) -> &[Model] {
        &self.detached
    }

    /// Discard loaded data.
    pub fn unload(&mut self) {
        self.related = None;
        self.detached.clear();
    }

    pub(crate) fn set_loaded(&mut self, related: RelatedModels) {
        self.related = Some(related);
    }

    pub(crate) fn set_models(&mut self, models: Vec<Model>) {
        let related = if self.kind().is_multiple() {
            RelatedModels::Many(models)
        } else {
            RelatedModels::One(models.into_iter().next().map(Box::new))
        };
        self.set_loaded(related);
    }

    pub(crate) fn related_or_empty(&mut self) -> &mut RelatedModels {
        let kind = self.kind();
        self.related.get_or_insert_with(|| RelatedModels::empty(kind))
    }

    pub(crate) fn take_detached(&mut self) -> Vec<Model> {
        std::mem::take(&mut self.detached)
    }

    pub(crate) fn push_detached(&mut self, model: Model) {
        self.detached.push(model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_roundtrip() {
        for kind in [
            RelationKind::BelongsToOne,
            RelationKind::BelongsToMany,
            RelationKind::HasOne,
            RelationKind::HasMany,
            RelationKind::Contains,
            RelationKind::IsContainedBy,
        ] {
            assert_eq!(kind.to_string().parse::<RelationKind>(), Ok(kind));
        }
        assert!("hasSome".parse::<RelationKind>().is_err());
    }

    #[test]
    fn kind_properties() {
        assert!(RelationKind::BelongsToMany.is_multiple());
        assert!(!RelationKind::HasOne.is_multiple());
        assert!(RelationKind::BelongsToOne.owner_has_foreign_key());
        assert!(RelationKind::HasMany.related_has_foreign_key());
        assert!(RelationKind::IsContainedBy.is_containment());
    }

    #[test]
    fn declarations() {
        let declaration = RelationDeclaration::has_many("Post", "authorUrl")
            .same_document()
            .on_delete(OnDelete::Cascade);

        assert_eq!(declaration.kind, RelationKind::HasMany);
        assert_eq!(declaration.related.name(), "Post");
        assert_eq!(declaration.foreign_key.as_deref(), Some("authorUrl"));
        assert!(declaration.same_document);
        assert_eq!(declaration.on_delete, OnDelete::Cascade);

        assert_eq!(RelationDeclaration::contains("Note").foreign_key, None);
    }

    #[test]
    fn unloaded_relations_are_empty() {
        let relation = Relation::new("author", RelationDeclaration::belongs_to_one("Person", "authorUrl"));
        assert!(!relation.is_loaded());
        assert!(relation.is_empty());
        assert!(relation.model().is_none());
        assert!(relation.models().is_empty());
    }

    #[test]
    fn on_delete_serde() {
        assert_eq!(serde_json::to_string(&OnDelete::Cascade).unwrap(), "\"cascade\"");
        let kind: RelationKind = serde_json::from_str("\"isContainedBy\"").unwrap();
        assert_eq!(kind, RelationKind::IsContainedBy);
    }
}
