//! model::persistence
//!
//! Saving, deleting and finding models through their class's engine.
//!
//! # Document layout
//!
//! Plain models are JSON documents in the class collection, keyed by `id`.
//!
//! RDF models live in expanded JSON-LD documents. The engine collection
//! is the container url and the document id is the document url (the
//! resource url without fragment). A document may hold several resources:
//! the model, its same-document related models, its history operations
//! and its metadata. Saving only rewrites the statements the model owns
//! and leaves other resources in the document alone.
//!
//! # History
//!
//! With history enabled, every save of an existing model records the
//! diff as operations (the first tracked save also records the initial
//! `Set` operations at the creation date). Deleting writes a tombstone
//! in place of the resource.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::attributes::AttributeStore;
use super::instance::Model;
use super::registry::BootedModel;
use crate::core::types::{now, parse_date, Url};
use crate::core::value::{AttributeValue, Attributes};
use crate::engine::{Document, Engine, EngineError, Filters, Updates};
use crate::errors::{Result, SoukaiError};
use crate::history::rdf::{
    assign_operation_urls, operation_subjects, read_metadata, read_operations, write_metadata,
    write_operations, Metadata,
};
use crate::history::{diff_operations, initial_operations, merge_operations, replay, Operation};
use crate::rdf::jsonld::{
    document_to_quads, metadata_url, quads_to_document, read_tombstone, tombstone_document,
};
use crate::rdf::mapper::{create_from_rdf, reachable_nodes, Encoder};
use crate::rdf::term::{objects, subjects_of_type, types_of, Quad, Term};
use crate::rdf::{parse_turtle, vocab, write_turtle};
use crate::relations::{OnDelete, Relation, RelationKind};
use crate::schema::definition::{CREATED_AT_FIELD, UPDATED_AT_FIELD};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of [`BootedModel::find_with_tombstone`].
#[derive(Debug)]
pub enum FindResult {
    Found(Model),
    /// The resource existed and was deleted
    Deleted { deleted_at: DateTime<Utc> },
    Missing,
}

impl FindResult {
    pub fn into_model(self) -> Option<Model> {
        match self {
            FindResult::Found(model) => Some(model),
            _ => None,
        }
    }
}

impl Model {
    /// Persist the model (and its same-document related models).
    ///
    /// Existing models without changes are left untouched. A failed save
    /// leaves the model as it was before the call: timestamps, minted
    /// urls and recorded operations are only kept once the engine write
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - `InvalidModelAttributes` if a required field is missing
    /// - engine errors from the underlying calls
    pub async fn save(&mut self) -> Result<()> {
        if self.exists() && !self.is_dirty(None) && !self.has_dirty_embedded() {
            return Ok(());
        }

        self.validate()?;

        let date = now();
        let snapshot = SaveSnapshot::of(self);
        self.touch(date);

        let saved = if self.schema().is_rdf() {
            self.save_rdf(date).await
        } else {
            self.save_plain().await
        };
        if saved.is_err() {
            debug!(model = %self.class().name(), "save failed, restoring state");
            snapshot.restore(self);
        }
        saved
    }

    /// Delete the model, after cascading to relations that ask for it.
    ///
    /// # Errors
    ///
    /// - engine errors from the underlying calls
    pub async fn delete(&mut self) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }

        self.cascade_delete().await?;

        let date = now();
        if self.schema().is_rdf() {
            self.delete_rdf(date).await?;
        } else {
            let engine = self.class().engine()?;
            let collection = self.class().collection();
            let id = self.required_key()?.to_string();
            debug!(model = %self.class().name(), %id, engine = engine.name(), "deleting");
            engine.delete(&collection, &id).await?;
        }

        self.deleted_at = Some(date);
        self.store.mark_new();
        Ok(())
    }

    /// Turtle for the model and its same-document related models.
    pub fn to_turtle(&self) -> Result<String> {
        let mut encoder = Encoder::default();
        encoder.model(self)?;
        for related in self.embedded_models() {
            encoder.model(related)?;
        }

        let mut prefixes = self.schema().prefixes();
        if let Ok(registry) = self.class().registry() {
            prefixes.extend(registry.config().prefixes());
        }
        Ok(write_turtle(&encoder.quads, &prefixes)?)
    }

    /// Replace the attributes with the replay of the recorded operations.
    ///
    /// Models without operations are left as they are.
    ///
    /// # Errors
    ///
    /// - `Soukai` if an operation cannot be applied
    pub fn rebuild_from_history(&mut self) -> Result<()> {
        if self.operations.is_empty() {
            return Ok(());
        }

        let replayed = replay(self.schema(), &self.operations)?;
        let mut attributes = replayed.attributes;
        if let Some(key) = self.store.get(self.store.primary_key()).cloned() {
            attributes.insert(self.store.primary_key().to_string(), key);
        }

        let timestamps = self.schema().timestamps();
        if let (Some(first), Some(last)) = (self.operations.first(), self.operations.last()) {
            if timestamps.created_at {
                attributes.insert(CREATED_AT_FIELD.to_string(), first.date.into());
            }
            if timestamps.updated_at {
                attributes.insert(UPDATED_AT_FIELD.to_string(), last.date.into());
            }
        }

        debug!(model = %self.class().name(), operations = self.operations.len(), "rebuilt from history");
        self.store.replace(attributes);
        self.deleted_at = replayed.deleted_at;
        Ok(())
    }

    /// Merge the operation histories of two replicas of the same resource
    /// and rebuild both from the union.
    ///
    /// # Errors
    ///
    /// - `Soukai` if the models are different resources or cannot replay
    pub fn sync(&mut self, other: &mut Model) -> Result<()> {
        let url = self.url().ok_or_else(|| SoukaiError::soukai("only RDF models can sync"))?;
        if other.url().as_ref() != Some(&url) {
            return Err(SoukaiError::soukai(format!(
                "cannot sync {} with a different resource",
                url
            )));
        }

        self.ensure_history(&url);
        other.ensure_history(&url);

        let merged = merge_operations([self.operations.as_slice(), other.operations.as_slice()]);
        self.operations = merged.clone();
        other.operations = merged;

        self.rebuild_from_history()?;
        other.rebuild_from_history()
    }

    fn ensure_history(&mut self, url: &Url) {
        if self.operations.is_empty() {
            let date = self.get_date(CREATED_AT_FIELD).unwrap_or_else(now);
            self.operations = initial_operations(self.schema(), self.attributes(), date);
        }
        assign_operation_urls(&mut self.operations, url);
    }

    fn touch(&mut self, date: DateTime<Utc>) {
        let timestamps = self.schema().timestamps();
        if timestamps.created_at && !self.store.has(CREATED_AT_FIELD) {
            self.store.set(CREATED_AT_FIELD, date.into());
        }
        if timestamps.updated_at {
            self.store.set(UPDATED_AT_FIELD, date.into());
        }
    }

    fn required_key(&self) -> Result<&str> {
        self.key().ok_or_else(|| {
            SoukaiError::soukai(format!("{} has no primary key", self.class().name()))
        })
    }

    async fn save_plain(&mut self) -> Result<()> {
        let engine = self.class().engine()?;
        let collection = self.class().collection();

        if self.exists() {
            let id = self.required_key()?.to_string();
            let updates = Updates {
                set: plain_document(&self.store.dirty(), self.store.primary_key()),
                unset: self.store.removed(),
            };
            if !updates.is_empty() {
                debug!(model = %self.class().name(), %id, engine = engine.name(), "updating");
                engine.update(&collection, &id, updates).await?;
            }
        } else {
            let document = plain_document(self.attributes(), self.store.primary_key());
            debug!(model = %self.class().name(), engine = engine.name(), "creating");
            let id = engine.create(&collection, document, self.key()).await?;
            self.store.set(self.store.primary_key(), AttributeValue::Key(id));
        }

        self.store.mark_persisted()
    }

    async fn save_rdf(&mut self, date: DateTime<Utc>) -> Result<()> {
        let url = match self.url() {
            Some(url) => url,
            None => {
                let url = self.mint_url()?;
                self.store
                    .set(self.store.primary_key(), AttributeValue::Key(url.as_str().to_string()));
                url
            }
        };

        if self.schema().history() && self.exists() {
            self.record_operations(date);
            assign_operation_urls(&mut self.operations, &url);
        }
        self.prepare_embedded(&url, date)?;

        let mut encoder = Encoder::default();
        encoder.model(self)?;
        for related in self.embedded_models() {
            encoder.model(related)?;
        }
        write_operations(&mut encoder, self.schema(), url.as_str(), &self.operations)?;
        let mut quads = encoder.quads;
        if self.schema().history() {
            let metadata = Metadata {
                created_at: self.get_date(CREATED_AT_FIELD),
                updated_at: self.get_date(UPDATED_AT_FIELD),
                deleted_at: None,
            };
            write_metadata(&mut quads, url.as_str(), &metadata);
        }

        let engine = self.class().engine()?;
        let owned = self.owned_subjects(&url);
        let document = DocumentLocation::of(&url)?;

        if self.exists() {
            document.merge(engine.as_ref(), &owned, quads).await?;
        } else {
            debug!(model = %self.class().name(), %url, engine = engine.name(), "creating");
            match engine
                .create(&document.container, quads_to_document(&quads), Some(&document.id))
                .await
            {
                Ok(_) => {}
                Err(EngineError::DocumentAlreadyExists { .. }) => {
                    document.merge(engine.as_ref(), &owned, quads).await?;
                }
                Err(error) => return Err(error.into()),
            }
        }

        for related in self.embedded_models_mut() {
            related.store.mark_persisted()?;
        }
        self.store.mark_persisted()
    }

    pub(crate) fn mint_url(&self) -> Result<Url> {
        let container = Url::new(self.class().collection()).map_err(|_| {
            SoukaiError::soukai(format!(
                "cannot mint a url for {}: its collection is not a container url",
                self.class().name()
            ))
        })?;
        let slug = Uuid::new_v4().to_string();
        Ok(container
            .child(&slug)
            .with_fragment(self.schema().default_resource_hash()))
    }

    fn record_operations(&mut self, date: DateTime<Utc>) {
        let class = self.class().clone();
        let schema = class.schema();
        let original = self.store.original();

        if self.operations.is_empty() {
            let created_at = original
                .get(CREATED_AT_FIELD)
                .and_then(AttributeValue::as_date)
                .copied()
                .unwrap_or(date);
            self.operations = initial_operations(schema, original, created_at);
        }

        let diff = diff_operations(schema, original, self.store.attributes(), date);
        self.operations.extend(diff);
    }

    /// Give same-document related models urls, foreign keys and timestamps.
    fn prepare_embedded(&mut self, url: &Url, date: DateTime<Utc>) -> Result<()> {
        let owner_key = AttributeValue::Key(url.as_str().to_string());

        for relation in self.relations.values_mut() {
            let declaration = relation.declaration().clone();
            if !declaration.same_document {
                continue;
            }

            for related in relation.models_mut() {
                if related.key().is_none() {
                    let fragment = Uuid::new_v4().to_string();
                    related.store.set(
                        related.store.primary_key(),
                        AttributeValue::Key(url.with_fragment(&fragment).as_str().to_string()),
                    );
                }
                if let (true, Some(foreign_key)) = (
                    declaration.kind.related_has_foreign_key(),
                    declaration.foreign_key.as_deref(),
                ) {
                    related.set(foreign_key, owner_key.clone())?;
                }
                if !related.exists() || related.is_dirty(None) {
                    related.touch(date);
                }
                related.validate()?;
            }
        }

        Ok(())
    }

    fn has_dirty_embedded(&self) -> bool {
        self.relations.values().any(|relation| {
            relation.declaration().same_document
                && (!relation.detached().is_empty()
                    || relation
                        .models()
                        .iter()
                        .any(|model| !model.exists() || model.is_dirty(None)))
        })
    }

    fn embedded_models(&self) -> Vec<&Model> {
        self.relations
            .values()
            .filter(|relation| relation.declaration().same_document)
            .flat_map(|relation| relation.models())
            .collect()
    }

    fn embedded_models_mut(&mut self) -> Vec<&mut Model> {
        self.relations
            .values_mut()
            .filter(|relation| relation.declaration().same_document)
            .flat_map(|relation| relation.models_mut())
            .collect()
    }

    /// Node ids whose statements this model rewrites on save.
    fn owned_subjects(&mut self, url: &Url) -> Vec<String> {
        let mut subjects = vec![url.as_str().to_string(), metadata_url(url.as_str())];
        subjects.extend(self.operations.iter().filter_map(|op| op.url.clone()));

        for relation in self.relations.values_mut() {
            if !relation.declaration().same_document {
                continue;
            }
            let detached = relation.take_detached();
            subjects.extend(
                relation
                    .models()
                    .into_iter()
                    .chain(detached.iter())
                    .filter_map(|model| model.key().map(str::to_string)),
            );
        }

        subjects
    }

    async fn cascade_delete(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .schema()
            .relations()
            .iter()
            .filter(|(_, declaration)| {
                declaration.on_delete == OnDelete::Cascade && !declaration.same_document
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in names {
            if !self.is_relation_loaded(&name) {
                self.load_relation(&name).await?;
            }
            let relation = self.relation_mut(&name)?;
            for related in relation.models_mut() {
                debug!(relation = %name, "cascading delete");
                delete_boxed(related).await?;
            }
            relation.set_models(Vec::new());
        }

        Ok(())
    }

    async fn delete_rdf(&mut self, date: DateTime<Utc>) -> Result<()> {
        let url = self
            .url()
            .ok_or_else(|| SoukaiError::soukai("cannot delete an RDF model without url"))?;
        let engine = self.class().engine()?;
        let document = DocumentLocation::of(&url)?;

        let mut owned = self.owned_subjects(&url);

        let existing = match engine.read_one(&document.container, &document.id).await {
            Ok(existing) => document_to_quads(&existing)?,
            Err(EngineError::DocumentNotFound { .. }) => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        owned.extend(operation_subjects(&existing, url.as_str()));
        let mut remaining = without_subjects(existing, &owned);

        debug!(model = %self.class().name(), %url, engine = engine.name(), "deleting");
        if self.schema().history() {
            remaining.extend(document_to_quads(&tombstone_document(url.as_str(), &date))?);
            engine
                .update(&document.container, &document.id, Updates::replace(quads_to_document(&remaining)))
                .await?;
        } else if remaining.is_empty() {
            engine.delete(&document.container, &document.id).await?;
        } else {
            engine
                .update(&document.container, &document.id, Updates::replace(quads_to_document(&remaining)))
                .await?;
        }

        self.operations.clear();
        Ok(())
    }
}

/// State a save mutates before reaching the engine.
struct SaveSnapshot {
    store: AttributeStore,
    operations: Vec<Operation>,
    embedded: Vec<(String, Relation)>,
}

impl SaveSnapshot {
    fn of(model: &Model) -> Self {
        Self {
            store: model.store.clone(),
            operations: model.operations.clone(),
            embedded: model
                .relations
                .iter()
                .filter(|(_, relation)| relation.declaration().same_document)
                .map(|(name, relation)| (name.clone(), relation.clone()))
                .collect(),
        }
    }

    fn restore(self, model: &mut Model) {
        model.store = self.store;
        model.operations = self.operations;
        model.relations.extend(self.embedded);
    }
}

fn delete_boxed(model: &mut Model) -> BoxFuture<'_, Result<()>> {
    Box::pin(model.delete())
}

impl BootedModel {
    /// A new, unsaved instance.
    pub fn make(self: &Arc<Self>, attributes: Attributes) -> Result<Model> {
        Model::new(self, attributes)
    }

    /// Create and save an instance.
    pub async fn create(self: &Arc<Self>, attributes: Attributes) -> Result<Model> {
        let mut model = Model::new(self, attributes)?;
        model.save().await?;
        Ok(model)
    }

    /// Find a model by primary key; missing and deleted models are `None`.
    pub async fn find(self: &Arc<Self>, key: &str) -> Result<Option<Model>> {
        Ok(self.find_with_tombstone(key).await?.into_model())
    }

    /// Find a model by primary key.
    ///
    /// # Errors
    ///
    /// - `DocumentNotFound` if the model is missing or deleted
    pub async fn find_or_fail(self: &Arc<Self>, key: &str) -> Result<Model> {
        self.find(key).await?.ok_or_else(|| SoukaiError::DocumentNotFound {
            collection: self.collection(),
            id: key.to_string(),
        })
    }

    /// Find a model, telling deleted resources apart from missing ones.
    pub async fn find_with_tombstone(self: &Arc<Self>, key: &str) -> Result<FindResult> {
        if self.schema().is_rdf() {
            return self.find_rdf(&Url::new(key)?).await;
        }

        let engine = self.engine()?;
        let collection = self.collection();
        debug!(model = %self.name(), id = key, engine = engine.name(), "finding");
        let document = match engine.read_one(&collection, key).await {
            Ok(document) => document,
            Err(EngineError::DocumentNotFound { .. }) => return Ok(FindResult::Missing),
            Err(error) => return Err(error.into()),
        };

        if let Some(tombstone) = read_tombstone(&document) {
            return Ok(FindResult::Deleted {
                deleted_at: tombstone.deleted_at,
            });
        }
        Ok(FindResult::Found(self.from_document(key, &document)?))
    }

    /// Every model of this class matching the filters.
    ///
    /// Filters apply to stored attributes; for RDF models they are
    /// evaluated after reading the container.
    pub async fn all(self: &Arc<Self>, filters: Option<Filters>) -> Result<Vec<Model>> {
        let engine = self.engine()?;
        let collection = self.collection();

        if !self.schema().is_rdf() {
            let documents = engine.read_many(&collection, filters.as_ref()).await?;
            let mut models = Vec::with_capacity(documents.len());
            for (id, document) in &documents {
                if read_tombstone(document).is_none() {
                    models.push(self.from_document(id, document)?);
                }
            }
            return Ok(models);
        }

        let container = Url::new(&collection)?;
        let models = self.all_in(&container).await?;
        Ok(match filters {
            Some(filters) => models
                .into_iter()
                .filter(|model| {
                    let id = model.key().unwrap_or_default();
                    filters.matches(id, &plain_document(model.attributes(), ""))
                })
                .collect(),
            None => models,
        })
    }

    /// Every model of this class stored in documents of `container`.
    pub(crate) async fn all_in(self: &Arc<Self>, container: &Url) -> Result<Vec<Model>> {
        let engine = self.engine()?;
        debug!(model = %self.name(), %container, engine = engine.name(), "listing");
        let documents = match engine.read_many(container.as_str(), None).await {
            Ok(documents) => documents,
            Err(EngineError::DocumentNotFound { .. }) => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut models = Vec::new();
        for document in documents.values() {
            let quads = document_to_quads(document)?;
            for url in self.resources_in(&quads) {
                models.push(self.from_quads(&Url::new(&url)?, &quads)?);
            }
        }
        Ok(models)
    }

    /// Statements of the document holding `url`, `None` if it is missing.
    pub(crate) async fn read_quads(&self, url: &Url) -> Result<Option<Vec<Quad>>> {
        let engine = self.engine()?;
        let document = DocumentLocation::of(url)?;
        match engine.read_one(&document.container, &document.id).await {
            Ok(stored) => Ok(Some(document_to_quads(&stored)?)),
            Err(EngineError::DocumentNotFound { .. }) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Read a model from Turtle describing `url`.
    pub fn create_from_turtle(self: &Arc<Self>, url: &Url, turtle: &str) -> Result<Model> {
        let quads = parse_turtle(turtle, Some(&url.document_url()))?;
        self.from_quads(url, &quads)
    }

    async fn find_rdf(self: &Arc<Self>, url: &Url) -> Result<FindResult> {
        debug!(model = %self.name(), %url, "finding");
        let Some(quads) = self.read_quads(url).await? else {
            return Ok(FindResult::Missing);
        };

        if let Some(deleted_at) = tombstone_date(&quads, url.as_str())
            .or_else(|| tombstone_date(&quads, url.document_url().as_str()))
        {
            return Ok(FindResult::Deleted { deleted_at });
        }
        if !quads.iter().any(|quad| quad.is_about(url.as_str())) {
            return Ok(FindResult::Missing);
        }

        Ok(FindResult::Found(self.from_quads(url, &quads)?))
    }

    /// Subjects in `quads` typed with every class of this model.
    pub(crate) fn resources_in(&self, quads: &[Quad]) -> Vec<String> {
        let classes = self.schema().rdf_classes();
        let Some(first) = classes.first() else {
            return Vec::new();
        };
        subjects_of_type(quads, first)
            .into_iter()
            .filter(|subject| {
                let types = types_of(quads, subject);
                classes.iter().all(|class| types.contains(&class.as_str()))
            })
            .filter(|subject| !subject.starts_with("_:"))
            .collect()
    }

    /// Hydrate a model (history, metadata and same-document relations
    /// included) from the statements of its document.
    pub(crate) fn from_quads(self: &Arc<Self>, url: &Url, quads: &[Quad]) -> Result<Model> {
        let mut model = create_from_rdf(self, url, quads)?;

        if self.schema().history() {
            model.operations = read_operations(self.schema(), url.as_str(), quads)?;
            model.deleted_at = read_metadata(quads, url.as_str()).and_then(|m| m.deleted_at);
        }

        for (name, declaration) in self.schema().relations() {
            if !declaration.same_document {
                continue;
            }
            let related_class = self.resolve(&declaration.related)?;
            let mut related = Vec::new();
            for subject in related_class.resources_in(quads) {
                let belongs = match (declaration.kind, declaration.foreign_key.as_deref()) {
                    (RelationKind::HasOne | RelationKind::HasMany, Some(foreign_key)) => {
                        related_class.schema().field(foreign_key).map_or(false, |field| {
                            field.rdf_property.as_deref().map_or(false, |property| {
                                objects(quads, &subject, property)
                                    .any(|object| object.as_iri() == Some(url.as_str()))
                            })
                        })
                    }
                    (RelationKind::BelongsToOne | RelationKind::BelongsToMany, Some(foreign_key)) => {
                        model.get_keys(foreign_key).contains(&subject.as_str())
                    }
                    _ => false,
                };
                if belongs {
                    related.push(create_from_rdf(&related_class, &Url::new(&subject)?, quads)?);
                }
            }
            model.relation_mut(name)?.set_models(related);
        }

        Ok(model)
    }

    pub(crate) fn from_document(self: &Arc<Self>, id: &str, document: &Document) -> Result<Model> {
        let mut attributes: Attributes = document
            .iter()
            .filter_map(|(name, value)| {
                AttributeValue::from_json(value).map(|value| (name.clone(), value))
            })
            .collect();
        attributes.insert(
            self.schema().primary_key().to_string(),
            AttributeValue::Key(id.to_string()),
        );
        Model::hydrate(self, attributes)
    }
}

/// Engine address of an RDF document.
struct DocumentLocation {
    container: String,
    id: String,
}

impl DocumentLocation {
    fn of(url: &Url) -> Result<Self> {
        let document = url.document_url();
        let container = document.container_url().ok_or_else(|| {
            SoukaiError::soukai(format!("{} is not inside a container", url))
        })?;
        Ok(Self {
            container: container.as_str().to_string(),
            id: document.as_str().to_string(),
        })
    }

    /// Replace the statements of `owned` subjects with `quads`.
    async fn merge(&self, engine: &dyn Engine, owned: &[String], quads: Vec<Quad>) -> Result<()> {
        let existing = match engine.read_one(&self.container, &self.id).await {
            Ok(existing) => document_to_quads(&existing)?,
            Err(EngineError::DocumentNotFound { .. }) => {
                debug!(document = %self.id, engine = engine.name(), "creating");
                engine
                    .create(&self.container, quads_to_document(&quads), Some(&self.id))
                    .await?;
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        let mut merged = without_subjects(existing, owned);
        let taken: BTreeSet<String> = merged
            .iter()
            .flat_map(|quad| [&quad.subject, &quad.object])
            .filter(|term| matches!(term, Term::BlankNode(_)))
            .filter_map(Term::node_id)
            .collect();
        merged.extend(relabel_blank_nodes(quads, &taken));

        debug!(document = %self.id, engine = engine.name(), "updating");
        engine
            .update(&self.container, &self.id, Updates::replace(quads_to_document(&merged)))
            .await?;
        Ok(())
    }
}

/// Statements not about `subjects` (or blank nodes hanging off them).
fn without_subjects(quads: Vec<Quad>, subjects: &[String]) -> Vec<Quad> {
    let removed = reachable_nodes(&quads, subjects);
    quads
        .into_iter()
        .filter(|quad| {
            quad.subject
                .node_id()
                .map_or(true, |id| !removed.contains(&id))
        })
        .collect()
}

/// Rename blank nodes so they do not clash with `taken` ids.
fn relabel_blank_nodes(quads: Vec<Quad>, taken: &BTreeSet<String>) -> Vec<Quad> {
    let mut labels: BTreeMap<String, String> = BTreeMap::new();
    let mut next = 0usize;
    let mut relabel = |term: Term| match term {
        Term::BlankNode(id) => {
            let label = labels
                .entry(id)
                .or_insert_with(|| loop {
                    next += 1;
                    let candidate = format!("b{}", next);
                    if !taken.contains(&format!("_:{}", candidate)) {
                        break candidate;
                    }
                })
                .clone();
            Term::BlankNode(label)
        }
        other => other,
    };

    quads
        .into_iter()
        .map(|quad| Quad {
            subject: relabel(quad.subject),
            predicate: quad.predicate,
            object: relabel(quad.object),
        })
        .collect()
}

fn tombstone_date(quads: &[Quad], resource_url: &str) -> Option<DateTime<Utc>> {
    let subject = metadata_url(resource_url);
    let is_tombstone = types_of(quads, &subject).contains(&vocab::CRDT_TOMBSTONE);
    if !is_tombstone {
        return None;
    }
    let deleted_at = objects(quads, &subject, vocab::CRDT_DELETED_AT)
        .find_map(Term::as_literal)
        .and_then(|literal| parse_date(&literal.value).ok());
    deleted_at
}

/// JSON document for plain storage (primary key excluded).
fn plain_document(attributes: &Attributes, primary_key: &str) -> Document {
    attributes
        .iter()
        .filter(|(name, _)| name.as_str() != primary_key)
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect::<serde_json::Map<String, Value>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;
    use crate::engine::InMemoryEngine;
    use crate::model::{ModelClass, ModelRegistry};
    use crate::schema::{FieldDefinition, ModelSchema, Timestamps};

    fn setup() -> (Arc<crate::model::ModelRegistry>, Arc<InMemoryEngine>) {
        let registry = ModelRegistry::new();
        let engine = Arc::new(InMemoryEngine::new());
        registry.set_engine(Some(engine.clone()));
        (registry, engine)
    }

    mod plain {
        use super::*;

        fn user(registry: &ModelRegistry) -> ModelClass {
            let schema = ModelSchema::builder("User")
                .field("name", FieldDefinition::string().required())
                .field("age", FieldDefinition::number())
                .build()
                .unwrap();
            registry.boot(schema).unwrap()
        }

        #[tokio::test]
        async fn create_find_update_delete() {
            let (registry, engine) = setup();
            let class = user(&registry);

            let mut alice = class.create(attributes! { "name" => "Alice", "age" => 30 }).await.unwrap();
            let id = alice.key().unwrap().to_string();
            assert!(alice.exists());
            assert!(alice.get_date("createdAt").is_some());

            let found = class.find(&id).await.unwrap().unwrap();
            assert_eq!(found.get_str("name"), Some("Alice"));
            assert_eq!(found.get_f64("age"), Some(30.0));
            assert_eq!(found.get_date("createdAt"), alice.get_date("createdAt"));

            alice.set("name", "Alicia").unwrap();
            alice.unset("age");
            alice.save().await.unwrap();
            let stored = engine.document("users", &id).unwrap();
            assert_eq!(stored["name"], "Alicia");
            assert!(!stored.contains_key("age"));

            alice.delete().await.unwrap();
            assert!(!alice.exists());
            assert!(alice.deleted_at().is_some());
            assert!(class.find(&id).await.unwrap().is_none());
            assert!(class.find_or_fail(&id).await.unwrap_err().is_not_found());
        }

        #[tokio::test]
        async fn clean_models_are_not_written() {
            let (registry, engine) = setup();
            let class = user(&registry);

            let mut alice = class.create(attributes! { "name" => "Alice" }).await.unwrap();
            engine.clear_operations();
            alice.save().await.unwrap();
            assert!(engine.operations().is_empty());
        }

        #[tokio::test]
        async fn required_fields_block_saves() {
            let (registry, engine) = setup();
            let class = user(&registry);

            let error = class.create(attributes! { "age" => 3 }).await.unwrap_err();
            assert!(matches!(error, SoukaiError::InvalidModelAttributes { .. }));
            assert_eq!(engine.document_count(), 0);
        }

        #[tokio::test]
        async fn filters() {
            let (registry, _engine) = setup();
            let class = user(&registry);
            class.create(attributes! { "name" => "Alice" }).await.unwrap();
            class.create(attributes! { "name" => "Bob" }).await.unwrap();

            let filters = Filters::default()
                .with_field("name", crate::engine::FieldFilter::Equals("Bob".into()));
            let bobs = class.all(Some(filters)).await.unwrap();
            assert_eq!(bobs.len(), 1);
            assert_eq!(class.all(None).await.unwrap().len(), 2);
        }
    }

    mod rdf {
        use super::*;

        const PEOPLE: &str = "https://pod.example/people/";

        fn person(registry: &ModelRegistry, history: bool) -> ModelClass {
            let schema = ModelSchema::builder("Person")
                .rdf_context("foaf", "http://xmlns.com/foaf/0.1/")
                .rdf_class("foaf:Person")
                .collection(PEOPLE)
                .history(history)
                .field("name", FieldDefinition::string().rdf_property("foaf:name"))
                .field(
                    "friendUrls",
                    FieldDefinition::array(FieldDefinition::key()).rdf_property("foaf:knows"),
                )
                .build()
                .unwrap();
            registry.boot(schema).unwrap()
        }

        #[tokio::test]
        async fn minted_urls() {
            let (registry, engine) = setup();
            let class = person(&registry, false);

            let alice = class.create(attributes! { "name" => "Alice" }).await.unwrap();
            let url = alice.url().unwrap();
            assert!(url.as_str().starts_with(PEOPLE));
            assert_eq!(url.fragment(), Some("it"));
            assert!(engine.document(PEOPLE, url.document_url().as_str()).is_some());

            let found = class.find(url.as_str()).await.unwrap().unwrap();
            assert_eq!(found.get_str("name"), Some("Alice"));
            assert_eq!(found.get_date("createdAt"), alice.get_date("createdAt"));
        }

        #[tokio::test]
        async fn resources_share_documents() {
            let (registry, engine) = setup();
            let class = person(&registry, false);

            let alice = class
                .create(attributes! { "url" => AttributeValue::Key(format!("{}friends#alice", PEOPLE)), "name" => "Alice" })
                .await
                .unwrap();
            let mut bob = class
                .create(attributes! { "url" => AttributeValue::Key(format!("{}friends#bob", PEOPLE)), "name" => "Bob" })
                .await
                .unwrap();
            assert_eq!(engine.ids(PEOPLE), vec![format!("{}friends", PEOPLE)]);
            assert_eq!(class.all(None).await.unwrap().len(), 2);

            bob.set("name", "Robert").unwrap();
            bob.save().await.unwrap();
            let found = class.find(alice.key().unwrap()).await.unwrap().unwrap();
            assert_eq!(found.get_str("name"), Some("Alice"));

            bob.delete().await.unwrap();
            assert!(class.find(bob.key().unwrap()).await.unwrap().is_none());
            assert_eq!(class.all(None).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn history_is_recorded_after_creation() {
            let (registry, _engine) = setup();
            let class = person(&registry, true);

            let mut alice = class
                .create(attributes! { "name" => "Alice", "friendUrls" => vec![AttributeValue::Key("https://b.example/#me".into())] })
                .await
                .unwrap();
            assert!(alice.operations().is_empty());

            alice.set("name", "Alicia").unwrap();
            alice.save().await.unwrap();

            let found = class.find(alice.key().unwrap()).await.unwrap().unwrap();
            assert_eq!(found.operations().len(), 3);
            assert!(found.operations().iter().all(|op| op.url.is_some()));

            let mut rebuilt = found.clone();
            rebuilt.rebuild_from_history().unwrap();
            assert_eq!(rebuilt.get_str("name"), Some("Alicia"));
            assert_eq!(rebuilt.get_keys("friendUrls"), vec!["https://b.example/#me"]);
        }

        #[tokio::test]
        async fn deleting_tracked_models_leaves_tombstones() {
            let (registry, _engine) = setup();
            let class = person(&registry, true);

            let mut alice = class.create(attributes! { "name" => "Alice" }).await.unwrap();
            let url = alice.key().unwrap().to_string();
            alice.delete().await.unwrap();

            match class.find_with_tombstone(&url).await.unwrap() {
                FindResult::Deleted { deleted_at } => assert_eq!(Some(deleted_at), alice.deleted_at()),
                other => panic!("unexpected result: {:?}", other),
            }
            assert!(matches!(
                class.find_with_tombstone(&format!("{}nobody#it", PEOPLE)).await.unwrap(),
                FindResult::Missing
            ));
        }
    }

    #[test]
    fn blank_nodes_are_relabelled_around_taken_ids() {
        let quads = vec![Quad::new(Term::blank("b1"), vocab::RDF_TYPE, Term::named(vocab::CRDT_METADATA))];
        let taken: BTreeSet<String> = ["_:b1".to_string()].into();

        let relabelled = relabel_blank_nodes(quads, &taken);
        assert_eq!(relabelled[0].subject, Term::blank("b2"));
    }

    #[test]
    fn plain_documents_skip_the_key() {
        let document = plain_document(&attributes! { "id" => "1", "name" => "Alice" }, "id");
        assert_eq!(document.len(), 1);
        assert_eq!(document["name"], "Alice");
    }

    #[test]
    fn timestamps_are_optional() {
        let registry = ModelRegistry::new();
        let schema = ModelSchema::builder("Note")
            .timestamps(Timestamps::none())
            .field("text", FieldDefinition::string())
            .build()
            .unwrap();
        let class = registry.boot(schema).unwrap();
        let mut note = class.make(attributes! { "text" => "hi" }).unwrap();
        note.touch(now());
        assert!(note.get("createdAt").is_none());
    }
}
