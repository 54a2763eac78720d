//! relations::resolver
//!
//! Loading, attaching, detaching and saving relations.
//!
//! # Loading
//!
//! [`Model::load_relation`] fetches related models through the related
//! class's engine and marks the relation loaded. A missing foreign key or
//! a missing related document resolves to an empty relation; any other
//! engine error is returned and the relation stays unloaded.
//!
//! # Attaching
//!
//! Attaching only changes memory: the foreign key is written on whichever
//! side owns it and the model joins the loaded relation.
//! [`Model::save_relation`] persists both sides in the right order.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::polymorphic::resolve_polymorphic;
use super::{RelatedModels, Relation, RelationDeclaration, RelationKind};
use crate::core::types::Url;
use crate::core::value::AttributeValue;
use crate::engine::{FieldFilter, Filters};
use crate::errors::{Result, SoukaiError};
use crate::model::{FindResult, Model, ModelClass};

impl Model {
    /// Fetch the related models of `name`.
    ///
    /// # Errors
    ///
    /// - `Soukai` if there is no such relation or its class is not booted
    /// - engine errors other than `DocumentNotFound`
    pub async fn load_relation(&mut self, name: &str) -> Result<&Relation> {
        let declaration = self.relation_mut(name)?.declaration().clone();
        let related_class = self.class().resolve(&declaration.related)?;

        debug!(
            model = %self.class().name(),
            relation = name,
            kind = %declaration.kind,
            related = %related_class.name(),
            "loading relation"
        );

        let models = match self.fetch_related(name, &declaration, &related_class).await {
            Ok(models) => models,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => {
                warn!(relation = name, %error, "relation failed to load");
                return Err(error);
            }
        };

        let relation = self.relation_mut(name)?;
        relation.set_models(models);
        Ok(relation)
    }

    /// Load every declared relation that is not loaded yet.
    pub async fn load_relations(&mut self) -> Result<()> {
        let names: Vec<String> = self.schema().relations().keys().cloned().collect();
        for name in names {
            if !self.is_relation_loaded(&name) {
                self.load_relation(&name).await?;
            }
        }
        Ok(())
    }

    async fn fetch_related(
        &self,
        name: &str,
        declaration: &RelationDeclaration,
        related_class: &ModelClass,
    ) -> Result<Vec<Model>> {
        let foreign_key = declaration.foreign_key.as_deref();

        match declaration.kind {
            RelationKind::BelongsToOne => {
                let Some(key) = foreign_key.and_then(|fk| self.get_keys(fk).first().copied()) else {
                    return Ok(Vec::new());
                };
                let shared = foreign_key
                    .map(|fk| self.schema().relations_with_foreign_key(fk).len() > 1)
                    .unwrap_or(false);

                let model = if shared && related_class.schema().is_rdf() {
                    resolve_polymorphic(self, name, key).await?
                } else {
                    related_class.find(key).await?
                };
                Ok(model.into_iter().collect())
            }

            RelationKind::BelongsToMany => {
                let keys: Vec<String> = foreign_key
                    .map(|fk| self.get_keys(fk).into_iter().map(str::to_string).collect())
                    .unwrap_or_default();
                if keys.is_empty() {
                    return Ok(Vec::new());
                }

                if related_class.schema().is_rdf() {
                    let mut models = Vec::with_capacity(keys.len());
                    for key in &keys {
                        if let Some(model) = related_class.find(key).await? {
                            models.push(model);
                        }
                    }
                    return Ok(models);
                }

                let engine = related_class.engine()?;
                let documents = engine
                    .read_many(&related_class.collection(), Some(&Filters::by_ids(keys.clone())))
                    .await?;
                keys.iter()
                    .filter_map(|key| documents.get(key).map(|document| (key, document)))
                    .map(|(key, document)| related_class.from_document(key, document))
                    .collect()
            }

            RelationKind::HasOne | RelationKind::HasMany => {
                let (Some(owner_key), Some(foreign_key)) = (self.key(), foreign_key) else {
                    return Ok(Vec::new());
                };

                if declaration.same_document {
                    return self.fetch_embedded(name).await;
                }

                let owner = Value::String(owner_key.to_string());
                let is_array = related_class
                    .schema()
                    .field(foreign_key)
                    .map_or(false, |field| field.is_array());
                let filter = if is_array {
                    FieldFilter::Contains(owner)
                } else {
                    FieldFilter::Equals(owner)
                };

                let mut models = related_class
                    .all(Some(Filters::default().with_field(foreign_key, filter)))
                    .await?;
                if declaration.kind == RelationKind::HasOne {
                    models.truncate(1);
                }
                Ok(models)
            }

            RelationKind::Contains => {
                let Some(container) = self.url() else {
                    return Ok(Vec::new());
                };
                let models = related_class.all_in(&container).await?;
                Ok(models
                    .into_iter()
                    .filter(|model| model.url().map_or(false, |url| url.is_contained_by(&container)))
                    .collect())
            }

            RelationKind::IsContainedBy => {
                let Some(container) = self.url().and_then(|url| url.container_url()) else {
                    return Ok(Vec::new());
                };
                Ok(related_class.find(container.as_str()).await?.into_iter().collect())
            }
        }
    }

    /// Same-document related models, read back with the owner's document.
    async fn fetch_embedded(&self, name: &str) -> Result<Vec<Model>> {
        let Some(url) = self.url() else {
            return Ok(Vec::new());
        };
        match self.class().find_with_tombstone(url.as_str()).await? {
            FindResult::Found(owner) => Ok(owner
                .relation(name)
                .map(|relation| relation.models().into_iter().cloned().collect())
                .unwrap_or_default()),
            _ => Ok(Vec::new()),
        }
    }

    /// Associate `related` in memory, writing the foreign key on the side
    /// that owns it.
    ///
    /// # Errors
    ///
    /// - `Soukai` if a key the association needs cannot be determined
    pub fn attach(&mut self, name: &str, mut related: Model) -> Result<()> {
        let declaration = self.relation_mut(name)?.declaration().clone();
        let foreign_key = declaration.foreign_key.as_deref();

        match declaration.kind {
            RelationKind::BelongsToOne | RelationKind::BelongsToMany => {
                let key = ensure_key(&mut related, None)?;
                let foreign_key = required_foreign_key(name, foreign_key)?;
                if declaration.kind == RelationKind::BelongsToOne {
                    self.set(foreign_key, AttributeValue::Key(key))?;
                } else {
                    let mut keys: Vec<AttributeValue> = self
                        .get(foreign_key)
                        .and_then(AttributeValue::as_array)
                        .map(<[AttributeValue]>::to_vec)
                        .unwrap_or_default();
                    let key = AttributeValue::Key(key);
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                    self.set(foreign_key, keys)?;
                }
            }

            RelationKind::HasOne | RelationKind::HasMany => {
                let owner = AttributeValue::Key(ensure_key(self, None)?);
                let foreign_key = required_foreign_key(name, foreign_key)?;
                let is_array = related
                    .schema()
                    .field(foreign_key)
                    .map_or(false, |field| field.is_array());
                if is_array {
                    let mut keys: Vec<AttributeValue> = related
                        .get(foreign_key)
                        .and_then(AttributeValue::as_array)
                        .map(<[AttributeValue]>::to_vec)
                        .unwrap_or_default();
                    if !keys.contains(&owner) {
                        keys.push(owner);
                    }
                    related.set(foreign_key, keys)?;
                } else {
                    related.set(foreign_key, owner)?;
                }
            }

            RelationKind::Contains => {
                let container = self.url().filter(Url::is_container).ok_or_else(|| {
                    SoukaiError::soukai(format!("relation '{}' needs a container url on the owner", name))
                })?;
                ensure_key(&mut related, Some(&container))?;
            }

            RelationKind::IsContainedBy => {
                let container = related.url().filter(Url::is_container).ok_or_else(|| {
                    SoukaiError::soukai(format!("relation '{}' needs a container url on the related model", name))
                })?;
                ensure_key(self, Some(&container))?;
            }
        }

        let relation = self.relation_mut(name)?;
        match relation.related_or_empty() {
            RelatedModels::One(model) => *model = Some(Box::new(related)),
            RelatedModels::Many(models) => {
                match models.iter().position(|model| model.key().is_some() && model.key() == related.key()) {
                    Some(index) => models[index] = related,
                    None => models.push(related),
                }
            }
        }
        Ok(())
    }

    /// Remove related models (all of them, or the one with `key`) from
    /// the relation and clear the foreign keys pointing at them.
    ///
    /// A `key` that the relation does not point at leaves the model
    /// untouched.
    ///
    /// Detached models are saved by the next [`Model::save_relation`].
    ///
    /// # Errors
    ///
    /// - `Soukai` for containment relations, where membership follows urls
    pub fn detach(&mut self, name: &str, key: Option<&str>) -> Result<()> {
        let declaration = self.relation_mut(name)?.declaration().clone();
        let Some(foreign_key) = declaration.foreign_key.as_deref() else {
            return Err(SoukaiError::soukai(format!(
                "cannot detach models from containment relation '{}'",
                name
            )));
        };

        let owner_key = self.key().map(str::to_string);
        let matches = |model: &Model| key.map_or(true, |key| model.key() == Some(key));
        let relation = self.relation_mut(name)?;
        let removed: Vec<Model> = match relation.related_or_empty() {
            RelatedModels::One(slot) => match slot.take() {
                Some(current) if matches(current.as_ref()) => vec![*current],
                other => {
                    *slot = other;
                    Vec::new()
                }
            },
            RelatedModels::Many(models) => {
                let (removed, kept): (Vec<Model>, Vec<Model>) =
                    std::mem::take(models).into_iter().partition(|model| matches(model));
                *models = kept;
                removed
            }
        };

        match declaration.kind {
            RelationKind::BelongsToOne => {
                let points_at_key = key.map_or(true, |key| self.get_keys(foreign_key) == [key]);
                if points_at_key {
                    self.unset(foreign_key);
                }
            }
            RelationKind::BelongsToMany => {
                let kept: Vec<AttributeValue> = match key {
                    Some(key) => self
                        .get_keys(foreign_key)
                        .into_iter()
                        .filter(|candidate| *candidate != key)
                        .map(|candidate| AttributeValue::Key(candidate.to_string()))
                        .collect(),
                    None => Vec::new(),
                };
                self.set(foreign_key, kept)?;
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                let relation = self.relation_mut(name)?;
                for mut model in removed {
                    clear_owner_key(&mut model, foreign_key, owner_key.as_deref())?;
                    relation.push_detached(model);
                }
            }
            RelationKind::Contains | RelationKind::IsContainedBy => {}
        }

        Ok(())
    }

    /// Persist the owner and the models of relation `name`, in the order
    /// the foreign keys require.
    pub async fn save_relation(&mut self, name: &str) -> Result<()> {
        let declaration = self.relation_mut(name)?.declaration().clone();
        if declaration.same_document {
            return self.save().await;
        }

        let owner_first = matches!(
            declaration.kind,
            RelationKind::HasOne | RelationKind::HasMany | RelationKind::Contains
        );
        if owner_first {
            self.save().await?;
        }

        let relation = self.relation_mut(name)?;
        let mut detached = relation.take_detached();
        for model in relation.models_mut() {
            model.save().await?;
        }
        for model in &mut detached {
            model.save().await?;
        }

        if !owner_first {
            self.save().await?;
        }
        Ok(())
    }
}

fn required_foreign_key<'a>(name: &str, foreign_key: Option<&'a str>) -> Result<&'a str> {
    foreign_key.ok_or_else(|| SoukaiError::soukai(format!("relation '{}' has no foreign key", name)))
}

/// The model's key, minting a url for RDF models that have none.
fn ensure_key(model: &mut Model, container: Option<&Url>) -> Result<String> {
    if let Some(key) = model.key() {
        return Ok(key.to_string());
    }
    if !model.schema().is_rdf() {
        return Err(SoukaiError::soukai(format!(
            "save the {} before associating it",
            model.class().name()
        )));
    }

    let url = match container {
        Some(container) => container
            .child(&Uuid::new_v4().to_string())
            .with_fragment(model.schema().default_resource_hash()),
        None => model.mint_url()?,
    };
    let primary_key = model.schema().primary_key();
    model.set(primary_key, AttributeValue::Key(url.as_str().to_string()))?;
    Ok(url.as_str().to_string())
}

fn clear_owner_key(model: &mut Model, foreign_key: &str, owner: Option<&str>) -> Result<()> {
    let is_array = model
        .schema()
        .field(foreign_key)
        .map_or(false, |field| field.is_array());
    if !is_array {
        model.unset(foreign_key);
        return Ok(());
    }

    let kept: Vec<AttributeValue> = model
        .get_keys(foreign_key)
        .into_iter()
        .filter(|key| Some(*key) != owner)
        .map(|key| AttributeValue::Key(key.to_string()))
        .collect();
    model.set(foreign_key, kept)
}
