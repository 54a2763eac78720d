//! model::registry
//!
//! Booted model classes.
//!
//! # Lifecycle
//!
//! Each schema is either unbooted or booted. [`ModelRegistry::boot`]
//! freezes a schema under a unique name and returns its [`ModelClass`];
//! booting the same schema again fails until the registry is
//! [`reset`](ModelRegistry::reset) (or the class is unbooted). Reset also
//! clears every class's resolved-relation cache.
//!
//! Relations name their related class; the name is resolved through the
//! registry on first use and cached on the class.
//!
//! # Engines
//!
//! A class reads and writes through its own engine slot when one is set,
//! otherwise through the registry's default engine. Both slots accept
//! scoped overrides (see [`crate::engine::scope`]).
//!
//! # Process-wide registry
//!
//! [`boot_models`], [`require_booted_model`] and [`reset_models`] operate
//! on a lazily created global registry. Tests should build their own
//! [`ModelRegistry`] instead.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use tracing::{debug, warn};

use crate::core::config::Config;
use crate::engine::{CachedEngine, Engine, EngineScope, EngineSlot};
use crate::errors::{Result, SoukaiError};
use crate::relations::ModelReference;
use crate::schema::{ModelSchema, SchemaBuilder};

/// Shared handle to a booted model class.
pub type ModelClass = Arc<BootedModel>;

/// Table of booted model classes.
pub struct ModelRegistry {
    this: Weak<ModelRegistry>,
    config: Config,
    engine: Arc<EngineSlot>,
    models: RwLock<BTreeMap<String, ModelClass>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

impl ModelRegistry {
    /// A registry with default configuration and no engine.
    pub fn new() -> Arc<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            engine: Arc::new(EngineSlot::new()),
            models: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A schema builder carrying this registry's configured defaults.
    pub fn schema(&self, name: &str) -> SchemaBuilder {
        ModelSchema::builder(name).with_config(&self.config)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ModelClass>> {
        self.models.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ModelClass>> {
        self.models.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Boot a schema under its own name.
    pub fn boot(&self, schema: ModelSchema) -> Result<ModelClass> {
        let name = schema.name().to_string();
        self.boot_as(&name, schema)
    }

    /// Boot a schema under `name`.
    ///
    /// # Errors
    ///
    /// - `Soukai` if the schema is already booted or the name is taken
    pub fn boot_as(&self, name: &str, schema: ModelSchema) -> Result<ModelClass> {
        let mut models = self.write();

        if let Some(booted) = models
            .values()
            .find(|booted| booted.schema.class_id() == schema.class_id())
        {
            return Err(SoukaiError::soukai(format!(
                "model {} already booted (as {})",
                schema.name(),
                booted.name
            )));
        }
        if models.contains_key(name) {
            return Err(SoukaiError::soukai(format!(
                "a model named {} is already booted",
                name
            )));
        }

        let class = Arc::new(BootedModel {
            name: name.to_string(),
            schema,
            registry: self.this.clone(),
            engine: Arc::new(EngineSlot::new()),
            related: Mutex::new(HashMap::new()),
        });
        models.insert(name.to_string(), class.clone());
        debug!(model = name, "booted model");

        Ok(class)
    }

    /// Boot several schemas, keyed by registry name.
    pub fn boot_models<I, S>(&self, models: I) -> Result<Vec<ModelClass>>
    where
        I: IntoIterator<Item = (S, ModelSchema)>,
        S: AsRef<str>,
    {
        models
            .into_iter()
            .map(|(name, schema)| self.boot_as(name.as_ref(), schema))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<ModelClass> {
        self.read().get(name).cloned()
    }

    /// A booted class by name.
    ///
    /// # Errors
    ///
    /// - `Soukai` if no model is booted under `name`
    pub fn require(&self, name: &str) -> Result<ModelClass> {
        self.get(name)
            .ok_or_else(|| SoukaiError::soukai(format!("model {} is not booted", name)))
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Unboot a single class.
    pub fn unboot(&self, name: &str) -> Option<ModelClass> {
        let removed = self.write().remove(name);
        if removed.is_some() {
            for class in self.read().values() {
                class.clear_related();
            }
            debug!(model = name, "unbooted model");
        }
        removed
    }

    /// Unboot every class and clear their relation caches.
    pub fn reset(&self) {
        let mut models = self.write();
        for class in models.values() {
            class.clear_related();
        }
        models.clear();
        debug!("model registry reset");
    }

    /// Default engine for every class without its own.
    pub fn set_engine(&self, engine: Option<Arc<dyn Engine>>) {
        self.engine.set(engine);
    }

    /// Install `engine` as the default, behind a document cache when the
    /// configuration enables it.
    pub fn configure_engine(&self, engine: Arc<dyn Engine>) {
        let engine: Arc<dyn Engine> = if self.config.cache_enabled() {
            Arc::new(CachedEngine::new(engine))
        } else {
            engine
        };
        debug!(engine = engine.name(), "default engine configured");
        self.engine.set(Some(engine));
    }

    pub fn engine(&self) -> Option<Arc<dyn Engine>> {
        self.engine.get()
    }

    /// Override the default engine until the scope is dropped.
    pub fn use_engine(&self, engine: Arc<dyn Engine>) -> EngineScope {
        self.engine.scoped(engine)
    }
}

/// A booted model class: its schema, engine slot and resolved relations.
pub struct BootedModel {
    name: String,
    schema: ModelSchema,
    registry: Weak<ModelRegistry>,
    engine: Arc<EngineSlot>,
    related: Mutex<HashMap<String, ModelClass>>,
}

impl fmt::Debug for BootedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootedModel")
            .field("name", &self.name)
            .field("class_id", &self.schema.class_id())
            .finish()
    }
}

impl BootedModel {
    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn registry(&self) -> Result<Arc<ModelRegistry>> {
        self.registry
            .upgrade()
            .ok_or_else(|| SoukaiError::soukai(format!("registry of model {} was dropped", self.name)))
    }

    /// Engine collection: the declared one, or the pluralized name.
    pub fn collection(&self) -> String {
        match self.schema.collection() {
            Some(collection) => collection.to_string(),
            None => default_collection(&self.name),
        }
    }

    /// The engine this class targets right now.
    ///
    /// # Errors
    ///
    /// - `Soukai` if neither the class nor the registry has an engine
    pub fn engine(&self) -> Result<Arc<dyn Engine>> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }
        self.registry
            .upgrade()
            .and_then(|registry| registry.engine())
            .ok_or_else(|| SoukaiError::soukai(format!("no engine configured for model {}", self.name)))
    }

    /// Target `engine` from this class only (`None` falls back to the
    /// registry default).
    pub fn set_engine(&self, engine: Option<Arc<dyn Engine>>) {
        self.engine.set(engine);
    }

    /// Override this class's engine until the scope is dropped.
    pub fn use_engine(&self, engine: Arc<dyn Engine>) -> EngineScope {
        self.engine.scoped(engine)
    }

    /// Resolve a related class by reference, caching the result.
    pub fn resolve(&self, reference: &ModelReference) -> Result<ModelClass> {
        if let Some(class) = self.related().get(reference.name()) {
            return Ok(class.clone());
        }

        let class = self.registry()?.require(reference.name())?;
        self.related()
            .insert(reference.name().to_string(), class.clone());
        Ok(class)
    }

    fn related(&self) -> MutexGuard<'_, HashMap<String, ModelClass>> {
        self.related
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_related(&self) {
        self.related().clear();
    }
}

fn default_collection(name: &str) -> String {
    let mut collection = String::with_capacity(name.len() + 1);
    for (i, c) in name.chars().enumerate() {
        if i == 0 {
            collection.extend(c.to_lowercase());
        } else {
            collection.push(c);
        }
    }
    let mut tail = collection.chars().rev();
    let consonant_y = tail.next() == Some('y')
        && tail
            .next()
            .is_some_and(|c| !matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'));

    if collection.ends_with('s') {
        collection.push_str("es");
    } else if consonant_y {
        collection.pop();
        collection.push_str("ies");
    } else {
        collection.push('s');
    }
    collection
}

static GLOBAL_REGISTRY: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

/// The process-wide registry, configured from the default config locations.
pub fn global_registry() -> &'static Arc<ModelRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| {
        let config = Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load configuration, using defaults");
            Config::default()
        });
        ModelRegistry::with_config(config)
    })
}

/// Boot models in the process-wide registry.
pub fn boot_models<I, S>(models: I) -> Result<Vec<ModelClass>>
where
    I: IntoIterator<Item = (S, ModelSchema)>,
    S: AsRef<str>,
{
    global_registry().boot_models(models)
}

/// Look up a model booted in the process-wide registry.
pub fn require_booted_model(name: &str) -> Result<ModelClass> {
    global_registry().require(name)
}

/// Reset the process-wide registry.
pub fn reset_models() {
    global_registry().reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use crate::schema::FieldDefinition;

    fn person() -> ModelSchema {
        ModelSchema::builder("Person")
            .field("name", FieldDefinition::string())
            .build()
            .unwrap()
    }

    mod booting {
        use super::*;

        #[test]
        fn boot_twice_fails() {
            let registry = ModelRegistry::new();
            let schema = person();

            registry.boot(schema.clone()).unwrap();
            let error = registry.boot(schema.clone()).unwrap_err();
            assert!(error.to_string().contains("already booted"));

            registry.reset();
            assert!(registry.boot(schema).is_ok());
        }

        #[test]
        fn names_are_unique() {
            let registry = ModelRegistry::new();
            registry.boot(person()).unwrap();
            assert!(registry.boot(person()).is_err());
            assert!(registry.boot_as("Author", person()).is_ok());
            assert_eq!(registry.names(), vec!["Author".to_string(), "Person".to_string()]);
        }

        #[test]
        fn boot_models_by_name() {
            let registry = ModelRegistry::new();
            let classes = registry
                .boot_models([("User", person()), ("Member", person())])
                .unwrap();

            assert_eq!(classes[0].name(), "User");
            assert!(registry.require("Member").is_ok());
            assert!(registry.require("Person").is_err());
        }

        #[test]
        fn unboot_allows_rebooting() {
            let registry = ModelRegistry::new();
            let schema = person();
            registry.boot(schema.clone()).unwrap();

            assert!(registry.unboot("Person").is_some());
            assert!(registry.get("Person").is_none());
            assert!(registry.boot(schema).is_ok());
        }
    }

    mod resolution {
        use super::*;

        #[test]
        fn related_classes_are_cached_until_reset() {
            let registry = ModelRegistry::new();
            let post = registry
                .boot(ModelSchema::builder("Post").build().unwrap())
                .unwrap();
            registry.boot(person()).unwrap();

            let reference = ModelReference::new("Person");
            let first = post.resolve(&reference).unwrap();
            let second = post.resolve(&reference).unwrap();
            assert!(Arc::ptr_eq(&first, &second));

            registry.reset();
            assert!(post.resolve(&reference).is_err());
        }

        #[test]
        fn default_collections() {
            assert_eq!(default_collection("Person"), "persons");
            assert_eq!(default_collection("Category"), "categories");
            assert_eq!(default_collection("Address"), "addresses");
            assert_eq!(default_collection("BlogPost"), "blogPosts");
            assert_eq!(default_collection("Day"), "days");
            assert_eq!(default_collection("Journey"), "journeys");
            assert_eq!(default_collection("Toy"), "toys");
            assert_eq!(default_collection("Guy"), "guys");
            assert_eq!(default_collection("Story"), "stories");
        }
    }

    mod engines {
        use super::*;

        #[test]
        fn class_engine_overrides_default() {
            let registry = ModelRegistry::new();
            let class = registry.boot(person()).unwrap();
            assert!(class.engine().is_err());

            let default: Arc<dyn Engine> = Arc::new(InMemoryEngine::new());
            registry.set_engine(Some(default.clone()));
            assert!(Arc::ptr_eq(&class.engine().unwrap(), &default));

            let own: Arc<dyn Engine> = Arc::new(InMemoryEngine::new());
            {
                let _scope = class.use_engine(own.clone());
                assert!(Arc::ptr_eq(&class.engine().unwrap(), &own));
            }
            assert!(Arc::ptr_eq(&class.engine().unwrap(), &default));
        }

        #[test]
        fn configured_engines_are_cached() {
            let registry = ModelRegistry::new();
            registry.configure_engine(Arc::new(InMemoryEngine::new()));
            assert_eq!(registry.engine().map(|engine| engine.name()), Some("cached"));

            let config = Config::from_toml("[cache]\nenabled = false").unwrap();
            let registry = ModelRegistry::with_config(config);
            registry.configure_engine(Arc::new(InMemoryEngine::new()));
            assert_eq!(registry.engine().map(|engine| engine.name()), Some("memory"));
        }
    }
}
