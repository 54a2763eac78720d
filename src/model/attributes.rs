//! model::attributes
//!
//! Per-instance attribute state.
//!
//! # Invariants
//!
//! - `exists()` implies the primary key is set and `original` holds the
//!   last persisted snapshot.
//! - New stores have `exists() == false` and an empty snapshot, so every
//!   attribute is dirty until the first save.

use crate::core::value::{AttributeValue, Attributes};
use crate::errors::{Result, SoukaiError};

/// Current and last-persisted attribute values of a model instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeStore {
    primary_key: &'static str,
    attributes: Attributes,
    original: Attributes,
    exists: bool,
}

impl AttributeStore {
    pub fn new(primary_key: &'static str) -> Self {
        Self {
            primary_key,
            attributes: Attributes::new(),
            original: Attributes::new(),
            exists: false,
        }
    }

    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn unset(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Replace every attribute at once (the snapshot is kept).
    pub fn replace(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    /// The last persisted snapshot.
    pub fn original(&self) -> &Attributes {
        &self.original
    }

    /// Value of the primary key, as a string.
    pub fn id(&self) -> Option<&str> {
        self.attributes.get(self.primary_key).and_then(AttributeValue::as_str)
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Whether `name` (or, with `None`, any attribute) changed since the
    /// last snapshot.
    pub fn is_dirty(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.attributes.get(name) != self.original.get(name),
            None => !self.dirty().is_empty() || !self.removed().is_empty(),
        }
    }

    /// Attributes whose value differs from the snapshot.
    pub fn dirty(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(name.as_str()) != Some(value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Attributes present in the snapshot but unset since.
    pub fn removed(&self) -> Vec<String> {
        self.original
            .keys()
            .filter(|name| !self.attributes.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Record the current values as persisted.
    ///
    /// # Errors
    ///
    /// Fails when the primary key is not set.
    pub fn mark_persisted(&mut self) -> Result<()> {
        if self.id().is_none() {
            return Err(SoukaiError::soukai(format!(
                "cannot mark a model without '{}' as persisted",
                self.primary_key
            )));
        }
        self.original = self.attributes.clone();
        self.exists = true;
        Ok(())
    }

    /// Forget the persisted snapshot (after a delete).
    pub fn mark_new(&mut self) {
        self.original.clear();
        self.exists = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;

    fn store() -> AttributeStore {
        let mut store = AttributeStore::new("id");
        for (name, value) in attributes! { "name" => "Alice", "age" => 30 } {
            store.set(name, value);
        }
        store
    }

    #[test]
    fn new_stores_are_dirty() {
        let store = store();
        assert!(!store.exists());
        assert!(store.is_dirty(None));
        assert_eq!(store.dirty().len(), 2);
        assert!(store.original().is_empty());
    }

    #[test]
    fn persisting_requires_primary_key() {
        let mut store = store();
        assert!(store.mark_persisted().is_err());
        assert!(!store.exists());

        store.set("id", AttributeValue::Key("1".into()));
        store.mark_persisted().unwrap();
        assert!(store.exists());
        assert_eq!(store.id(), Some("1"));
        assert!(!store.is_dirty(None));
    }

    #[test]
    fn tracks_changes_and_removals() {
        let mut store = store();
        store.set("id", AttributeValue::Key("1".into()));
        store.mark_persisted().unwrap();

        store.set("name", "Alicia".into());
        store.unset("age");

        assert!(store.is_dirty(Some("name")));
        assert!(store.is_dirty(Some("age")));
        assert!(!store.is_dirty(Some("id")));
        assert_eq!(store.dirty(), attributes! { "name" => "Alicia" });
        assert_eq!(store.removed(), vec!["age".to_string()]);
    }

    #[test]
    fn mark_new_clears_snapshot() {
        let mut store = store();
        store.set("id", AttributeValue::Key("1".into()));
        store.mark_persisted().unwrap();

        store.mark_new();
        assert!(!store.exists());
        assert!(store.is_dirty(Some("name")));
    }
}
