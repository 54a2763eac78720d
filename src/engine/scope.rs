//! engine::scope
//!
//! Engine slots with reference-counted overrides.
//!
//! # Design
//!
//! Every model class targets the engine held in its [`EngineSlot`]. Code
//! can temporarily point a slot at a different engine with
//! [`EngineSlot::scoped`]; the returned [`EngineScope`] restores the
//! original engine when dropped.
//!
//! Overrides nest and may overlap across concurrent tasks. The slot keeps
//! a counter: the first override saves the original engine, each one
//! installs its own engine, and only the release that brings the counter
//! back to zero restores the original. A task finishing early never
//! pulls the engine out from under a sibling still running in its scope.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use soukai::engine::{Engine, EngineSlot, InMemoryEngine};
//!
//! let default: Arc<dyn Engine> = Arc::new(InMemoryEngine::new());
//! let other: Arc<dyn Engine> = Arc::new(InMemoryEngine::new());
//! let slot = Arc::new(EngineSlot::with_engine(default.clone()));
//!
//! {
//!     let _scope = slot.scoped(other.clone());
//!     assert!(Arc::ptr_eq(&slot.get().unwrap(), &other));
//! }
//!
//! assert!(Arc::ptr_eq(&slot.get().unwrap(), &default));
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::traits::Engine;

#[derive(Debug, Default)]
struct SlotState {
    engine: Option<Arc<dyn Engine>>,
    /// Engine to restore once every override is released.
    saved: Option<Option<Arc<dyn Engine>>>,
    depth: usize,
}

/// Holder of the engine a model class targets.
#[derive(Debug, Default)]
pub struct EngineSlot {
    state: Mutex<SlotState>,
}

impl EngineSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self {
            state: Mutex::new(SlotState {
                engine: Some(engine),
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The engine currently in effect.
    pub fn get(&self) -> Option<Arc<dyn Engine>> {
        self.state().engine.clone()
    }

    /// Replace the engine.
    ///
    /// While overrides are active this replaces the engine restored at
    /// the end of the outermost scope.
    pub fn set(&self, engine: Option<Arc<dyn Engine>>) {
        let mut state = self.state();
        if state.depth > 0 {
            state.saved = Some(engine);
        } else {
            state.engine = engine;
        }
    }

    /// Number of overrides currently active.
    pub fn depth(&self) -> usize {
        self.state().depth
    }

    /// Target `engine` until the returned scope is dropped.
    pub fn scoped(self: &Arc<Self>, engine: Arc<dyn Engine>) -> EngineScope {
        let mut state = self.state();
        if state.depth == 0 {
            let original = state.engine.take();
            state.saved = Some(original);
        }
        state.depth += 1;
        debug!(engine = engine.name(), depth = state.depth, "engine override acquired");
        state.engine = Some(engine);

        EngineScope { slot: self.clone() }
    }

    /// Run a future with `engine` in effect.
    pub async fn using<F>(self: &Arc<Self>, engine: Arc<dyn Engine>, future: F) -> F::Output
    where
        F: Future,
    {
        let _scope = self.scoped(engine);
        future.await
    }

    fn release(&self) {
        let mut state = self.state();
        state.depth = state.depth.saturating_sub(1);
        debug!(depth = state.depth, "engine override released");

        if state.depth == 0 {
            if let Some(original) = state.saved.take() {
                state.engine = original;
            }
        }
    }
}

/// Guard returned by [`EngineSlot::scoped`].
#[derive(Debug)]
#[must_use = "the override ends when the scope is dropped"]
pub struct EngineScope {
    slot: Arc<EngineSlot>,
}

impl Drop for EngineScope {
    fn drop(&mut self) {
        self.slot.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;

    fn engine() -> Arc<dyn Engine> {
        Arc::new(InMemoryEngine::new())
    }

    fn is(slot: &EngineSlot, engine: &Arc<dyn Engine>) -> bool {
        slot.get().map_or(false, |current| Arc::ptr_eq(&current, engine))
    }

    #[test]
    fn empty_slot() {
        let slot = Arc::new(EngineSlot::new());
        assert!(slot.get().is_none());

        let other = engine();
        {
            let _scope = slot.scoped(other.clone());
            assert!(is(&slot, &other));
        }
        assert!(slot.get().is_none());
    }

    #[test]
    fn nested_scopes_restore_once() {
        let original = engine();
        let first = engine();
        let second = engine();
        let slot = Arc::new(EngineSlot::with_engine(original.clone()));

        let outer = slot.scoped(first.clone());
        let inner = slot.scoped(second.clone());
        assert_eq!(slot.depth(), 2);
        assert!(is(&slot, &second));

        drop(inner);
        assert!(!is(&slot, &original));

        drop(outer);
        assert_eq!(slot.depth(), 0);
        assert!(is(&slot, &original));
    }

    #[test]
    fn overlapping_scopes_released_out_of_order() {
        let original = engine();
        let slot = Arc::new(EngineSlot::with_engine(original.clone()));

        let a = slot.scoped(engine());
        let b = slot.scoped(engine());

        // First-acquired scope finishes first.
        drop(a);
        assert!(!is(&slot, &original));
        drop(b);
        assert!(is(&slot, &original));
    }

    #[test]
    fn set_during_override_changes_restored_engine() {
        let slot = Arc::new(EngineSlot::with_engine(engine()));
        let replacement = engine();

        let scope = slot.scoped(engine());
        slot.set(Some(replacement.clone()));
        drop(scope);

        assert!(is(&slot, &replacement));
    }

    #[tokio::test]
    async fn using_wraps_a_future() {
        let original = engine();
        let other = engine();
        let slot = Arc::new(EngineSlot::with_engine(original.clone()));

        let inside = slot
            .using(other.clone(), async { slot.get() })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&inside, &other));
        assert!(is(&slot, &original));
    }
}
