use crate::market_data::types::MarketSnapshot;
use std::sync::{Arc, RwLock};

/// Replace-only holder for the latest published value.
///
/// Writers store whole values; readers get an `Arc` to one and never observe
/// a half-updated value. Cheap to clone (just an Arc bump).
#[derive(Debug)]
pub struct SnapshotCell<T = MarketSnapshot> {
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SnapshotCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub fn load(&self) -> Arc<T> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn store(&self, value: T) {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(value);
    }
}
