//! Sync outcome listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::models::SyncResult;

type Listener = Arc<dyn Fn(&SyncResult) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Listeners invoked once per finished sync cycle.
#[derive(Clone, Default)]
pub struct Observers {
    registry: Arc<Mutex<Registry>>,
}

impl Observers {
    pub fn subscribe(&self, listener: impl Fn(&SyncResult) + Send + Sync + 'static) -> Subscription {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Call every listener with `result`; returns how many panicked.
    ///
    /// Listeners run outside the registry lock so they may subscribe or
    /// unsubscribe from inside the callback.
    pub fn notify(&self, result: &SyncResult) -> usize {
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut panicked = 0;
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(result))).is_err() {
                panicked += 1;
                tracing::warn!("Sync listener panicked; continuing with remaining listeners");
            }
        }
        panicked
    }

    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by [`Observers::subscribe`].
///
/// Dropping it keeps the listener registered; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}
