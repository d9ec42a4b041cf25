//! Type-map service registry for inter-module collaboration.
//!
//! Modules register their public API (usually `Arc<dyn SomeApi>`) during
//! `initialize` and consume other modules' APIs the same way, so crates only
//! share trait definitions, never concrete types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Process-wide service map, shared with every module through its context.
#[derive(Default)]
pub struct ClientHub {
    inner: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ClientHub {
    /// Register a client under its (trait object) type. Re-registering the
    /// same type replaces the previous client.
    pub fn register<T>(&self, client: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inner.write().insert(TypeId::of::<T>(), Arc::new(client));
    }

    /// Look up a client by type.
    #[must_use]
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let guard = self.inner.read();
        let entry = Arc::clone(guard.get(&TypeId::of::<T>())?);
        drop(guard);
        entry.downcast::<Arc<T>>().ok().map(|a| Arc::clone(&*a))
    }

    /// Look up a client, failing with a diagnosable error when absent.
    ///
    /// # Errors
    /// Returns an error naming the missing type.
    pub fn get_required<T>(&self) -> anyhow::Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "no client registered for type {}",
                std::any::type_name::<T>()
            )
        })
    }
}
