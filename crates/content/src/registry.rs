use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapter::SessionAdapter;
use crate::session::SessionId;

/// Maps live content sessions to their session adapters.
/// 內容工作階段與其轉接器的對照表。
#[derive(Default)]
pub struct AdapterRegistry {
    entries: Mutex<HashMap<SessionId, Arc<SessionAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionAdapter>> {
        self.entries.lock().get(id).cloned()
    }

    /// Inserts an adapter, returning the one it replaced.
    pub fn insert(&self, adapter: Arc<SessionAdapter>) -> Option<Arc<SessionAdapter>> {
        let id = adapter.owner().clone();
        self.entries.lock().insert(id, adapter)
    }

    /// Returns the adapter of `id`, creating it with `create` on first use.
    /// The second value is true when the adapter was just created.
    pub fn get_or_insert_with(
        &self,
        id: &SessionId,
        create: impl FnOnce() -> SessionAdapter,
    ) -> (Arc<SessionAdapter>, bool) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(id) {
            return (Arc::clone(existing), false);
        }
        let adapter = Arc::new(create());
        entries.insert(id.clone(), Arc::clone(&adapter));
        (adapter, true)
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionAdapter>> {
        self.entries.lock().remove(id)
    }

    /// Closes and drops every adapter.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.entries.lock().drain().map(|(_, adapter)| adapter).collect();
        for adapter in drained {
            adapter.close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_store::MemoryRepository;

    #[test]
    fn adapters_are_created_once_per_session() {
        let repository = Arc::new(MemoryRepository::new());
        let registry = AdapterRegistry::new();
        let id = SessionId::new();

        let (first, created) = registry.get_or_insert_with(&id, || {
            SessionAdapter::new(repository.clone(), id.clone())
        });
        assert!(created);
        let (second, created) = registry.get_or_insert_with(&id, || {
            SessionAdapter::new(repository.clone(), id.clone())
        });
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        registry.close_all();
        assert!(registry.is_empty());
        assert!(first.is_closed());
    }
}
