use std::{
    collections::HashSet,
    sync::Mutex,
};

/// Run-scoped deduplication registry: the set of pair ids already accepted,
/// across this run and any previous run whose sink was primed in. Shared by
/// handle across workers; the only cross-worker synchronization point in
/// the pipeline.
#[derive(Default)]
pub struct DedupRegistry {
    ids: Mutex<HashSet<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert. Returns false with no side effect when the
    /// id is already present. Ids are never removed during a run.
    pub fn try_accept(&self, id: &str) -> bool {
        let mut ids = self.ids.lock().expect("lock poisoned");
        if ids.contains(id) {
            return false;
        }
        ids.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().expect("lock poisoned").contains(id)
    }

    /// Seeds the registry from ids recovered out of an existing sink.
    /// Returns how many distinct ids were loaded.
    pub fn prime(&self, ids: impl IntoIterator<Item = String>) -> usize {
        let mut guard = self.ids.lock().expect("lock poisoned");
        let before = guard.len();
        guard.extend(ids);
        guard.len() - before
    }

    pub fn len(&self) -> usize {
        self.ids.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().expect("lock poisoned").is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::DedupRegistry;

    #[test]
    fn try_accept_inserts_once() {
        let registry = DedupRegistry::new();
        assert!(registry.try_accept("logic-abc123"));
        assert!(!registry.try_accept("logic-abc123"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn primed_ids_are_rejected_as_duplicates() {
        let registry = DedupRegistry::new();
        let loaded = registry.prime(vec![
            "logic-a".to_string(),
            "logic-b".to_string(),
            "logic-a".to_string(),
        ]);
        assert_eq!(loaded, 2);
        assert!(!registry.try_accept("logic-a"));
        assert!(registry.try_accept("logic-c"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_workers_accept_each_id_exactly_once() {
        let registry = Arc::new(DedupRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let mut accepted = 0;
                for index in 0..100 {
                    if registry.try_accept(&format!("id-{index}")) {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let mut total_accepted = 0;
        for handle in handles {
            total_accepted += handle.await.expect("worker should finish");
        }

        assert_eq!(total_accepted, 100);
        assert_eq!(registry.len(), 100);
    }
}
