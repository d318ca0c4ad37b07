//! Bookkeeping of what the controller granted to each pod
//!
//! The deletion path relies on this table instead of the pod object: by the time
//! a deletion is reconciled the pod's resource requests and its kubelet CPU
//! assignment may no longer be readable.

use api_types::GuaranteedPod;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::domain::types::PodKey;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PodStateError {
    #[error("state entry for {key} has no {field}")]
    IncompleteEntry { key: PodKey, field: &'static str },
}

/// Storage for per-pod grants.
///
/// Callers serialize access per key; implementations only need to be safe for
/// concurrent use across different keys.
pub trait PodStateRepository: Send + Sync {
    fn get(&self, key: &PodKey) -> Option<GuaranteedPod>;

    /// Replaces any previous entry for `key`.
    fn upsert(&self, key: &PodKey, entry: GuaranteedPod) -> Result<(), PodStateError>;

    /// Removes and returns the entry for `key`, if any.
    fn delete(&self, key: &PodKey) -> Option<GuaranteedPod>;

    /// All entries whose grant lives on `node`.
    fn on_node(&self, node: &str) -> Vec<(PodKey, GuaranteedPod)>;
}

/// In-memory [`PodStateRepository`].
#[derive(Debug, Default)]
pub struct PodStateStore {
    pods: DashMap<PodKey, GuaranteedPod>,
}

impl PodStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

impl PodStateRepository for PodStateStore {
    fn get(&self, key: &PodKey) -> Option<GuaranteedPod> {
        self.pods.get(key).map(|entry| entry.clone())
    }

    fn upsert(&self, key: &PodKey, entry: GuaranteedPod) -> Result<(), PodStateError> {
        if entry.node.is_empty() {
            return Err(PodStateError::IncompleteEntry {
                key: key.clone(),
                field: "node",
            });
        }
        if entry.uid.is_empty() {
            return Err(PodStateError::IncompleteEntry {
                key: key.clone(),
                field: "uid",
            });
        }

        let container_count = entry.containers.len();
        let previous = self.pods.insert(key.clone(), entry);
        info!(
            pod = %key,
            containers = container_count,
            replaced = previous.is_some(),
            "Pod grant recorded in state store"
        );
        Ok(())
    }

    fn delete(&self, key: &PodKey) -> Option<GuaranteedPod> {
        let removed = self.pods.remove(key).map(|(_, entry)| entry);
        debug!(pod = %key, found = removed.is_some(), "Pod grant removed from state store");
        removed
    }

    fn on_node(&self, node: &str) -> Vec<(PodKey, GuaranteedPod)> {
        self.pods
            .iter()
            .filter(|entry| entry.value().node == node)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use api_types::PowerContainer;
    use similar_asserts::assert_eq;

    use super::*;

    fn entry(node: &str, cpus: Vec<u32>) -> GuaranteedPod {
        GuaranteedPod {
            node: node.to_string(),
            name: "pod-a".to_string(),
            namespace: "default".to_string(),
            uid: "uid-a".to_string(),
            containers: vec![PowerContainer {
                name: "app".to_string(),
                id: "abc123".to_string(),
                exclusive_cpus: cpus,
                power_profile: "performance".to_string(),
            }],
        }
    }

    #[test]
    fn upsert_replaces_previous_entry() {
        let store = PodStateStore::new();
        let key = PodKey::new("default", "pod-a");

        store.upsert(&key, entry("node-1", vec![1, 2])).unwrap();
        store.upsert(&key, entry("node-1", vec![3])).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key), Some(entry("node-1", vec![3])));
    }

    #[test]
    fn delete_returns_removed_entry_once() {
        let store = PodStateStore::new();
        let key = PodKey::new("default", "pod-a");
        store.upsert(&key, entry("node-1", vec![1])).unwrap();

        assert_eq!(store.delete(&key), Some(entry("node-1", vec![1])));
        assert_eq!(store.delete(&key), None);
        assert!(store.is_empty());
    }

    #[test]
    fn keys_are_namespaced() {
        let store = PodStateStore::new();
        store
            .upsert(&PodKey::new("ns-a", "pod-a"), entry("node-1", vec![1]))
            .unwrap();

        assert_eq!(store.get(&PodKey::new("ns-b", "pod-a")), None);
    }

    #[test]
    fn lists_entries_by_node() {
        let store = PodStateStore::new();
        let a = PodKey::new("default", "pod-a");
        let b = PodKey::new("default", "pod-b");
        store.upsert(&a, entry("node-1", vec![1])).unwrap();
        store.upsert(&b, entry("node-2", vec![2])).unwrap();

        let on_node_1 = store.on_node("node-1");
        assert_eq!(on_node_1, vec![(a, entry("node-1", vec![1]))]);
        assert!(store.on_node("node-3").is_empty());
    }

    #[test]
    fn rejects_entries_without_identity() {
        let store = PodStateStore::new();
        let key = PodKey::new("default", "pod-a");

        let mut no_uid = entry("node-1", vec![1]);
        no_uid.uid.clear();
        assert_eq!(
            store.upsert(&key, no_uid),
            Err(PodStateError::IncompleteEntry {
                key: key.clone(),
                field: "uid"
            })
        );
        assert_eq!(
            store.upsert(&key, entry("", vec![1])),
            Err(PodStateError::IncompleteEntry {
                key: key.clone(),
                field: "node"
            })
        );
        assert!(store.is_empty());
    }
}
