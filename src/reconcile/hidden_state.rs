//! Hidden credential state
//!
//! Per-entity flags that survive between reconciliation passes without being
//! part of the visible record. They tell the planner whether the access key
//! or the secret key was left unresolved by the previous pass, so the next
//! plan presents them as unknown instead of silently reusing stale values.

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =============================================================================
// Credential Flags
// =============================================================================

/// Flags recorded for one user entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialFlags {
    /// No access key could be associated with the entity
    #[serde(default)]
    pub access_key_unresolved: bool,
    /// The secret of the managed access key could not be recovered
    #[serde(default)]
    pub secret_key_unresolved: bool,
    /// The last read saw remote keys other than the managed one
    #[serde(default)]
    pub unmanaged_keys: bool,
}

impl CredentialFlags {
    /// Both credential fields are known
    pub fn resolved() -> Self {
        Self::default()
    }

    /// True when the planner has to force recomputation of a credential field
    pub fn any_unresolved(&self) -> bool {
        self.access_key_unresolved || self.secret_key_unresolved
    }

    /// Mark both fields as recovered or regenerated
    pub fn clear_credentials(&mut self) {
        self.access_key_unresolved = false;
        self.secret_key_unresolved = false;
    }
}

// =============================================================================
// Hidden State Store
// =============================================================================

/// Side table of credential flags keyed by entity address
///
/// Stored next to, never inside, the visible records. Entries are created on
/// the first pass that observes an entity and dropped together with its record.
#[derive(Debug, Default)]
pub struct HiddenStateStore {
    entries: DashMap<String, CredentialFlags>,
}

impl HiddenStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags of an entity, if any pass has recorded them
    pub fn get(&self, key: &str) -> Option<CredentialFlags> {
        self.entries.get(key).map(|e| *e.value())
    }

    /// Record the flags an operation returned for an entity
    pub fn set(&self, key: &str, flags: CredentialFlags) {
        self.entries.insert(key.to_string(), flags);
    }

    /// Drop the flags of an entity
    pub fn clear(&self, key: &str) -> Option<CredentialFlags> {
        self.entries.remove(key).map(|(_, flags)| flags)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered copy for persistence
    pub fn snapshot(&self) -> IndexMap<String, CredentialFlags> {
        let mut out: IndexMap<String, CredentialFlags> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort_keys();
        out
    }

    /// Rebuild the store from a persisted snapshot
    pub fn from_snapshot(snapshot: IndexMap<String, CredentialFlags>) -> Self {
        let store = Self::new();
        for (key, flags) in snapshot {
            store.set(&key, flags);
        }
        store
    }
}

impl Clone for HiddenStateStore {
    fn clone(&self) -> Self {
        Self::from_snapshot(self.snapshot())
    }
}

impl Serialize for HiddenStateStore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HiddenStateStore {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IndexMap::<String, CredentialFlags>::deserialize(deserializer).map(Self::from_snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_clear() {
        let store = HiddenStateStore::new();
        assert_eq!(store.get("user.alice"), None);

        let flags = CredentialFlags {
            secret_key_unresolved: true,
            ..Default::default()
        };
        store.set("user.alice", flags);
        assert_eq!(store.get("user.alice"), Some(flags));
        assert_eq!(store.get("user.bob"), None);

        assert_eq!(store.clear("user.alice"), Some(flags));
        assert!(store.is_empty());
    }

    #[test]
    fn test_entries_are_scoped_per_entity() {
        let store = HiddenStateStore::new();
        store.set(
            "user.alice",
            CredentialFlags {
                access_key_unresolved: true,
                secret_key_unresolved: true,
                unmanaged_keys: false,
            },
        );
        store.set("user.bob", CredentialFlags::resolved());

        assert!(store.get("user.alice").unwrap().any_unresolved());
        assert!(!store.get("user.bob").unwrap().any_unresolved());
    }

    #[test]
    fn test_serde_round_trip_is_sorted() {
        let store = HiddenStateStore::new();
        store.set("user.zed", CredentialFlags::resolved());
        store.set(
            "user.amy",
            CredentialFlags {
                unmanaged_keys: true,
                ..Default::default()
            },
        );

        let json = serde_json::to_string(&store).unwrap();
        assert!(json.find("user.amy").unwrap() < json.find("user.zed").unwrap());

        let back: HiddenStateStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back.snapshot(), store.snapshot());
    }

    #[test]
    fn test_clear_credentials_keeps_unmanaged_flag() {
        let mut flags = CredentialFlags {
            access_key_unresolved: true,
            secret_key_unresolved: true,
            unmanaged_keys: true,
        };
        flags.clear_credentials();
        assert!(!flags.any_unresolved());
        assert!(flags.unmanaged_keys);
    }
}
