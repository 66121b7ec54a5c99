//! Structured-memory store: entity × attribute facts with versions.
//!
//! Keys are `(entity, attribute)` pairs; upserts bump the version from 1 and
//! replace the metadata map wholesale. Staging mirrors the text and vector
//! engines: staged mutations coalesce in insertion order at commit, so the
//! last write to a key within one flush wins.

use std::collections::BTreeMap;

use crate::error::{Result, WaxError};

/// Stored value for one `(entity, attribute)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactEntry {
    /// Stable id allocated on first upsert of the key.
    pub id: u64,
    pub value: String,
    pub version: u64,
    pub metadata: BTreeMap<String, String>,
}

/// One prefix-query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactHit {
    pub entity: String,
    pub attribute: String,
    pub entry: FactEntry,
}

#[derive(Debug, Clone)]
enum FactOp {
    Upsert {
        entity: String,
        attribute: String,
        value: String,
        metadata: BTreeMap<String, String>,
    },
    Remove {
        entity: String,
        attribute: String,
    },
}

#[derive(Debug, Default)]
pub struct StructuredMemoryStore {
    entries: BTreeMap<(String, String), FactEntry>,
    next_id: u64,
    staged: Vec<FactOp>,
}

fn check_key(entity: &str, attribute: &str) -> Result<()> {
    if entity.is_empty() {
        return Err(WaxError::EmptyKey { field: "entity" });
    }
    if attribute.is_empty() {
        return Err(WaxError::EmptyKey { field: "attribute" });
    }
    Ok(())
}

impl StructuredMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or updates a fact; returns the stable id for the key.
    pub fn upsert(
        &mut self,
        entity: &str,
        attribute: &str,
        value: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<u64> {
        check_key(entity, attribute)?;
        let key = (entity.to_string(), attribute.to_string());
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value.to_string();
            entry.version += 1;
            entry.metadata = metadata;
            return Ok(entry.id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            key,
            FactEntry {
                id,
                value: value.to_string(),
                version: 1,
                metadata,
            },
        );
        Ok(id)
    }

    /// Removes a fact; returns whether the key was present.
    pub fn remove(&mut self, entity: &str, attribute: &str) -> Result<bool> {
        check_key(entity, attribute)?;
        Ok(self
            .entries
            .remove(&(entity.to_string(), attribute.to_string()))
            .is_some())
    }

    #[must_use]
    pub fn get(&self, entity: &str, attribute: &str) -> Option<&FactEntry> {
        self.entries
            .get(&(entity.to_string(), attribute.to_string()))
    }

    /// Entries whose entity starts with `prefix`, ordered lexicographically by
    /// `(entity, attribute)`. A negative limit means unlimited.
    #[must_use]
    pub fn query_by_entity_prefix(&self, prefix: &str, limit: i64) -> Vec<FactHit> {
        if limit == 0 {
            return Vec::new();
        }
        let cap = if limit < 0 {
            usize::MAX
        } else {
            usize::try_from(limit).unwrap_or(usize::MAX)
        };
        self.entries
            .range((prefix.to_string(), String::new())..)
            .take_while(|((entity, _), _)| entity.starts_with(prefix))
            .take(cap)
            .map(|((entity, attribute), entry)| FactHit {
                entity: entity.clone(),
                attribute: attribute.clone(),
                entry: entry.clone(),
            })
            .collect()
    }

    /// Iterates every committed fact in key order.
    pub fn iter(&self) -> impl Iterator<Item = FactHit> + '_ {
        self.entries.iter().map(|((entity, attribute), entry)| FactHit {
            entity: entity.clone(),
            attribute: attribute.clone(),
            entry: entry.clone(),
        })
    }

    // Staged twins: invisible to queries until commit_staged.

    pub fn stage_upsert(
        &mut self,
        entity: &str,
        attribute: &str,
        value: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        check_key(entity, attribute)?;
        self.staged.push(FactOp::Upsert {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
            metadata,
        });
        Ok(())
    }

    pub fn stage_remove(&mut self, entity: &str, attribute: &str) -> Result<()> {
        check_key(entity, attribute)?;
        self.staged.push(FactOp::Remove {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
        });
        Ok(())
    }

    /// Publishes staged mutations in insertion order.
    pub fn commit_staged(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        for op in staged {
            match op {
                FactOp::Upsert {
                    entity,
                    attribute,
                    value,
                    metadata,
                } => {
                    self.upsert(&entity, &attribute, &value, metadata)?;
                }
                FactOp::Remove { entity, attribute } => {
                    self.remove(&entity, &attribute)?;
                }
            }
        }
        Ok(())
    }

    pub fn rollback_staged(&mut self) {
        self.staged.clear();
    }

    #[must_use]
    pub fn pending_mutation_count(&self) -> usize {
        self.staged.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, value: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(key.to_string(), value.to_string());
        map
    }

    #[test]
    fn upsert_versions_and_prefix_query() {
        let mut store = StructuredMemoryStore::new();
        store.upsert("user:1", "name", "Alice", BTreeMap::new()).unwrap();
        store.upsert("user:1", "city", "Paris", BTreeMap::new()).unwrap();
        store.upsert("user:2", "name", "Bob", BTreeMap::new()).unwrap();
        store
            .upsert("user:1", "name", "Alice B", meta("src", "edit"))
            .unwrap();

        let hits = store.query_by_entity_prefix("user:", 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(
            (hits[0].entity.as_str(), hits[0].attribute.as_str()),
            ("user:1", "city")
        );
        assert_eq!(hits[0].entry.value, "Paris");
        assert_eq!(hits[0].entry.version, 1);
        assert_eq!(hits[1].entry.value, "Alice B");
        assert_eq!(hits[1].entry.version, 2);
        assert_eq!(hits[1].entry.metadata, meta("src", "edit"));
        assert_eq!(hits[2].entry.value, "Bob");
    }

    #[test]
    fn id_is_stable_across_upserts() {
        let mut store = StructuredMemoryStore::new();
        let first = store.upsert("a", "b", "1", BTreeMap::new()).unwrap();
        let second = store.upsert("a", "b", "2", BTreeMap::new()).unwrap();
        assert_eq!(first, second);
        let other = store.upsert("a", "c", "3", BTreeMap::new()).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn remove_reports_presence() {
        let mut store = StructuredMemoryStore::new();
        store.upsert("a", "b", "1", BTreeMap::new()).unwrap();
        assert!(store.remove("a", "b").unwrap());
        assert!(!store.remove("a", "b").unwrap());
    }

    #[test]
    fn empty_keys_are_rejected() {
        let mut store = StructuredMemoryStore::new();
        assert!(matches!(
            store.upsert("", "b", "1", BTreeMap::new()),
            Err(WaxError::EmptyKey { field: "entity" })
        ));
        assert!(matches!(
            store.upsert("a", "", "1", BTreeMap::new()),
            Err(WaxError::EmptyKey { field: "attribute" })
        ));
        assert!(store.stage_remove("", "b").is_err());
    }

    #[test]
    fn negative_limit_means_unlimited() {
        let mut store = StructuredMemoryStore::new();
        for i in 0..5 {
            store
                .upsert("e", &format!("attr{i}"), "v", BTreeMap::new())
                .unwrap();
        }
        assert_eq!(store.query_by_entity_prefix("e", -1).len(), 5);
        assert_eq!(store.query_by_entity_prefix("e", 2).len(), 2);
        assert!(store.query_by_entity_prefix("e", 0).is_empty());
    }

    #[test]
    fn staging_coalesces_last_write_wins() {
        let mut store = StructuredMemoryStore::new();
        store.stage_upsert("k", "a", "first", BTreeMap::new()).unwrap();
        store.stage_upsert("k", "a", "second", BTreeMap::new()).unwrap();
        assert!(store.get("k", "a").is_none(), "staged is invisible");

        store.commit_staged().unwrap();
        let entry = store.get("k", "a").expect("committed");
        assert_eq!(entry.value, "second");
        assert_eq!(entry.version, 2, "both staged upserts applied in order");
    }

    #[test]
    fn rollback_discards_staged() {
        let mut store = StructuredMemoryStore::new();
        store.stage_upsert("k", "a", "v", BTreeMap::new()).unwrap();
        store.rollback_staged();
        store.commit_staged().unwrap();
        assert!(store.is_empty());
    }
}
