// ── In-memory document store ──
//
// Concurrent storage with O(1) keyed access. Each document carries the
// sequence number it was inserted with so reads come back in insertion
// order, which the notifications view and the inventory fold rely on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::document::{Collection, Document, DocumentStore, Filter, Record, StoreError};

struct Stored {
    seq: u64,
    doc: Arc<Document>,
}

#[derive(Default)]
struct MemoryCollection {
    docs: DashMap<String, Stored>,
    next_seq: AtomicU64,
}

impl MemoryCollection {
    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Process-local `DocumentStore`. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, Arc<MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .get(&collection)
            .map_or(0, |c| c.docs.len())
    }

    fn collection(&self, collection: Collection) -> Arc<MemoryCollection> {
        Arc::clone(self.collections.entry(collection).or_default().value())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_all(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Record>, StoreError> {
        let col = self.collection(collection);
        let mut hits: Vec<(u64, Record)> = col
            .docs
            .iter()
            .filter(|entry| filter.matches(&entry.value().doc))
            .map(|entry| {
                (
                    entry.value().seq,
                    Record {
                        key: entry.key().clone(),
                        doc: Document::clone(&entry.value().doc),
                    },
                )
            })
            .collect();
        hits.sort_by_key(|(seq, _)| *seq);
        Ok(hits.into_iter().map(|(_, record)| record).collect())
    }

    async fn find_one(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let col = self.collection(collection);
        Ok(col.docs.get(key).map(|s| Document::clone(&s.doc)))
    }

    async fn insert(
        &self,
        collection: Collection,
        key: Option<&str>,
        doc: Document,
    ) -> Result<String, StoreError> {
        let col = self.collection(collection);
        let seq = col.next_seq();
        let key = key.map_or_else(|| format!("{seq:020}"), str::to_owned);

        match col.docs.entry(key.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate { collection, key }),
            Entry::Vacant(slot) => {
                slot.insert(Stored {
                    seq,
                    doc: Arc::new(doc),
                });
                Ok(key)
            }
        }
    }

    async fn update(
        &self,
        collection: Collection,
        key: &str,
        doc: Document,
    ) -> Result<(), StoreError> {
        let col = self.collection(collection);
        let Some(mut stored) = col.docs.get_mut(key) else {
            return Err(StoreError::Missing {
                collection,
                key: key.to_owned(),
            });
        };
        stored.doc = Arc::new(doc);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn insert_then_find_one() {
        let store = MemoryStore::new();
        store
            .insert(Collection::Agents, Some("a1"), json!({"hostname": "h1"}))
            .await
            .unwrap();

        let doc = store.find_one(Collection::Agents, "a1").await.unwrap();
        assert_eq!(doc, Some(json!({"hostname": "h1"})));
        assert!(store.find_one(Collection::Agents, "a2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let store = MemoryStore::new();
        store.insert(Collection::Agents, Some("a1"), json!({})).await.unwrap();
        let err = store
            .insert(Collection::Agents, Some("a1"), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn update_requires_existing_key() {
        let store = MemoryStore::new();
        let err = store
            .update(Collection::Agents, "ghost", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }

    #[tokio::test]
    async fn find_all_keeps_insertion_order_across_updates() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store
                .insert(Collection::Agents, Some(id), json!({"id": id, "vlan": "v1"}))
                .await
                .unwrap();
        }
        store
            .update(Collection::Agents, "c", json!({"id": "c", "vlan": "v2"}))
            .await
            .unwrap();

        let all = store.find_all(Collection::Agents, &Filter::All).await.unwrap();
        let keys: Vec<_> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["c", "a", "b"]);

        let v1 = store
            .find_all(Collection::Agents, &Filter::eq("vlan", "v1"))
            .await
            .unwrap();
        assert_eq!(v1.len(), 2);
    }

    #[tokio::test]
    async fn keyless_inserts_append() {
        let store = MemoryStore::new();
        for n in 0..3 {
            store
                .insert(Collection::Notifications, None, json!({"n": n}))
                .await
                .unwrap();
        }
        let all = store
            .find_all(Collection::Notifications, &Filter::All)
            .await
            .unwrap();
        let ns: Vec<_> = all.iter().map(|r| r.doc["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, [0, 1, 2]);
        assert_eq!(store.len(Collection::Notifications), 3);
    }
}
