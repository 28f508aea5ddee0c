//! In-memory document store backed by DashMap.
//!
//! Every document lives under a `(collection, id)` key. Updates hold the
//! shard write lock for the whole merge, so `update_if` is a real
//! compare-and-swap. A monotonically increasing sequence number keeps query
//! results in insertion order.

use super::{Document, DocumentStore, StoreError, StoredDocument};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

struct Entry {
    seq: u64,
    fields: Document,
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    docs: Arc<DashMap<(String, String), Entry>>,
    next_seq: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.docs.iter().filter(|e| e.key().0 == collection).count()
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn collect<F>(&self, collection: &str, mut keep: F) -> Vec<StoredDocument>
    where
        F: FnMut(&Document) -> bool,
    {
        let mut hits: Vec<(u64, StoredDocument)> = self
            .docs
            .iter()
            .filter(|e| e.key().0 == collection && keep(&e.value().fields))
            .map(|e| {
                (
                    e.value().seq,
                    StoredDocument {
                        id: e.key().1.clone(),
                        fields: e.value().fields.clone(),
                    },
                )
            })
            .collect();
        hits.sort_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, doc)| doc).collect()
    }
}

fn merge(target: &mut Document, fields: Document) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, fields: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.docs
            .insert((collection.to_string(), id.clone()), Entry { seq, fields });
        debug!(collection, id = %id, "document created");
        Ok(id)
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let key = (collection.to_string(), id.to_string());
        Ok(self.docs.get(&key).map(|entry| StoredDocument {
            id: id.to_string(),
            fields: entry.fields.clone(),
        }))
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.collect(collection, |doc| doc.get(field) == Some(value)))
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.collect(collection, |_| true))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        let key = (collection.to_string(), id.to_string());
        let mut entry = self
            .docs
            .get_mut(&key)
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        merge(&mut entry.fields, fields);
        Ok(())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        fields: Document,
    ) -> Result<(), StoreError> {
        let key = (collection.to_string(), id.to_string());
        let mut entry = self
            .docs
            .get_mut(&key)
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        if entry.fields.get(field) != Some(expected) {
            debug!(collection, id, field, "conditional update rejected");
            return Err(StoreError::PreconditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
            });
        }

        merge(&mut entry.fields, fields);
        Ok(())
    }
}
