// ── Typed access to the document store ──

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::document::{Collection, DocumentStore, Filter};
use crate::error::CoreError;

/// Serializes domain types in and out of an untyped `DocumentStore`.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>, CoreError> {
        let Some(doc) = self.store.find_one(collection, key).await? else {
            return Ok(None);
        };
        serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| CoreError::MalformedDocument {
                collection: collection.to_string(),
                key: key.to_owned(),
                message: e.to_string(),
            })
    }

    /// All matching documents that decode as `T`, keyed, in insertion
    /// order. Documents that fail to decode are logged and skipped.
    pub async fn all<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<(String, T)>, CoreError> {
        let records = self.store.find_all(collection, filter).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record.doc) {
                Ok(value) => Some((record.key, value)),
                Err(e) => {
                    warn!(%collection, key = %record.key, error = %e, "skipping malformed document");
                    None
                }
            })
            .collect())
    }

    pub async fn insert<T: Serialize + Sync>(
        &self,
        collection: Collection,
        key: Option<&str>,
        value: &T,
    ) -> Result<String, CoreError> {
        let doc = encode(value)?;
        Ok(self.store.insert(collection, key, doc).await?)
    }

    pub async fn replace<T: Serialize + Sync>(
        &self,
        collection: Collection,
        key: &str,
        value: &T,
    ) -> Result<(), CoreError> {
        let doc = encode(value)?;
        Ok(self.store.update(collection, key, doc).await?)
    }

    /// Replace if present, insert otherwise. Callers hold the key's lock.
    pub async fn upsert<T: Serialize + Sync>(
        &self,
        collection: Collection,
        key: &str,
        value: &T,
    ) -> Result<(), CoreError> {
        let doc = encode(value)?;
        if self.store.find_one(collection, key).await?.is_some() {
            self.store.update(collection, key, doc).await?;
        } else {
            self.store.insert(collection, Some(key), doc).await?;
        }
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(format!("encode failed: {e}")))
}
