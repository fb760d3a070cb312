// ── Document store contract ──

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A stored document. Backends treat it as an opaque JSON object.
pub type Document = Value;

/// Logical collections, each an independently keyed document set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Collection {
    /// Keyed by agent id.
    Agents,
    /// Append-only; keys are assigned by the store.
    Notifications,
    /// Keyed by agent id.
    InterfaceData,
    /// Keyed by agent id.
    #[strum(serialize = "node-traffic-rollup")]
    NodeTraffic,
    /// Keyed by VLAN name.
    #[strum(serialize = "vlan-traffic-rollup")]
    VlanTraffic,
    /// Keyed by agent id.
    #[strum(serialize = "ids-event-bundles")]
    IdsEvents,
}

/// Selection predicate for `find_all`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Top-level field equals value.
    Eq { field: String, value: Value },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => doc.get(field) == Some(value),
        }
    }
}

/// A document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub doc: Document,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}: key {key} already exists")]
    Duplicate { collection: Collection, key: String },

    #[error("{collection}: key {key} does not exist")]
    Missing { collection: Collection, key: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Capability interface the pipeline persists through.
///
/// Implementations must tolerate concurrent calls. Single-document
/// operations are atomic; nothing spans documents. Reads return
/// documents in insertion order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_all(&self, collection: Collection, filter: &Filter)
    -> Result<Vec<Record>, StoreError>;

    async fn find_one(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Insert a new document. With `key: None` the store assigns one
    /// (append semantics). Returns the key used.
    async fn insert(
        &self,
        collection: Collection,
        key: Option<&str>,
        doc: Document,
    ) -> Result<String, StoreError>;

    /// Replace an existing document, keeping its insertion position.
    async fn update(&self, collection: Collection, key: &str, doc: Document)
    -> Result<(), StoreError>;
}
