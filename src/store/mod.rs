//! Document store abstraction.
//!
//! Orders are persisted as schemaless JSON documents grouped in named
//! collections, the way a hosted document database exposes them. The
//! lifecycle code only relies on the five operations below.

use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod memory;

pub use memory::InMemoryDocumentStore;

/// Field map of a single document.
pub type Document = Map<String, Value>;

/// A document together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Document,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {collection}/{id} does not exist")]
    DocumentNotFound { collection: String, id: String },

    #[error("precondition failed for {collection}/{id}: field '{field}' no longer matches")]
    PreconditionFailed {
        collection: String,
        id: String,
        field: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence collaborator for the order lifecycle.
///
/// Implementations need not be transactional, but a single `update` or
/// `update_if` call must apply all of its fields or none of them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document and returns the id assigned to it.
    async fn create(&self, collection: &str, fields: Document) -> Result<String, StoreError>;

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// Returns every document whose `field` equals `value`, in insertion order.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    /// Returns every document of the collection, in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;

    /// Merges `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Document)
        -> Result<(), StoreError>;

    /// Merges `fields` into an existing document only while `field` still
    /// holds `expected`. Fails with [`StoreError::PreconditionFailed`]
    /// otherwise, leaving the document untouched.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: &Value,
        fields: Document,
    ) -> Result<(), StoreError>;
}
