use std::sync::Arc;

use crate::store::DocumentStore;

pub mod order_repository;

pub use order_repository::OrderRepository;

/// Repository trait for common store access
pub trait Repository {
    fn store(&self) -> &dyn DocumentStore;
    fn collection(&self) -> &str;
}

#[derive(Clone)]
pub struct BaseRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl BaseRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

impl Repository for BaseRepository {
    fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
