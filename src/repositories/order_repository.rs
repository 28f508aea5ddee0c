use serde_json::Value;
use std::sync::Arc;

use crate::models::{Order, OrderStatus};
use crate::repositories::Repository;
use crate::store::{Document, DocumentStore, StoreError, StoredDocument};

use super::BaseRepository;

pub const FIELD_STATUS: &str = "status";
pub const FIELD_STATUS_HISTORY: &str = "statusHistory";
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_TRACKING_ID: &str = "trackingId";
pub const FIELD_CLIENT_ID: &str = "clientId";
pub const FIELD_ROLNIK_ID: &str = "rolnikId";

/// Repository for order documents.
///
/// The document id is kept outside the stored fields and spliced back in
/// on read.
#[derive(Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            base: BaseRepository::new(store, collection),
        }
    }

    /// Persist a new order and return the id the store assigned
    pub async fn insert(&self, order: &Order) -> Result<String, StoreError> {
        let fields = to_document(order)?;
        self.store().create(self.collection(), fields).await
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StoreError> {
        self.store()
            .get_by_id(self.collection(), id)
            .await?
            .map(from_stored)
            .transpose()
    }

    /// Find orders carrying a tracking code, in store order
    pub async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Vec<Order>, StoreError> {
        self.find_by_field(FIELD_TRACKING_ID, tracking_id).await
    }

    /// Find orders placed by a customer
    pub async fn find_by_client(&self, client_id: &str) -> Result<Vec<Order>, StoreError> {
        self.find_by_field(FIELD_CLIENT_ID, client_id).await
    }

    /// Find orders addressed to a farmer
    pub async fn find_by_farmer(&self, rolnik_id: &str) -> Result<Vec<Order>, StoreError> {
        self.find_by_field(FIELD_ROLNIK_ID, rolnik_id).await
    }

    /// Get all orders
    pub async fn find_all(&self) -> Result<Vec<Order>, StoreError> {
        self.store()
            .list(self.collection())
            .await?
            .into_iter()
            .map(from_stored)
            .collect()
    }

    /// Write the status, the full ledger and `updatedAt` in one conditional
    /// update that only lands while the stored status is still `previous`.
    pub async fn save_status_change(
        &self,
        order: &Order,
        previous: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut fields = Document::new();
        fields.insert(FIELD_STATUS.to_string(), serde_json::to_value(order.status)?);
        fields.insert(
            FIELD_STATUS_HISTORY.to_string(),
            serde_json::to_value(&order.status_history)?,
        );
        fields.insert(
            FIELD_UPDATED_AT.to_string(),
            serde_json::to_value(order.updated_at)?,
        );

        self.store()
            .update_if(
                self.collection(),
                &order.id,
                FIELD_STATUS,
                &serde_json::to_value(previous)?,
                fields,
            )
            .await
    }

    async fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<Order>, StoreError> {
        self.store()
            .query(self.collection(), field, &Value::String(value.to_string()))
            .await?
            .into_iter()
            .map(from_stored)
            .collect()
    }
}

impl Repository for OrderRepository {
    fn store(&self) -> &dyn DocumentStore {
        self.base.store()
    }

    fn collection(&self) -> &str {
        self.base.collection()
    }
}

fn to_document(order: &Order) -> Result<Document, StoreError> {
    match serde_json::to_value(order)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        _ => Err(StoreError::Serialization(serde::ser::Error::custom(
            "order did not serialize to an object",
        ))),
    }
}

fn from_stored(doc: StoredDocument) -> Result<Order, StoreError> {
    let StoredDocument { id, mut fields } = doc;
    fields.insert("id".to_string(), Value::String(id));
    Ok(serde_json::from_value(Value::Object(fields))?)
}
