use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::{
    auth::{ActingUser, Role},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        CustomerInfo, NewOrderItem, Order, OrderItem, OrderStatus, PaymentMethod, StatusChange,
    },
    repositories::OrderRepository,
    services::tracking::{generate_tracking_id, is_tracking_id},
    store::StoreError,
};

/// Note recorded on the ledger entry every order starts with.
pub const ORDER_CREATED_NOTE: &str = "Order created";

/// Request type for creating a single-farmer order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<NewOrderItem>,
    #[validate]
    pub customer_info: CustomerInfo,
    #[validate(length(min = 1, message = "Client id is required"))]
    pub client_id: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[validate(length(min = 1, message = "Farmer id is required"))]
    pub rolnik_id: String,
    #[serde(default)]
    pub rolnik_name: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Service owning the order lifecycle: creation, status transitions and
/// lookups.
#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
    event_sender: Option<EventSender>,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(orders: OrderRepository, event_sender: Option<EventSender>) -> Self {
        Self {
            orders,
            event_sender,
        }
    }

    /// Checks a creation request without touching the store
    pub fn validate_request(request: &CreateOrderRequest) -> Result<(), ServiceError> {
        request.validate()?;
        validate_items(&request.items)?;
        price_items(request.items.clone())?;
        Ok(())
    }

    /// Creates a new order in `pending` with a single-entry status ledger
    #[instrument(skip(self, request), fields(client_id = %request.client_id, rolnik_id = %request.rolnik_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, ServiceError> {
        Self::validate_request(&request)?;

        let (items, subtotal) = price_items(request.items)?;
        let now = Utc::now();

        let mut order = Order {
            id: String::new(),
            tracking_id: generate_tracking_id(),
            status: OrderStatus::INITIAL,
            status_history: vec![StatusChange {
                status: OrderStatus::INITIAL,
                timestamp: now,
                note: ORDER_CREATED_NOTE.to_string(),
            }],
            items,
            subtotal,
            total_price: subtotal,
            client_id: request.client_id,
            client_name: request.client_name,
            rolnik_id: request.rolnik_id,
            rolnik_name: request.rolnik_name,
            customer_info: request.customer_info,
            payment_method: request.payment_method,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: None,
        };

        order.id = self.orders.insert(&order).await.map_err(|e| {
            error!(error = %e, "Failed to persist new order");
            ServiceError::from(e)
        })?;

        info!(
            order_id = %order.id,
            tracking_id = %order.tracking_id,
            total = %order.total_price,
            "Order created successfully"
        );

        self.publish(Event::OrderCreated {
            order_id: order.id.clone(),
            tracking_id: order.tracking_id.clone(),
            client_id: order.client_id.clone(),
            rolnik_id: order.rolnik_id.clone(),
        })
        .await;

        Ok(order)
    }

    /// Moves an order to `new_status`, appending a ledger entry.
    ///
    /// Only the owning farmer or an admin may do this, and only along the
    /// transition table. Status and ledger are written together and only if
    /// nobody else moved the order in the meantime.
    #[instrument(skip(self, note, actor), fields(order_id = %order_id, new_status = %new_status, actor_id = %actor.id))]
    pub async fn transition_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        note: &str,
        actor: &ActingUser,
    ) -> Result<Order, ServiceError> {
        let mut order = self.get_order(order_id).await?;

        if !actor.can_manage(&order) {
            warn!(role = %actor.role, "Rejected status change by non-owner");
            return Err(ServiceError::Forbidden(format!(
                "User {} may not change the status of order {}",
                actor.id, order_id
            )));
        }

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            warn!(%old_status, "Invalid status transition");
            return Err(ServiceError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        let note = if note.trim().is_empty() {
            format!("Status changed to {}", new_status)
        } else {
            note.to_string()
        };
        order.record(StatusChange::new(new_status, note));

        match self.orders.save_status_change(&order, old_status).await {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed { .. }) => {
                warn!(%old_status, "Order status changed concurrently");
                return Err(ServiceError::ConcurrentModification(format!(
                    "Order {} changed status while it was being updated",
                    order_id
                )));
            }
            Err(StoreError::DocumentNotFound { .. }) => {
                return Err(ServiceError::NotFound(format!(
                    "Order {} not found",
                    order_id
                )));
            }
            Err(e) => {
                error!(error = %e, "Failed to persist status change");
                return Err(e.into());
            }
        }

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, new_status
        );

        self.publish(Event::OrderStatusChanged {
            order_id: order.id.clone(),
            old_status,
            new_status,
        })
        .await;

        Ok(order)
    }

    /// Retrieves an order by ID
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(order_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order");
                ServiceError::from(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Retrieves an order for a user who must be a party to it
    pub async fn get_order_for(
        &self,
        order_id: &str,
        actor: &ActingUser,
    ) -> Result<Order, ServiceError> {
        let order = self.get_order(order_id).await?;
        if !actor.can_view(&order) {
            return Err(ServiceError::Forbidden(format!(
                "User {} may not view order {}",
                actor.id, order_id
            )));
        }
        Ok(order)
    }

    /// Retrieves an order by its public tracking code. The first match wins
    /// when codes collide.
    #[instrument(skip(self))]
    pub async fn get_order_by_tracking_id(&self, tracking_id: &str) -> Result<Order, ServiceError> {
        let mut matches = self.orders.find_by_tracking_id(tracking_id).await?;
        if matches.len() > 1 {
            warn!(count = matches.len(), "Tracking code shared by several orders");
        }
        if matches.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No order with tracking code {}",
                tracking_id
            )));
        }
        Ok(matches.swap_remove(0))
    }

    /// Lenient public lookup: tracking code first, then the document id,
    /// then any order whose id starts with `code`.
    #[instrument(skip(self))]
    pub async fn find_order_by_tracking_code(&self, code: &str) -> Result<Order, ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Tracking code is required".to_string(),
            ));
        }

        if is_tracking_id(code) {
            match self.get_order_by_tracking_id(code).await {
                Err(ServiceError::NotFound(_)) => {}
                other => return other,
            }
        }

        if let Some(order) = self.orders.find_by_id(code).await? {
            info!(order_id = %order.id, "Found order by document id");
            return Ok(order);
        }

        self.orders
            .find_all()
            .await?
            .into_iter()
            .find(|order| order.id.starts_with(code))
            .ok_or_else(|| ServiceError::NotFound(format!("No order matches code {}", code)))
    }

    /// Lists a user's orders, newest first. Customers see what they bought,
    /// farmers what they sell.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: &str,
        role: Role,
    ) -> Result<Vec<Order>, ServiceError> {
        let mut orders = match role {
            Role::Customer => self.orders.find_by_client(user_id).await?,
            Role::Farmer => self.orders.find_by_farmer(user_id).await?,
            Role::Admin => {
                return Err(ServiceError::Forbidden(
                    "Order listing is per customer or farmer".to_string(),
                ))
            }
        };

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        info!(count = orders.len(), "Orders listed");
        Ok(orders)
    }

    /// The full status ledger of an order, oldest entry first
    pub async fn status_history(&self, order_id: &str) -> Result<Vec<StatusChange>, ServiceError> {
        Ok(self.get_order(order_id).await?.status_history)
    }

    /// Statuses `actor` could move the order to right now. Parties who may
    /// only view the order get an empty list; anyone else is forbidden.
    pub async fn allowed_transitions(
        &self,
        order_id: &str,
        actor: &ActingUser,
    ) -> Result<Vec<OrderStatus>, ServiceError> {
        let order = self.get_order_for(order_id, actor).await?;
        if !actor.can_manage(&order) {
            return Ok(Vec::new());
        }
        Ok(order.status.allowed_next().to_vec())
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to publish order event");
            }
        }
    }
}

/// Line totals and their sum, failing instead of overflowing.
fn price_items(items: Vec<NewOrderItem>) -> Result<(Vec<OrderItem>, Decimal), ServiceError> {
    let mut priced = Vec::with_capacity(items.len());
    let mut subtotal = Decimal::ZERO;
    for item in items {
        let product_id = item.product_id.clone();
        let line = OrderItem::priced(item).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Line total for product {} is too large",
                product_id
            ))
        })?;
        subtotal = subtotal.checked_add(line.total_price).ok_or_else(|| {
            ServiceError::ValidationError("Order amount too large".to_string())
        })?;
        priced.push(line);
    }
    Ok((priced, subtotal))
}

fn validate_items(items: &[NewOrderItem]) -> Result<(), ServiceError> {
    for item in items {
        if item.product_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Every item needs a product id".to_string(),
            ));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be positive",
                item.product_id
            )));
        }
        if item.price.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "Price for product {} cannot be negative",
                item.product_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, DocumentStore, InMemoryDocumentStore, StoredDocument};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::Arc;

    mock! {
        pub Store {}

        #[async_trait]
        impl DocumentStore for Store {
            async fn create(&self, collection: &str, fields: Document) -> Result<String, StoreError>;
            async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError>;
            async fn query(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<StoredDocument>, StoreError>;
            async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;
            async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError>;
            async fn update_if(&self, collection: &str, id: &str, field: &str, expected: &Value, fields: Document) -> Result<(), StoreError>;
        }
    }

    fn customer_info() -> CustomerInfo {
        CustomerInfo {
            first_name: "Jan".into(),
            last_name: "Kowalski".into(),
            email: "jan@example.com".into(),
            phone: "+48 600 000 000".into(),
            address: "Leśna 5".into(),
            city: "Poznań".into(),
            postal_code: "60-001".into(),
        }
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![
                NewOrderItem {
                    product_id: "p-eggs".into(),
                    product_name: "Eggs".into(),
                    product_image: None,
                    quantity: dec!(2),
                    unit: "dozen".into(),
                    price: dec!(12.50),
                },
                NewOrderItem {
                    product_id: "p-honey".into(),
                    product_name: "Honey".into(),
                    product_image: Some("honey.jpg".into()),
                    quantity: dec!(1),
                    unit: "jar".into(),
                    price: dec!(30.00),
                },
            ],
            customer_info: customer_info(),
            client_id: "client-1".into(),
            client_name: None,
            rolnik_id: "farmer-1".into(),
            rolnik_name: Some("Green Acres".into()),
            payment_method: PaymentMethod::Card,
            notes: Some(String::new()),
        }
    }

    fn service() -> OrderService {
        let store = Arc::new(InMemoryDocumentStore::new());
        OrderService::new(OrderRepository::new(store, "orders"), None)
    }

    #[tokio::test]
    async fn create_order_computes_totals_and_seeds_history() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();

        assert_eq!(order.subtotal, dec!(55.00));
        assert_eq!(order.total_price, order.subtotal);
        assert_eq!(order.items[0].total_price, dec!(25.00));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].note, ORDER_CREATED_NOTE);
        assert!(order.notes.is_none());
        assert!(!order.id.is_empty());

        let stored = svc.get_order(&order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn huge_amounts_are_rejected_not_overflowed() {
        let svc = service();

        let mut line_overflow = request();
        line_overflow.items[0].price = Decimal::MAX;
        line_overflow.items[0].quantity = dec!(2);
        assert_matches!(
            svc.create_order(line_overflow).await,
            Err(ServiceError::ValidationError(msg)) if msg.contains("too large")
        );

        let mut sum_overflow = request();
        sum_overflow.items[0].price = Decimal::MAX;
        sum_overflow.items[0].quantity = dec!(1);
        sum_overflow.items[1].price = Decimal::MAX;
        assert_matches!(
            svc.create_order(sum_overflow).await,
            Err(ServiceError::ValidationError(msg)) if msg.contains("too large")
        );
    }

    #[tokio::test]
    async fn create_order_rejects_bad_input() {
        let svc = service();

        let mut empty = request();
        empty.items.clear();
        assert_matches!(
            svc.create_order(empty).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut zero_qty = request();
        zero_qty.items[0].quantity = Decimal::ZERO;
        assert_matches!(
            svc.create_order(zero_qty).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut bad_email = request();
        bad_email.customer_info.email = "not-an-email".into();
        assert_matches!(
            svc.create_order(bad_email).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn empty_note_gets_default_text() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();
        let updated = svc
            .transition_status(
                &order.id,
                OrderStatus::Confirmed,
                "  ",
                &ActingUser::farmer("farmer-1"),
            )
            .await
            .unwrap();
        assert_eq!(
            updated.latest_change().unwrap().note,
            "Status changed to confirmed"
        );
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn admin_may_transition_any_order() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();
        let updated = svc
            .transition_status(
                &order.id,
                OrderStatus::Cancelled,
                "out of stock",
                &ActingUser::admin("root"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);
        assert!(updated.is_terminal());
    }

    #[tokio::test]
    async fn other_farmer_is_forbidden() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();
        assert_matches!(
            svc.transition_status(
                &order.id,
                OrderStatus::Confirmed,
                "",
                &ActingUser::farmer("farmer-2"),
            )
            .await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn allowed_transitions_depend_on_actor() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();

        let owner = svc
            .allowed_transitions(&order.id, &ActingUser::farmer("farmer-1"))
            .await
            .unwrap();
        assert_eq!(owner, vec![OrderStatus::Confirmed, OrderStatus::Cancelled]);

        let customer = svc
            .allowed_transitions(&order.id, &ActingUser::customer("client-1"))
            .await
            .unwrap();
        assert!(customer.is_empty());

        assert_matches!(
            svc.allowed_transitions(&order.id, &ActingUser::customer("client-2"))
                .await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn allowed_transitions_reads_the_order_once() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();
        let mut doc = serde_json::to_value(&order).unwrap();
        let fields = doc.as_object_mut().unwrap();
        fields.remove("id");
        let fields = fields.clone();

        let mut store = MockStore::new();
        store.expect_get_by_id().times(1).returning(move |_, id| {
            Ok(Some(StoredDocument {
                id: id.to_string(),
                fields: fields.clone(),
            }))
        });
        let counted = OrderService::new(OrderRepository::new(Arc::new(store), "orders"), None);

        let next = counted
            .allowed_transitions(&order.id, &ActingUser::admin("root"))
            .await
            .unwrap();
        assert_eq!(next, vec![OrderStatus::Confirmed, OrderStatus::Cancelled]);
    }

    #[tokio::test]
    async fn admins_cannot_list_by_role() {
        let svc = service();
        assert_matches!(
            svc.list_orders_for_user("root", Role::Admin).await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_error() {
        let mut store = MockStore::new();
        store
            .expect_create()
            .returning(|_, _| Err(StoreError::Unavailable("connection reset".into())));
        let svc = OrderService::new(OrderRepository::new(Arc::new(store), "orders"), None);

        assert_matches!(
            svc.create_order(request()).await,
            Err(ServiceError::StoreError(StoreError::Unavailable(_)))
        );
    }

    #[tokio::test]
    async fn lost_compare_and_swap_reports_concurrent_modification() {
        let svc = service();
        let order = svc.create_order(request()).await.unwrap();
        let mut doc = serde_json::to_value(&order).unwrap();
        let fields = doc.as_object_mut().unwrap();
        fields.remove("id");
        let fields = fields.clone();

        let mut store = MockStore::new();
        store.expect_get_by_id().returning(move |_, id| {
            Ok(Some(StoredDocument {
                id: id.to_string(),
                fields: fields.clone(),
            }))
        });
        store.expect_update_if().returning(|collection, id, field, _, _| {
            Err(StoreError::PreconditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
            })
        });
        let racing = OrderService::new(OrderRepository::new(Arc::new(store), "orders"), None);

        assert_matches!(
            racing
                .transition_status(
                    &order.id,
                    OrderStatus::Confirmed,
                    "",
                    &ActingUser::farmer("farmer-1"),
                )
                .await,
            Err(ServiceError::ConcurrentModification(_))
        );
    }

    #[tokio::test]
    async fn events_are_published_for_create_and_transition() {
        let (sender, mut rx) = EventSender::channel(8);
        let store = Arc::new(InMemoryDocumentStore::new());
        let svc = OrderService::new(OrderRepository::new(store, "orders"), Some(sender));

        let order = svc.create_order(request()).await.unwrap();
        svc.transition_status(
            &order.id,
            OrderStatus::Confirmed,
            "",
            &ActingUser::farmer("farmer-1"),
        )
        .await
        .unwrap();

        assert_matches!(rx.recv().await, Some(Event::OrderCreated { .. }));
        assert_eq!(
            rx.recv().await,
            Some(Event::OrderStatusChanged {
                order_id: order.id.clone(),
                old_status: OrderStatus::Pending,
                new_status: OrderStatus::Confirmed,
            })
        );
    }
}
