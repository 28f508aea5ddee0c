use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    errors::ServiceError,
    models::{CustomerInfo, NewOrderItem, Order, PaymentMethod},
    services::orders::{CreateOrderRequest, OrderService},
};

/// A cart line as the customer holds it: product snapshot plus the farmer
/// who sells it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub product_image: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub rolnik_id: String,
    #[serde(default)]
    pub rolnik_name: Option<String>,
}

impl From<CartLine> for NewOrderItem {
    fn from(line: CartLine) -> Self {
        Self {
            product_id: line.product_id,
            product_name: line.product_name,
            product_image: line.product_image,
            quantity: line.quantity,
            unit: line.unit,
            price: line.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    pub customer_info: CustomerInfo,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

struct FarmerBatch {
    rolnik_id: String,
    rolnik_name: Option<String>,
    items: Vec<NewOrderItem>,
}

/// Turns a cart into one order per farmer.
#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderService,
}

impl CheckoutService {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }

    /// Places the cart. Orders come back in the order their farmers first
    /// appear in the cart. Invalid input rejects the whole cart; orders
    /// created before a store failure stay in place.
    #[instrument(skip(self, request), fields(client_id = %client_id, lines = request.items.len()))]
    pub async fn place_orders(
        &self,
        client_id: &str,
        request: CheckoutRequest,
    ) -> Result<Vec<Order>, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Your cart is empty".to_string(),
            ));
        }

        let client_name = request.customer_info.full_name();
        let requests: Vec<CreateOrderRequest> = group_by_farmer(request.items)
            .into_iter()
            .map(|batch| CreateOrderRequest {
                items: batch.items,
                customer_info: request.customer_info.clone(),
                client_id: client_id.to_string(),
                client_name: Some(client_name.clone()),
                rolnik_id: batch.rolnik_id,
                rolnik_name: batch.rolnik_name,
                payment_method: request.payment_method,
                notes: request.notes.clone(),
            })
            .collect();

        // Every batch is checked before the first order is written.
        for order_request in &requests {
            OrderService::validate_request(order_request)?;
        }

        let mut placed = Vec::with_capacity(requests.len());
        for order_request in requests {
            placed.push(self.orders.create_order(order_request).await?);
        }

        info!(orders = placed.len(), "Checkout completed");
        Ok(placed)
    }
}

fn group_by_farmer(lines: Vec<CartLine>) -> Vec<FarmerBatch> {
    let mut batches: Vec<FarmerBatch> = Vec::new();
    for line in lines {
        match batches.iter().position(|b| b.rolnik_id == line.rolnik_id) {
            Some(index) => batches[index].items.push(line.into()),
            None => batches.push(FarmerBatch {
                rolnik_id: line.rolnik_id.clone(),
                rolnik_name: line.rolnik_name.clone(),
                items: vec![line.into()],
            }),
        }
    }
    batches
}
