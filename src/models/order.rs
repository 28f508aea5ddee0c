use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use validator::Validate;

/// Enum representing the possible statuses of an order.
///
/// Serialized in snake_case (`in_transit`) both on the wire and in stored
/// documents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

/// Happy path used for progress reporting. Cancelled orders are off-path.
const PROGRESS_PATH: [OrderStatus; 7] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::InTransit,
    OrderStatus::Delivered,
    OrderStatus::Completed,
];

impl OrderStatus {
    /// Status every order starts in.
    pub const INITIAL: OrderStatus = OrderStatus::Pending;

    /// Statuses reachable in one step from `self`.
    ///
    /// `Ready` may skip straight to `Delivered` or `Completed` for orders
    /// handed over in person without transit tracking.
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[InTransit, Delivered, Completed, Cancelled],
            InTransit => &[Delivered, Cancelled],
            Delivered => &[Completed],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Ready => "Ready for Pickup/Delivery",
            OrderStatus::InTransit => "In Transit",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order has been placed but not yet confirmed by the farmer",
            OrderStatus::Confirmed => "Order has been confirmed by the farmer",
            OrderStatus::Preparing => "Farmer is preparing your order",
            OrderStatus::Ready => "Order is ready for pickup or delivery",
            OrderStatus::InTransit => "Order is on the way for delivery",
            OrderStatus::Delivered => "Order has been delivered to the customer",
            OrderStatus::Completed => "Order has been completed",
            OrderStatus::Cancelled => "Order has been cancelled",
        }
    }

    /// Position along the happy path as a whole percentage, `None` once
    /// cancelled.
    pub fn progress_percent(self) -> Option<u8> {
        let index = PROGRESS_PATH.iter().position(|s| *s == self)?;
        let percent = ((index + 1) as f64 / PROGRESS_PATH.len() as f64 * 100.0).round();
        Some(percent as u8)
    }
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
}

/// One entry of an order's status ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

impl StatusChange {
    pub fn new(status: OrderStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            note: note.into(),
        }
    }
}

/// Line item as submitted by the customer, before totals are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub product_id: String,
    pub product_name: String,
    #[serde(default)]
    pub product_image: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
}

/// Purchased line item, frozen at order creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub total_price: Decimal,
}

impl OrderItem {
    /// Freezes a submitted line, computing its total. `None` when
    /// `price * quantity` does not fit in a `Decimal`.
    pub fn priced(item: NewOrderItem) -> Option<Self> {
        let total_price = item.price.checked_mul(item.quantity)?;
        Some(Self {
            product_id: item.product_id,
            product_name: item.product_name,
            product_image: item.product_image,
            quantity: item.quantity,
            unit: item.unit,
            price: item.price,
            total_price,
        })
    }
}

/// Shipping and contact details captured at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
}

impl CustomerInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Order aggregate as persisted in the `orders` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub tracking_id: String,
    pub status: OrderStatus,
    pub status_history: Vec<StatusChange>,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub total_price: Decimal,
    pub client_id: String,
    #[serde(default)]
    pub client_name: Option<String>,
    pub rolnik_id: String,
    #[serde(default)]
    pub rolnik_name: Option<String>,
    pub customer_info: CustomerInfo,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Most recent ledger entry.
    pub fn latest_change(&self) -> Option<&StatusChange> {
        self.status_history.last()
    }

    /// True when the ledger is non-empty and its tail agrees with `status`.
    pub fn is_consistent(&self) -> bool {
        self.latest_change()
            .map_or(false, |change| change.status == self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Appends `change` to the ledger and moves `status` along with it.
    /// Callers check the transition table first.
    pub fn record(&mut self, change: StatusChange) {
        self.status = change.status;
        self.updated_at = Some(change.timestamp);
        self.status_history.push(change);
    }
}
