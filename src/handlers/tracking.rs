use axum::{
    extract::{rejection::PathRejection, Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    handlers::{orders::StatusView, AppState},
    models::{Order, OrderItem, StatusChange},
    ApiResponse, ApiResult,
};

/// What an anonymous visitor sees for a tracking code. Contact details and
/// party ids stay private.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub tracking_id: String,
    pub status: StatusView,
    pub status_history: Vec<StatusChange>,
    pub items: Vec<OrderItem>,
    pub total_price: Decimal,
    pub rolnik_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Order> for TrackingView {
    fn from(order: Order) -> Self {
        Self {
            tracking_id: order.tracking_id,
            status: order.status.into(),
            status_history: order.status_history,
            items: order.items,
            total_price: order.total_price,
            rolnik_name: order.rolnik_name,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Public order lookup by tracking code
pub async fn track_order(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<TrackingView> {
    let Path(code) = path?;
    let order = state.orders.find_order_by_tracking_code(&code).await?;
    Ok(Json(ApiResponse::success(order.into())))
}
