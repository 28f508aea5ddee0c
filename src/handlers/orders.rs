use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{ActingUser, Role},
    errors::ServiceError,
    handlers::AppState,
    models::{Order, OrderStatus, StatusChange},
    services::{checkout::CheckoutRequest, orders::CreateOrderRequest},
    ApiResponse, ApiResult,
};

/// Request body for `PUT /orders/:id/status`
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// A status together with its display metadata
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: OrderStatus,
    pub label: &'static str,
    pub description: &'static str,
    pub progress_percent: Option<u8>,
    pub terminal: bool,
}

impl From<OrderStatus> for StatusView {
    fn from(status: OrderStatus) -> Self {
        Self {
            status,
            label: status.label(),
            description: status.description(),
            progress_percent: status.progress_percent(),
            terminal: status.is_terminal(),
        }
    }
}

/// Parses a status string from a request body, accepting any case.
pub(crate) fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(&raw.trim().to_ascii_lowercase())
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status '{}'", raw)))
}

/// Create a single-farmer order on behalf of the calling customer
pub async fn create_order(
    State(state): State<AppState>,
    user: ActingUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ServiceError> {
    let Json(request) = payload?;
    if user.role != Role::Customer || user.id != request.client_id {
        return Err(ServiceError::Forbidden(
            "Orders can only be placed by the customer they belong to".to_string(),
        ));
    }

    let order = state.orders.create_order(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(order).with_message("Order created")),
    ))
}

/// Place the calling customer's cart, one order per farmer
pub async fn checkout(
    State(state): State<AppState>,
    user: ActingUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Order>>>), ServiceError> {
    let Json(request) = payload?;
    if user.role != Role::Customer {
        return Err(ServiceError::Forbidden(
            "Only customers can check out".to_string(),
        ));
    }

    let orders = state.checkout.place_orders(&user.id, request).await?;
    let message = format!("Placed {} order(s)", orders.len());
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(orders).with_message(message)),
    ))
}

/// List the caller's orders, newest first
pub async fn list_orders(State(state): State<AppState>, user: ActingUser) -> ApiResult<Vec<Order>> {
    let orders = state
        .orders
        .list_orders_for_user(&user.id, user.role)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Get an order the caller is a party to
pub async fn get_order(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    user: ActingUser,
) -> ApiResult<Order> {
    let Path(id) = path?;
    let order = state.orders.get_order_for(&id, &user).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Get the status ledger of an order, oldest entry first
pub async fn get_order_history(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    user: ActingUser,
) -> ApiResult<Vec<StatusChange>> {
    let Path(id) = path?;
    let order = state.orders.get_order_for(&id, &user).await?;
    Ok(Json(ApiResponse::success(order.status_history)))
}

/// Statuses the caller may move the order to
pub async fn get_allowed_transitions(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    user: ActingUser,
) -> ApiResult<Vec<StatusView>> {
    let Path(id) = path?;
    let next = state.orders.allowed_transitions(&id, &user).await?;
    Ok(Json(ApiResponse::success(
        next.into_iter().map(StatusView::from).collect(),
    )))
}

/// Move an order along its lifecycle
pub async fn update_order_status(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    user: ActingUser,
    payload: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> ApiResult<Order> {
    let Path(id) = path?;
    let Json(request) = payload?;
    let new_status = parse_status(&request.status)?;
    let note = request.note.unwrap_or_default();

    let order = state
        .orders
        .transition_status(&id, new_status, &note, &user)
        .await?;

    info!(order_id = %order.id, status = %order.status, "status updated via API");
    let message = format!("Order is now {}", order.status.label());
    Ok(Json(ApiResponse::success(order).with_message(message)))
}
