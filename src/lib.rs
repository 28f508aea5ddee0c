//! Farm Direct order lifecycle
//!
//! Orders placed by customers with a single farmer, moved through a fixed
//! status machine with an append-only history, and exposed over an axum
//! HTTP API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod store;

use axum::{
    extract::FromRef,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    auth::AuthService,
    events::EventSender,
    repositories::OrderRepository,
    services::{checkout::CheckoutService, orders::OrderService},
    store::DocumentStore,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub orders: OrderService,
    pub checkout: CheckoutService,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires the services over `store`. Events are published only when a
    /// sender is given.
    pub fn new(
        config: config::AppConfig,
        store: Arc<dyn DocumentStore>,
        event_sender: Option<EventSender>,
    ) -> Self {
        let repository = OrderRepository::new(store, config.orders_collection.clone());
        let orders = OrderService::new(repository, event_sender);
        let checkout = CheckoutService::new(orders.clone());
        let auth = Arc::new(AuthService::new(
            config.jwt_secret.clone(),
            config.jwt_expiration(),
        ));

        Self {
            config,
            orders,
            checkout,
            auth,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/history",
            get(handlers::orders::get_order_history),
        )
        .route(
            "/orders/:id/transitions",
            get(handlers::orders::get_allowed_transitions),
        )
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/checkout", post(handlers::orders::checkout))
        .route("/track/:code", get(handlers::tracking::track_order))
}

/// Full application router: health probe plus the versioned API.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .fallback(route_not_found)
        .with_state(state)
}

async fn route_not_found(uri: axum::http::Uri) -> errors::ServiceError {
    errors::ServiceError::NotFound(format!("No route for {}", uri.path()))
}

async fn health_check() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_response_omits_empty_message() {
        let body = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(body, json!({"success": true, "data": 1}));
    }

    #[test]
    fn message_is_serialized_when_present() {
        let body = serde_json::to_value(ApiResponse::success("x").with_message("done")).unwrap();
        assert_eq!(body["message"], "done");
    }
}
