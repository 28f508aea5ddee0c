#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use farm_direct::{
    auth::{ActingUser, AuthService},
    config::AppConfig,
    events::{self, EventSender},
    models::{CustomerInfo, NewOrderItem, Order, PaymentMethod},
    services::orders::CreateOrderRequest,
    store::InMemoryDocumentStore,
    AppState,
};

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Helper harness for spinning up an application over an in-memory store.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: InMemoryDocumentStore,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with an empty store.
    pub fn new() -> Self {
        let mut cfg = AppConfig::new(TEST_SECRET);
        cfg.environment = "test".to_string();

        let store = InMemoryDocumentStore::new();
        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(cfg, Arc::new(store.clone()), Some(event_sender));
        let auth_service = state.auth.clone();
        let router = farm_direct::build_app(state.clone());

        Self {
            router,
            state,
            store,
            auth_service,
            _event_task: event_task,
        }
    }

    /// Bearer token for `user`.
    pub fn token_for(&self, user: &ActingUser) -> String {
        self.auth_service
            .issue_token(user)
            .expect("issue token for test user")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a raw, already-encoded body as `user`.
    pub async fn request_raw_as(
        &self,
        user: &ActingUser,
        method: Method,
        uri: &str,
        body: &'static str,
    ) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token_for(user)))
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for requests made as `user`.
    pub async fn request_as(
        &self,
        user: &ActingUser,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.token_for(user);
        self.request(method, uri, body, Some(&token)).await
    }

    /// Create an order straight through the service layer.
    pub async fn seed_order(&self, client_id: &str, rolnik_id: &str) -> Order {
        self.state
            .orders
            .create_order(order_request(client_id, rolnik_id))
            .await
            .expect("seed order for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn customer_info() -> CustomerInfo {
    CustomerInfo {
        first_name: "Anna".to_string(),
        last_name: "Kowalska".to_string(),
        email: "anna@example.com".to_string(),
        phone: "+48 600 100 200".to_string(),
        address: "Lipowa 7".to_string(),
        city: "Lublin".to_string(),
        postal_code: "20-001".to_string(),
    }
}

pub fn item(product_id: &str) -> NewOrderItem {
    NewOrderItem {
        product_id: product_id.to_string(),
        product_name: format!("Product {}", product_id),
        product_image: None,
        quantity: dec!(2),
        unit: "kg".to_string(),
        price: dec!(7.50),
    }
}

pub fn order_request(client_id: &str, rolnik_id: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        items: vec![item("potatoes")],
        customer_info: customer_info(),
        client_id: client_id.to_string(),
        client_name: Some("Anna Kowalska".to_string()),
        rolnik_id: rolnik_id.to_string(),
        rolnik_name: Some("Gospodarstwo Zielone".to_string()),
        payment_method: PaymentMethod::Cash,
        notes: None,
    }
}

pub fn order_payload(client_id: &str, rolnik_id: &str) -> Value {
    json!({
        "items": [{
            "productId": "apples",
            "productName": "Apples",
            "quantity": "3",
            "unit": "kg",
            "price": "4.00"
        }],
        "customerInfo": {
            "firstName": "Anna",
            "lastName": "Kowalska",
            "email": "anna@example.com",
            "address": "Lipowa 7",
            "city": "Lublin",
            "postalCode": "20-001"
        },
        "clientId": client_id,
        "rolnikId": rolnik_id,
        "paymentMethod": "card"
    })
}
