/*!
 * # Identity Module
 *
 * Supplies the acting user (`id` + `role`) for order operations.
 *
 * Over HTTP the identity is carried by an HS256 JWT in the `Authorization`
 * header; the `sub` claim is the user id and the `role` claim one of
 * `klient`, `rolnik` or `admin`.
 */

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::Order;

/// Marketplace role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Role {
    #[serde(rename = "klient", alias = "customer")]
    #[strum(to_string = "klient", serialize = "customer")]
    Customer,
    #[serde(rename = "rolnik", alias = "farmer")]
    #[strum(to_string = "rolnik", serialize = "farmer")]
    Farmer,
    #[serde(rename = "admin")]
    #[strum(to_string = "admin")]
    Admin,
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub id: String,
    pub role: Role,
}

impl ActingUser {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Customer)
    }

    pub fn farmer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Farmer)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Only the farmer who owns the order, or an admin, may move its status.
    pub fn can_manage(&self, order: &Order) -> bool {
        if self.is_admin() {
            return true;
        }
        self.role == Role::Farmer && self.id == order.rolnik_id
    }

    /// Parties to the order and admins may read it.
    pub fn can_view(&self, order: &Order) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Farmer => self.id == order.rolnik_id,
            Role::Customer => self.id == order.client_id,
        }
    }
}

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies identity tokens.
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(jwt_secret: impl Into<String>, token_ttl: Duration) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl,
        }
    }

    /// Generate a JWT token for a user
    pub fn issue_token(&self, user: &ActingUser) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.token_ttl)
                .map_err(|_| ServiceError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Token creation failed: {}", e)))
    }

    /// Validate a JWT token and resolve the acting user
    pub fn validate_token(&self, token: &str) -> Result<ActingUser, ServiceError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("Token expired".to_string())
            }
            _ => ServiceError::Unauthorized("Invalid token".to_string()),
        })?
        .claims;

        Ok(ActingUser::new(claims.sub, claims.role))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;

        let user = auth.validate_token(token)?;
        debug!(user_id = %user.id, role = %user.role, "resolved acting user");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn service() -> AuthService {
        AuthService::new(
            "test_secret_value_that_is_long_enough_for_hs256_signing_0123456789",
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn role_accepts_both_spellings() {
        assert_eq!(Role::from_str("rolnik").unwrap(), Role::Farmer);
        assert_eq!(Role::from_str("farmer").unwrap(), Role::Farmer);
        assert_eq!(Role::from_str("klient").unwrap(), Role::Customer);
        assert_eq!(Role::Customer.to_string(), "klient");
        let parsed: Role = serde_json::from_str("\"customer\"").unwrap();
        assert_eq!(parsed, Role::Customer);
        assert_eq!(serde_json::to_string(&Role::Farmer).unwrap(), "\"rolnik\"");
    }

    fn order_between(client: &str, farmer: &str) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": "o1",
            "trackingId": "AB12CD34",
            "status": "pending",
            "statusHistory": [{"status": "pending", "timestamp": "2024-05-01T10:00:00Z", "note": "Order created"}],
            "items": [],
            "subtotal": "0",
            "totalPrice": "0",
            "clientId": client,
            "rolnikId": farmer,
            "customerInfo": {
                "firstName": "Jan", "lastName": "Nowak", "email": "jan@example.com",
                "address": "Polna 1", "city": "Radom", "postalCode": "26-600"
            },
            "paymentMethod": "cash",
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn only_owning_farmer_or_admin_manages() {
        let order = order_between("c1", "f1");
        let admin = ActingUser::admin("root");
        assert!(admin.is_admin());
        assert!(admin.can_manage(&order));
        assert!(ActingUser::farmer("f1").can_manage(&order));
        assert!(!ActingUser::farmer("f2").can_manage(&order));
        assert!(!ActingUser::customer("c1").can_manage(&order));
        assert!(!ActingUser::customer("c1").is_admin());

        assert!(ActingUser::customer("c1").can_view(&order));
        assert!(!ActingUser::customer("c2").can_view(&order));
    }

    #[test]
    fn token_round_trip_preserves_identity() {
        let auth = service();
        let user = ActingUser::farmer("farmer-1");
        let token = auth.issue_token(&user).unwrap();
        assert_eq!(auth.validate_token(&token).unwrap(), user);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthService::new(
            "a_completely_different_secret_value_for_signing_tokens_9876543210",
            Duration::from_secs(3600),
        );
        let token = other.issue_token(&ActingUser::admin("root")).unwrap();
        assert!(matches!(
            service().validate_token(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
