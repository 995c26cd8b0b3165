use crate::{errors::ServiceError, AppState};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Claims carried by the bearer tokens issued by the auth collaborator.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the buyer's id
    pub sub: String,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expiration, unix seconds
    pub exp: i64,
}

/// Authenticated buyer identity, extracted from the `Authorization: Bearer`
/// header. Every cart and order operation receives this explicitly; there is
/// no ambient current-user state.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedBuyer {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedBuyer
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?
            .trim();

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(app_state.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?
        .claims;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("invalid token subject".to_string()))?;

        Ok(AuthenticatedBuyer { id })
    }
}

/// Issues a short-lived HS256 token for the given buyer. The production
/// issuer lives in the auth service; this exists for tooling and tests.
pub fn issue_token(buyer_id: Uuid, secret: &str, ttl: Duration) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: buyer_id.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}
