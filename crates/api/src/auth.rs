//! Bearer token authentication for buyer-facing routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use common::BuyerId;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Claims expected in a buyer's bearer token.
#[derive(Debug, Deserialize)]
struct BearerClaims {
    sub: String,
}

/// Authenticated buyer, inserted into request extensions by [`require_buyer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedBuyer(pub BuyerId);

/// Verifies HS256 bearer tokens issued by the identity service.
#[derive(Clone)]
pub struct BearerAuth {
    decoding: DecodingKey,
    validation: Validation,
}

impl BearerAuth {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Resolves the buyer from an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<BuyerId, ApiError> {
        let token = authorization
            .ok_or_else(|| ApiError::Authentication("Missing Authorization header".to_string()))?
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Authentication("Invalid Authorization format".to_string()))?;

        let data = decode::<BearerClaims>(token.trim(), &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                ApiError::Authentication("Invalid or expired token".to_string())
            })?;

        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::Authentication("Invalid or expired token".to_string()));
        }
        Ok(BuyerId::new(data.claims.sub))
    }
}

/// Middleware that rejects unauthenticated requests and records the buyer.
pub async fn require_buyer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let buyer = state.auth.authenticate(authorization)?;
    request.extensions_mut().insert(AuthenticatedBuyer(buyer));

    Ok(next.run(request).await)
}
