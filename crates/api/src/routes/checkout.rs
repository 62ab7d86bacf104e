//! Checkout session endpoint.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthenticatedBuyer;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub product_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub url: String,
    pub order_id: String,
}

/// POST /checkout/session: opens a payment session for one product.
#[tracing::instrument(skip_all, fields(buyer_id = %buyer.0))]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(buyer): Extension<AuthenticatedBuyer>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::Validation(e.body_text()))?;

    let product_id = req
        .product_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("productId is required".to_string()))?;

    let started = state
        .checkout
        .start_checkout(buyer.0, ProductId::new(product_id))
        .await?;

    Ok(Json(CreateSessionResponse {
        url: started.url,
        order_id: started.order.id.to_string(),
    }))
}
