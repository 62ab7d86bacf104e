//! Payment provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use payments::SIGNATURE_HEADER;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /webhooks/payment: verifies and applies a provider notification.
///
/// Takes the body as raw bytes: the signature covers the exact payload.
pub async fn payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state.webhooks.process(&body, signature).await?;

    Ok(Json(WebhookAck { received: true }))
}
