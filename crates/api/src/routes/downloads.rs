//! Download token and file endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use common::OrderId;
use downloads::AssetDelivery;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::AppState;
use crate::auth::AuthenticatedBuyer;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

/// GET /downloads/{order_id}: issues a download token for a paid order.
#[tracing::instrument(skip_all, fields(buyer_id = %buyer.0, %order_id))]
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Extension(buyer): Extension<AuthenticatedBuyer>,
    Path(order_id): Path<String>,
) -> Result<Json<TokenResponse>, ApiError> {
    let order_id = OrderId::parse(&order_id)
        .map_err(|_| ApiError::Validation("Invalid order id".to_string()))?;

    let issued = state.downloads.issue_token(&buyer.0, order_id).await?;

    Ok(Json(TokenResponse {
        token: issued.token,
        expires_in: issued.expires_in.as_secs(),
    }))
}

/// GET /downloads/file/{token}: redeems a download token.
#[tracing::instrument(skip_all, fields(buyer_id = %buyer.0))]
pub async fn fetch_file(
    State(state): State<Arc<AppState>>,
    Extension(buyer): Extension<AuthenticatedBuyer>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    match state.downloads.redeem(&buyer.0, &token).await? {
        AssetDelivery::File {
            file,
            file_name,
            size,
        } => {
            let disposition = HeaderValue::from_str(&format!(
                "attachment; filename=\"{}\"",
                sanitize_file_name(&file_name)
            ))
            .map_err(|e| ApiError::Internal(e.to_string()))?;

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
                    (header::CONTENT_DISPOSITION, disposition),
                    (header::CONTENT_LENGTH, HeaderValue::from(size)),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response())
        }
        AssetDelivery::SignedUrl { url, expires_in } => Ok(Json(SignedUrlResponse {
            url,
            expires_in: expires_in.as_secs(),
        })
        .into_response()),
    }
}

/// Keeps a file name safe to embed in a quoted header parameter.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
