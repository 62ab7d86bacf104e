//! Stripe-compatible REST client.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::{BuyerId, ProductId, SessionId};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::PaymentError;
use crate::provider::{
    CheckoutRequest, CheckoutSession, PaymentProvider, ProviderSession, SessionState,
};

/// Default Stripe API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

const LIST_PAGE_SIZE: &str = "100";

/// Connection settings for the Stripe API.
#[derive(Clone)]
pub struct StripeConfig {
    pub api_key: SecretString,
    pub api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Payment provider backed by the Stripe Checkout API.
#[derive(Clone)]
pub struct StripePaymentProvider {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentProvider {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        if !response.status().is_success() {
            let status = response.status();
            let body: StripeErrorBody = response.json().await.unwrap_or_default();
            return Err(PaymentError::Provider(format!(
                "Stripe API error ({status}): {}",
                body.error.message.unwrap_or_default()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("Failed to parse Stripe response: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
    created: i64,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: StripeMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct StripeMetadata {
    #[serde(rename = "productId")]
    product_id: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeList {
    data: Vec<StripeCheckoutSession>,
    has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    error: StripeErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeCheckoutSession {
    fn into_provider_session(self) -> ProviderSession {
        let state = match self.status.as_deref() {
            Some("complete") => SessionState::Complete,
            Some("expired") => SessionState::Expired,
            _ => SessionState::Open,
        };
        let paid = matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        );

        ProviderSession {
            id: SessionId::new(self.id),
            state,
            paid,
            created_at: Utc
                .timestamp_opt(self.created, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            buyer_id: self
                .metadata
                .user_id
                .or(self.client_reference_id)
                .map(BuyerId::new),
            product_id: self.metadata.product_id.map(ProductId::new),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentProvider {
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id))]
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let mut params = vec![
            ("mode", "payment".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", request.currency),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount.cents().to_string(),
            ),
            ("line_items[0][price_data][product_data][name]", request.title),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("client_reference_id", request.buyer_id.to_string()),
            ("metadata[productId]", request.product_id.to_string()),
            ("metadata[userId]", request.buyer_id.to_string()),
        ];
        if let Some(description) = request.description.filter(|d| !d.is_empty()) {
            params.push((
                "line_items[0][price_data][product_data][description]",
                description,
            ));
        }

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        let session: StripeCheckoutSession = Self::read_json(response).await?;
        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Provider("Stripe session has no URL".to_string()))?;

        Ok(CheckoutSession {
            id: SessionId::new(session.id),
            url: checkout_url,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn list_sessions(
        &self,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<ProviderSession>, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        let created_gte = created_after.timestamp().to_string();

        let mut sessions = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query = vec![
                ("limit", LIST_PAGE_SIZE.to_string()),
                ("created[gte]", created_gte.clone()),
            ];
            if let Some(cursor) = &starting_after {
                query.push(("starting_after", cursor.clone()));
            }

            let response = self
                .http_client
                .get(&url)
                .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
                .query(&query)
                .send()
                .await?;

            let page: StripeList = Self::read_json(response).await?;
            starting_after = page.data.last().map(|s| s.id.clone());
            let has_more = page.has_more;
            sessions.extend(page.data.into_iter().map(|s| s.into_provider_session()));

            if !has_more || starting_after.is_none() {
                break;
            }
        }

        Ok(sessions)
    }

    #[tracing::instrument(skip(self), fields(%session_id))]
    async fn retrieve_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        let url = format!(
            "{}/v1/checkout/sessions/{}",
            self.config.api_base_url, session_id
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let session: StripeCheckoutSession = Self::read_json(response).await?;
        Ok(Some(session.into_provider_session()))
    }
}
