//! HTTP API server for paid digital-goods checkout and downloads.
//!
//! Provides REST endpoints for opening checkout sessions, receiving payment
//! provider webhooks, and issuing and redeeming download tokens, with
//! structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use downloads::{AssetStorage, DownloadService, TokenIssuer};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{OrderStore, ProductStore};
use payments::{CheckoutService, PaymentEventProcessor, PaymentProvider, RedirectUrls, WebhookVerifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::BearerAuth;
use config::Config;

/// External collaborators the services are built on.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn ProductStore>,
    pub storage: Arc<dyn AssetStorage>,
    pub provider: Option<Arc<dyn PaymentProvider>>,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub checkout: CheckoutService,
    pub webhooks: PaymentEventProcessor,
    pub downloads: DownloadService,
    pub auth: BearerAuth,
    pub environment: String,
}

impl AppState {
    /// Wires the services from configuration and backends.
    pub fn new(config: &Config, backends: Backends) -> Self {
        let checkout = CheckoutService::new(
            backends.provider,
            config.client_url.as_deref().map(RedirectUrls::for_client),
            backends.products.clone(),
            backends.orders.clone(),
            config.upstream_timeout,
        );

        let webhooks = PaymentEventProcessor::new(
            config
                .payment_webhook_secret
                .clone()
                .map(WebhookVerifier::new),
            backends.orders.clone(),
            config.transition_policy,
        );

        let downloads = DownloadService::new(
            backends.orders,
            backends.products,
            config
                .download_token_secret
                .as_ref()
                .map(|secret| TokenIssuer::new(secret, config.download_token_ttl)),
            backends.storage,
            config.upstream_timeout,
        );

        Self {
            checkout,
            webhooks,
            downloads,
            auth: BearerAuth::new(&config.auth_jwt_secret),
            environment: config.environment.clone(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let buyer_routes = Router::new()
        .route("/checkout/session", post(routes::checkout::create_session))
        .route("/downloads/{order_id}", get(routes::downloads::issue_token))
        .route("/downloads/file/{token}", get(routes::downloads::fetch_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_buyer,
        ));

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhooks/payment", post(routes::webhooks::payment))
        .merge(buyer_routes)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
