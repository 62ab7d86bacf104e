//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::config::{Config, LogFormat, StorageBackend};
use api::{AppState, Backends};
use downloads::{AssetStorage, LocalAssetStorage, S3AssetStorage};
use order_store::{InMemoryOrderStore, InMemoryProductStore, OrderStore, PostgresStore, ProductStore};
use payments::{PaymentProvider, Reconciler, StripeConfig, StripePaymentProvider};
use secrecy::ExposeSecret;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn build_backends(config: &Config) -> Result<Backends, Box<dyn Error>> {
    let (orders, products): (Arc<dyn OrderStore>, Arc<dyn ProductStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url.expose_secret())
                    .await?;
                let store = PostgresStore::new(pool);
                store.run_migrations().await?;
                tracing::info!("using PostgreSQL order store");
                (Arc::new(store.clone()), Arc::new(store))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                (
                    Arc::new(InMemoryOrderStore::new()),
                    Arc::new(InMemoryProductStore::new()),
                )
            }
        };

    let storage: Arc<dyn AssetStorage> = match &config.storage {
        StorageBackend::Local { root } => {
            let storage = LocalAssetStorage::new(root)?;
            tracing::info!(root = %storage.root().display(), "serving assets from local storage");
            Arc::new(storage)
        }
        StorageBackend::S3 { bucket } => {
            tracing::info!(%bucket, "serving assets through presigned S3 URLs");
            Arc::new(S3AssetStorage::from_env(bucket.clone(), config.signed_url_ttl).await)
        }
    };

    let provider = config.payment_api_key.clone().map(|key| {
        let stripe = StripeConfig::new(key).with_base_url(config.payment_api_base_url.clone());
        Arc::new(StripePaymentProvider::new(stripe)) as Arc<dyn PaymentProvider>
    });

    if provider.is_none() {
        tracing::warn!("PAYMENT_API_KEY not set, checkout is disabled");
    }
    if config.client_url.is_none() {
        tracing::warn!("CLIENT_URL not set, checkout is disabled");
    }
    if config.payment_webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, all webhooks will be refused");
    }
    if config.download_token_secret.is_none() {
        tracing::warn!("DOWNLOAD_TOKEN_SECRET not set, downloads are disabled");
    }

    Ok(Backends {
        orders,
        products,
        storage,
        provider,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Load configuration and initialize tracing
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Build backends and application state
    let backends = build_backends(&config).await?;
    let reconciler = match (config.reconcile_interval, backends.provider.clone()) {
        (Some(interval), Some(provider)) => {
            let reconciler = Reconciler::new(
                provider,
                backends.orders.clone(),
                config.transition_policy,
                chrono::Duration::from_std(config.reconcile_lookback)?,
                config.upstream_timeout,
            );
            tracing::info!(interval_secs = interval.as_secs(), "starting reconciliation task");
            Some(reconciler.spawn(interval))
        }
        _ => None,
    };
    let state = Arc::new(AppState::new(&config, backends));

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, environment = %config.environment, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = reconciler {
        task.abort();
    }
    tracing::info!("server shut down gracefully");
    Ok(())
}
