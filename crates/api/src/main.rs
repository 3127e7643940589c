//! InvoiceFlow Public API
//!
//! Serves the HTTP API and, when a queue is configured, consumes the
//! `invoice_data`, `processing_error` and `ocr_result` topics.

use invoiceflow_api::{create_router, AppState, InvoiceService, ResultIngestion};
use invoiceflow_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, SeaOrmInvoiceRepository},
    errors::AppError,
    metrics,
    queue::{run_consumer, Queue, QueueConfig, SqsPublisher},
    shutdown_signal,
    storage::S3BlobStore,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| AppError::Configuration {
        message: e.to_string(),
    })?;
    let config = Arc::new(config);

    let _telemetry = telemetry::init_tracing(&config.observability)?;

    info!("Starting InvoiceFlow Public API v{}", invoiceflow_common::VERSION);

    if config.observability.metrics_port > 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    let secret = config
        .auth
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::Configuration {
            message: "APP__AUTH__JWT_SECRET must be set".to_string(),
        })?;
    let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

    let db = DbPool::new(&config.database).await?;
    let repo = Arc::new(SeaOrmInvoiceRepository::new(db));
    let blobs = Arc::new(S3BlobStore::from_config(&config.storage).await);
    let publisher = Arc::new(SqsPublisher::from_config(&config.queue).await);

    let service = Arc::new(InvoiceService::new(
        repo,
        blobs,
        publisher,
        config.server.max_upload_bytes,
    ));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let consumer = match config.queue.public_api_queue_url.clone() {
        Some(url) => {
            let queue = Queue::new(QueueConfig::from_settings(url, &config.queue)).await?;
            let ingestion = ResultIngestion::new(service.clone());
            Some(tokio::spawn(async move {
                run_consumer(&queue, &ingestion, async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await;
            }))
        }
        None => {
            warn!("No public API queue configured, results will not be ingested");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        service,
        jwt,
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| AppError::Configuration {
            message: format!("Invalid listen address: {}", e),
        })?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(consumer) = consumer {
        if let Err(e) = consumer.await {
            error!(error = %e, "Result consumer task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
