//! InvoiceFlow OCR Service
//!
//! Long-polls the OCR queue:
//! 1. Receives `process_invoice`
//! 2. Detects the format and extracts text
//! 3. Publishes `analyze_invoice` or `processing_error`

use invoiceflow_common::{
    config::AppConfig,
    errors::AppError,
    metrics,
    queue::{run_consumer, Queue, QueueConfig, SqsPublisher},
    shutdown_signal, telemetry, VERSION,
};
use invoiceflow_ocr::{DegradedExtractionPolicy, OcrHandler, TesseractCli, TextExtractor};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| AppError::Configuration {
        message: e.to_string(),
    })?;

    let _telemetry = telemetry::init_tracing(&config.observability)?;

    info!("Starting InvoiceFlow OCR Service v{}", VERSION);

    if config.observability.metrics_port > 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    let url = config
        .queue
        .ocr_queue_url
        .clone()
        .ok_or_else(|| AppError::Configuration {
            message: "APP__QUEUE__OCR_QUEUE_URL must be set".to_string(),
        })?;
    let queue = Queue::new(QueueConfig::from_settings(url, &config.queue)).await?;
    let publisher = Arc::new(SqsPublisher::from_config(&config.queue).await);

    let extractor = TextExtractor::new(
        Arc::new(TesseractCli::from_config(&config.ocr)),
        DegradedExtractionPolicy::from_config(&config.ocr),
    );
    let handler = OcrHandler::new(extractor, publisher);

    info!(language = %config.ocr.language, "OCR service ready");
    run_consumer(&queue, &handler, shutdown_signal()).await;

    info!("OCR service shut down");
    Ok(())
}
