//! InvoiceFlow Text Treatment Service
//!
//! Long-polls the text treatment queue:
//! 1. Receives `analyze_invoice`
//! 2. Requests a schema-constrained completion
//! 3. Publishes `invoice_data`

use invoiceflow_common::{
    config::AppConfig,
    errors::AppError,
    metrics,
    queue::{run_consumer, Queue, QueueConfig, SqsPublisher},
    shutdown_signal, telemetry, VERSION,
};
use invoiceflow_text_treatment::{
    AnalysisHandler, FallbackAnalysisPolicy, InvoiceAnalyzer, OpenAiCompatibleAnalyzer,
    TextAnalyzer,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| AppError::Configuration {
        message: e.to_string(),
    })?;

    let _telemetry = telemetry::init_tracing(&config.observability)?;

    info!("Starting InvoiceFlow Text Treatment Service v{}", VERSION);

    if config.observability.metrics_port > 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    if config.analysis.api_key.is_none() {
        warn!("No analysis API key configured, requests may be rejected");
    }
    let client = OpenAiCompatibleAnalyzer::from_config(&config.analysis)?;
    info!(model = %client.model_name(), base_url = %config.analysis.base_url, "Analyzer initialized");

    let url = config
        .queue
        .text_treatment_queue_url
        .clone()
        .ok_or_else(|| AppError::Configuration {
            message: "APP__QUEUE__TEXT_TREATMENT_QUEUE_URL must be set".to_string(),
        })?;
    let queue = Queue::new(QueueConfig::from_settings(url, &config.queue)).await?;
    let publisher = Arc::new(SqsPublisher::from_config(&config.queue).await);

    let analyzer = InvoiceAnalyzer::new(Arc::new(client), FallbackAnalysisPolicy::default());
    let handler = AnalysisHandler::new(analyzer, publisher);

    run_consumer(&queue, &handler, shutdown_signal()).await;

    info!("Text treatment service shut down");
    Ok(())
}
