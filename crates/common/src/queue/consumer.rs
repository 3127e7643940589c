//! Long-poll consumer loop shared by every service
//!
//! Messages are deleted once handled, whatever the outcome. Handlers own
//! failure reporting (publishing `processing_error` or moving the invoice
//! to ERROR), so redelivery would only repeat a decision already taken.

use super::{Message, Queue, SqsMessage};
use crate::errors::Result;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Handles one decoded message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    async fn handle(&self, message: Message) -> Result<()>;
}

/// Decode a raw queue body. Unknown patterns and malformed payloads yield `None`.
pub(crate) fn decode_body(body: Option<&str>) -> Option<Message> {
    let body = match body {
        Some(body) => body,
        None => {
            warn!("Dropping message without body");
            return None;
        }
    };

    match serde_json::from_str::<Message>(body) {
        Ok(message) => Some(message),
        Err(e) => {
            let pattern = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("pattern").and_then(|p| p.as_str()).map(String::from))
                .unwrap_or_else(|| "<none>".to_string());
            warn!(pattern = %pattern, error = %e, "Dropping undecodable message");
            None
        }
    }
}

/// Decode and dispatch one queue message
#[instrument(skip_all, fields(handler = handler.name()))]
pub(crate) async fn dispatch<H: MessageHandler + ?Sized>(handler: &H, raw: &SqsMessage) {
    let Some(message) = decode_body(raw.body.as_deref()) else {
        crate::metrics::record_message_dropped(handler.name());
        return;
    };

    let topic = message.topic();
    let invoice_id = message.invoice_id();
    let start = Instant::now();

    match handler.handle(message).await {
        Ok(()) => {
            crate::metrics::record_message_handled(topic.as_str(), true, start.elapsed().as_secs_f64());
        }
        Err(e) => {
            crate::metrics::record_message_handled(topic.as_str(), false, start.elapsed().as_secs_f64());
            error!(topic = %topic, invoice_id, error = %e, "Message handler failed");
        }
    }
}

/// Poll `queue` and feed every message to `handler` until `shutdown` resolves
pub async fn run_consumer<H, F>(queue: &Queue, handler: &H, shutdown: F)
where
    H: MessageHandler + ?Sized,
    F: Future<Output = ()>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(30),
        max_elapsed_time: None,
        ..Default::default()
    };

    tokio::pin!(shutdown);
    info!(handler = handler.name(), queue = %queue.url(), "Consumer started");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(handler = handler.name(), "Shutdown signal received");
                break;
            }
            result = queue.receive() => {
                match result {
                    Ok(messages) => {
                        backoff.reset();
                        for raw in messages {
                            dispatch(handler, &raw).await;

                            if let Some(receipt_handle) = raw.receipt_handle.as_deref() {
                                if let Err(e) = queue.delete(receipt_handle).await {
                                    error!(error = %e, "Failed to delete message");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let wait = backoff.next_backoff().unwrap_or(backoff.max_interval);
                        error!(error = %e, retry_in_ms = wait.as_millis() as u64, "Failed to receive messages from queue");
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
    }

    info!(handler = handler.name(), "Consumer stopped");
}
