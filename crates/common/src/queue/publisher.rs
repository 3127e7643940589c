//! Topic publishers
//!
//! Publishing is best-effort: callers decide what a failed publish means for
//! the invoice.

use super::{sqs_client, Message, Queue, QueueConfig, Service};
use crate::config;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Publishes a message on its topic
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<()>;
}

/// Routes each topic to the SQS queue of its consuming service
pub struct SqsPublisher {
    routes: HashMap<Service, Queue>,
}

impl SqsPublisher {
    /// Build from config. Services without a queue URL are unroutable.
    pub async fn from_config(settings: &config::QueueConfig) -> Self {
        let client = sqs_client().await;
        let mut routes = HashMap::new();

        let urls = [
            (Service::Ocr, &settings.ocr_queue_url),
            (Service::TextTreatment, &settings.text_treatment_queue_url),
            (Service::PublicApi, &settings.public_api_queue_url),
        ];

        for (service, url) in urls {
            if let Some(url) = url {
                let queue = Queue::with_client(
                    client.clone(),
                    QueueConfig::from_settings(url.clone(), settings),
                );
                routes.insert(service, queue);
            }
        }

        Self { routes }
    }
}

#[async_trait]
impl Publisher for SqsPublisher {
    #[instrument(skip(self, message), fields(topic = %message.topic(), invoice_id = message.invoice_id()))]
    async fn publish(&self, message: Message) -> Result<()> {
        let service = message.topic().consumer();
        let queue = self.routes.get(&service).ok_or_else(|| AppError::QueueError {
            message: format!("No queue configured for {}", service.as_str()),
        })?;

        let message_id = queue.send(&message).await?;
        crate::metrics::record_message_published(message.topic().as_str());
        debug!(message_id = %message_id, "Published message");

        Ok(())
    }
}

/// Keeps published messages in memory; used by tests and local wiring
#[derive(Default)]
pub struct InMemoryPublisher {
    messages: Mutex<Vec<Message>>,
    failing: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything published so far
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    /// Drain published messages
    pub async fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock().await)
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, message: Message) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::QueueError {
                message: format!("Broker unavailable for {}", message.topic()),
            });
        }
        self.messages.lock().await.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ProcessingError;

    fn error_message(id: i32) -> Message {
        Message::ProcessingError(ProcessingError {
            invoice_id: id,
            error: "boom".to_string(),
        })
    }

    #[tokio::test]
    async fn test_in_memory_publisher_records_and_drains() {
        let publisher = InMemoryPublisher::new();
        publisher.publish(error_message(1)).await.unwrap();
        publisher.publish(error_message(2)).await.unwrap();

        assert_eq!(publisher.messages().await.len(), 2);
        let drained = publisher.take().await;
        assert_eq!(drained[1].invoice_id(), 2);
        assert!(publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_publisher_failing_mode() {
        let publisher = InMemoryPublisher::new();
        publisher.set_failing(true);

        let err = publisher.publish(error_message(1)).await.unwrap_err();
        assert!(matches!(err, AppError::QueueError { .. }));
        assert!(publisher.messages().await.is_empty());

        publisher.set_failing(false);
        assert!(publisher.publish(error_message(1)).await.is_ok());
    }
}
