//! SQS Queue integration for the invoice pipeline
//!
//! Provides:
//! - SQS client wrapper
//! - Message contracts and envelope serialization
//! - Best-effort publishers (SQS and in-memory)
//! - Long-poll consumer loop shared by all services

mod consumer;
mod messages;
mod publisher;

pub use consumer::{run_consumer, MessageHandler};
pub use messages::{
    AnalyzeInvoice, InvoiceDataPayload, Message, OcrResult, ProcessInvoice, ProcessingError,
    Service, Topic,
};
pub use publisher::{InMemoryPublisher, Publisher, SqsPublisher};

use crate::config;
use crate::errors::{AppError, Result};
use aws_sdk_sqs::types::Message as SqsMessage;
use aws_sdk_sqs::Client as SqsClient;
use serde::Serialize;
use tracing::debug;

/// SQS queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub url: String,
    /// Visibility timeout in seconds
    pub visibility_timeout: i32,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            visibility_timeout: 300,
            wait_time_seconds: 20,
            max_messages: 10,
        }
    }
}

impl QueueConfig {
    /// Build from the shared queue settings for one queue URL
    pub fn from_settings(url: String, settings: &config::QueueConfig) -> Self {
        Self {
            url,
            visibility_timeout: settings.visibility_timeout_secs,
            wait_time_seconds: settings.poll_timeout_secs,
            // SQS caps a single receive at 10 messages
            max_messages: settings.batch_size.clamp(1, 10),
        }
    }
}

/// Load the default AWS SDK configuration for SQS
pub async fn sqs_client() -> SqsClient {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    SqsClient::new(&aws_config)
}

/// SQS Queue client wrapper
pub struct Queue {
    client: SqsClient,
    config: QueueConfig,
}

impl Queue {
    /// Create a new queue client
    pub async fn new(config: QueueConfig) -> Result<Self> {
        Ok(Self {
            client: sqs_client().await,
            config,
        })
    }

    /// Create with existing AWS client
    pub fn with_client(client: SqsClient, config: QueueConfig) -> Self {
        Self { client, config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Send a message to the queue
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<String> {
        let body = serde_json::to_string(message).map_err(|e| AppError::QueueError {
            message: format!("Failed to serialize message: {}", e),
        })?;

        let result = self
            .client
            .send_message()
            .queue_url(&self.config.url)
            .message_body(&body)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to send message: {}", e),
            })?;

        let message_id = result.message_id.unwrap_or_default();
        debug!(message_id = %message_id, "Message sent to queue");

        Ok(message_id)
    }

    /// Receive messages from the queue
    pub async fn receive(&self) -> Result<Vec<SqsMessage>> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.config.url)
            .max_number_of_messages(self.config.max_messages)
            .visibility_timeout(self.config.visibility_timeout)
            .wait_time_seconds(self.config.wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let messages = result.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages from queue");

        Ok(messages)
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_from_settings() {
        let settings = config::QueueConfig {
            batch_size: 25,
            poll_timeout_secs: 5,
            visibility_timeout_secs: 60,
            ..Default::default()
        };

        let config = QueueConfig::from_settings("https://sqs/ocr".to_string(), &settings);

        assert_eq!(config.url, "https://sqs/ocr");
        assert_eq!(config.max_messages, 10);
        assert_eq!(config.wait_time_seconds, 5);
        assert_eq!(config.visibility_timeout, 60);
    }
}
