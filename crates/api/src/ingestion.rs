//! Result ingestion: consumes `invoice_data`, `processing_error` and the
//! legacy `ocr_result` topic on the public API queue.
//!
//! Handlers never fail the consumer. Every outcome ends in a log line and,
//! where possible, a status transition.

use crate::service::InvoiceService;
use async_trait::async_trait;
use invoiceflow_common::{
    errors::{AppError, Result},
    metrics,
    queue::{AnalyzeInvoice, InvoiceDataPayload, Message, MessageHandler, OcrResult, ProcessingError},
    transition, WorkflowEvent,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What became of an `invoice_data` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    Stored,
    /// The invoice was not in a state accepting results, or left it concurrently
    Rejected,
    /// Unknown invoice or unreadable status
    Dropped,
    Failed,
}

pub struct ResultIngestion {
    service: Arc<InvoiceService>,
}

impl ResultIngestion {
    pub fn new(service: Arc<InvoiceService>) -> Self {
        Self { service }
    }

    /// Record the analysis result and complete the invoice.
    ///
    /// A second result for the same invoice is rejected by the state machine,
    /// so at most one data row is written.
    #[instrument(skip(self, payload), fields(invoice_id = payload.invoice_id))]
    pub async fn handle_invoice_data(&self, payload: InvoiceDataPayload) -> DataOutcome {
        let repo = self.service.repository();

        let invoice = match repo.find_invoice(payload.invoice_id).await {
            Ok(Some(invoice)) => invoice,
            Ok(None) => {
                warn!("Dropping invoice_data for unknown invoice");
                return DataOutcome::Dropped;
            }
            Err(e) => {
                error!(error = %e, "Failed to load invoice");
                self.fail(payload.invoice_id, &e.to_string()).await;
                return DataOutcome::Failed;
            }
        };

        let current = match invoice.invoice_status() {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Stored status is not recognised");
                return DataOutcome::Dropped;
            }
        };

        let next = match transition(current, WorkflowEvent::AnalysisReceived) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Rejected invoice_data");
                metrics::record_transition("rejected");
                return DataOutcome::Rejected;
            }
        };

        match repo
            .attach_data(payload.invoice_id, current, next, payload.content, payload.amount)
            .await
        {
            Ok(true) => {
                metrics::record_transition(next.as_str());
                info!(amount = payload.amount, "Invoice data stored, invoice completed");
                DataOutcome::Stored
            }
            Ok(false) => {
                warn!(expected = %current, "Invoice status changed before data could be stored");
                metrics::record_transition("rejected");
                DataOutcome::Rejected
            }
            Err(e) => {
                error!(error = %e, "Failed to persist invoice data");
                self.fail(payload.invoice_id, &e.to_string()).await;
                DataOutcome::Failed
            }
        }
    }

    #[instrument(skip(self, payload), fields(invoice_id = payload.invoice_id))]
    pub async fn handle_processing_error(&self, payload: ProcessingError) {
        warn!(error = %payload.error, "Pipeline reported a processing error");
        self.fail(payload.invoice_id, &payload.error).await;
    }

    /// Forward legacy OCR output to text treatment
    #[instrument(skip(self, payload), fields(invoice_id = payload.invoice_id))]
    pub async fn handle_ocr_result(&self, payload: OcrResult) {
        let message = Message::AnalyzeInvoice(AnalyzeInvoice {
            invoice_id: payload.invoice_id,
            content: payload.content,
        });

        match self.service.publisher().publish(message).await {
            Ok(()) => info!("Relayed OCR result to text treatment"),
            Err(e) => {
                error!(error = %e, "Failed to relay OCR result");
                self.fail(payload.invoice_id, &e.to_string()).await;
            }
        }
    }

    /// Move the invoice to ERROR, logging instead of propagating
    async fn fail(&self, invoice_id: i32, reason: &str) {
        match self.service.apply_event(invoice_id, WorkflowEvent::Failed).await {
            Ok(_) => info!(invoice_id, reason, "Invoice marked as failed"),
            Err(AppError::InvoiceNotFound { .. }) => {
                warn!(invoice_id, "Cannot mark unknown invoice as failed")
            }
            Err(e) => error!(invoice_id, error = %e, "Failed to mark invoice as failed"),
        }
    }
}

#[async_trait]
impl MessageHandler for ResultIngestion {
    fn name(&self) -> &'static str {
        "public_api"
    }

    async fn handle(&self, message: Message) -> Result<()> {
        match message {
            Message::InvoiceData(payload) => {
                self.handle_invoice_data(payload).await;
            }
            Message::ProcessingError(payload) => self.handle_processing_error(payload).await,
            Message::OcrResult(payload) => self.handle_ocr_result(payload).await,
            other => warn!(topic = %other.topic(), "Ignoring message not meant for the public API"),
        }
        Ok(())
    }
}
