//! `analyze_invoice` handler

use crate::analysis::InvoiceAnalyzer;
use async_trait::async_trait;
use invoiceflow_common::queue::{
    AnalyzeInvoice, InvoiceDataPayload, Message, MessageHandler, Publisher,
};
use invoiceflow_common::Result;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct AnalysisHandler {
    analyzer: InvoiceAnalyzer,
    publisher: Arc<dyn Publisher>,
}

impl AnalysisHandler {
    pub fn new(analyzer: InvoiceAnalyzer, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            analyzer,
            publisher,
        }
    }

    /// Publishes `invoice_data` for real and fallback analyses alike
    #[instrument(skip(self, msg), fields(invoice_id = msg.invoice_id))]
    pub async fn handle_analyze_invoice(&self, msg: AnalyzeInvoice) {
        let analysis = self.analyzer.analyze(msg.invoice_id, &msg.content).await;

        let payload = Message::InvoiceData(InvoiceDataPayload {
            invoice_id: msg.invoice_id,
            content: analysis.content,
            amount: analysis.amount,
        });

        match self.publisher.publish(payload).await {
            Ok(()) => info!("Published invoice data"),
            Err(e) => error!(error = %e, "Failed to publish invoice data"),
        }
    }
}

#[async_trait]
impl MessageHandler for AnalysisHandler {
    fn name(&self) -> &'static str {
        "text_treatment"
    }

    async fn handle(&self, message: Message) -> Result<()> {
        match message {
            Message::AnalyzeInvoice(msg) => self.handle_analyze_invoice(msg).await,
            other => warn!(topic = %other.topic(), "Ignoring message not meant for text treatment"),
        }
        Ok(())
    }
}
