//! `process_invoice` handler

use crate::errors::{OcrError, Result};
use crate::extraction::TextExtractor;
use crate::format::detect_format;
use async_trait::async_trait;
use invoiceflow_common::queue::{
    AnalyzeInvoice, Message, MessageHandler, ProcessInvoice, ProcessingError, Publisher,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct OcrHandler {
    extractor: TextExtractor,
    publisher: Arc<dyn Publisher>,
}

impl OcrHandler {
    pub fn new(extractor: TextExtractor, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            extractor,
            publisher,
        }
    }

    /// Decode, detect and extract. Only detection and decoding can fail.
    async fn extract(&self, msg: &ProcessInvoice) -> Result<String> {
        let bytes = msg.decode_content()?;
        let format = detect_format(&bytes)?;

        info!(format = format.as_str(), size = bytes.len(), "Detected invoice format");

        let extraction = self.extractor.extract_text(&bytes, format).await;
        if let Some(reason) = extraction.degraded {
            warn!(reason = reason.as_str(), "Forwarding placeholder text");
        }
        Ok(extraction.text)
    }

    /// Forward extracted text to analysis, or report the failure upstream.
    /// Never fails: the outcome is always a published message or a log line.
    #[instrument(skip(self, msg), fields(invoice_id = msg.invoice_id, file_name = %msg.file_name))]
    pub async fn handle_process_invoice(&self, msg: ProcessInvoice) {
        let outcome = match self.extract(&msg).await {
            Ok(content) => Message::AnalyzeInvoice(AnalyzeInvoice {
                invoice_id: msg.invoice_id,
                content,
            }),
            Err(e) => {
                warn!(code = e.code(), error = %e, "Rejected invoice file");
                Message::ProcessingError(ProcessingError {
                    invoice_id: msg.invoice_id,
                    error: e.to_string(),
                })
            }
        };

        let topic = outcome.topic();
        match self.publisher.publish(outcome).await {
            Ok(()) => info!(topic = %topic, "Published OCR outcome"),
            Err(e) => error!(topic = %topic, error = %OcrError::from(e), "Failed to publish OCR outcome"),
        }
    }
}

#[async_trait]
impl MessageHandler for OcrHandler {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn handle(&self, message: Message) -> invoiceflow_common::Result<()> {
        match message {
            Message::ProcessInvoice(msg) => self.handle_process_invoice(msg).await,
            other => warn!(topic = %other.topic(), "Ignoring message not meant for OCR"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{DegradedExtractionPolicy, IMAGE_PLACEHOLDER};
    use crate::recognizer::TextRecognizer;
    use invoiceflow_common::queue::InMemoryPublisher;

    struct StubRecognizer;

    #[async_trait]
    impl TextRecognizer for StubRecognizer {
        async fn recognize(&self, _image: &[u8]) -> Result<String> {
            Ok("FACTURE N°12 Total TTC 250,00 EUR".to_string())
        }
    }

    struct FailingRecognizer;

    #[async_trait]
    impl TextRecognizer for FailingRecognizer {
        async fn recognize(&self, _image: &[u8]) -> Result<String> {
            Err(OcrError::Recognition {
                message: "unreadable".to_string(),
            })
        }
    }

    fn handler(recognizer: Arc<dyn TextRecognizer>) -> (OcrHandler, Arc<InMemoryPublisher>) {
        let publisher = Arc::new(InMemoryPublisher::new());
        let extractor = TextExtractor::new(recognizer, DegradedExtractionPolicy::default());
        (OcrHandler::new(extractor, publisher.clone()), publisher)
    }

    fn png() -> Vec<u8> {
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47];
        bytes.extend_from_slice(&[0u8; 100]);
        bytes
    }

    #[tokio::test]
    async fn test_image_is_forwarded_to_analysis() {
        let (handler, publisher) = handler(Arc::new(StubRecognizer));

        handler
            .handle(Message::ProcessInvoice(ProcessInvoice::new(456, &png(), "scan.png")))
            .await
            .unwrap();

        assert_eq!(
            publisher.take().await,
            vec![Message::AnalyzeInvoice(AnalyzeInvoice {
                invoice_id: 456,
                content: "FACTURE N°12 Total TTC 250,00 EUR".to_string(),
            })]
        );
    }

    #[tokio::test]
    async fn test_recognition_failure_still_forwards_placeholder() {
        let (handler, publisher) = handler(Arc::new(FailingRecognizer));

        handler
            .handle(Message::ProcessInvoice(ProcessInvoice::new(999, &png(), "blurry.png")))
            .await
            .unwrap();

        let published = publisher.take().await;
        assert_eq!(published.len(), 1);
        match &published[0] {
            Message::AnalyzeInvoice(msg) => assert_eq!(msg.content, IMAGE_PLACEHOLDER),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_too_small_file_reports_processing_error() {
        let (handler, publisher) = handler(Arc::new(StubRecognizer));

        handler
            .handle(Message::ProcessInvoice(ProcessInvoice::new(111, &[0x25, 0x50], "tiny.pdf")))
            .await
            .unwrap();

        let published = publisher.take().await;
        assert_eq!(published.len(), 1);
        assert!(matches!(
            &published[0],
            Message::ProcessingError(ProcessingError { invoice_id: 111, .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_format_reports_processing_error() {
        let (handler, publisher) = handler(Arc::new(StubRecognizer));
        let docx = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00];

        handler
            .handle(Message::ProcessInvoice(ProcessInvoice::new(7, &docx, "facture.docx")))
            .await
            .unwrap();

        match &publisher.take().await[..] {
            [Message::ProcessingError(err)] => {
                assert_eq!(err.invoice_id, 7);
                assert!(err.error.contains("zip"));
            }
            other => panic!("unexpected messages {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_base64_reports_processing_error() {
        let (handler, publisher) = handler(Arc::new(StubRecognizer));
        let msg = ProcessInvoice {
            invoice_id: 8,
            content: "***not base64***".to_string(),
            file_name: "x.pdf".to_string(),
        };

        handler.handle(Message::ProcessInvoice(msg)).await.unwrap();

        assert!(matches!(
            &publisher.take().await[..],
            [Message::ProcessingError(_)]
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_handler() {
        let (handler, publisher) = handler(Arc::new(StubRecognizer));
        publisher.set_failing(true);

        let result = handler
            .handle(Message::ProcessInvoice(ProcessInvoice::new(1, &png(), "a.png")))
            .await;

        assert!(result.is_ok());
    }
}
