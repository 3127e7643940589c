//! Message contracts exchanged between the three services
//!
//! Every message travels in a `{"pattern": <topic>, "data": <payload>}`
//! envelope. Payload field names are part of the wire contract.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployable units taking part in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    PublicApi,
    Ocr,
    TextTreatment,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::PublicApi => "public_api",
            Service::Ocr => "ocr",
            Service::TextTreatment => "text_treatment",
        }
    }
}

/// Named topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ProcessInvoice,
    AnalyzeInvoice,
    InvoiceData,
    ProcessingError,
    OcrResult,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ProcessInvoice => "process_invoice",
            Topic::AnalyzeInvoice => "analyze_invoice",
            Topic::InvoiceData => "invoice_data",
            Topic::ProcessingError => "processing_error",
            Topic::OcrResult => "ocr_result",
        }
    }

    /// The service whose queue receives this topic
    pub fn consumer(&self) -> Service {
        match self {
            Topic::ProcessInvoice => Service::Ocr,
            Topic::AnalyzeInvoice => Service::TextTreatment,
            Topic::InvoiceData | Topic::ProcessingError | Topic::OcrResult => Service::PublicApi,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded file handed from the public API to the OCR service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInvoice {
    pub invoice_id: i32,
    /// Base64 of the raw file bytes
    pub content: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

impl ProcessInvoice {
    pub fn new(invoice_id: i32, file: &[u8], file_name: impl Into<String>) -> Self {
        Self {
            invoice_id,
            content: STANDARD.encode(file),
            file_name: file_name.into(),
        }
    }

    pub fn decode_content(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.content.as_bytes())
    }
}

/// Extracted text handed to the text treatment service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeInvoice {
    pub invoice_id: i32,
    pub content: String,
}

/// Structured analysis result returned to the public API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDataPayload {
    pub invoice_id: i32,
    pub content: String,
    pub amount: f64,
}

/// Unrecoverable stage failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub invoice_id: i32,
    pub error: String,
}

/// Legacy OCR output that the public API relays to text treatment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub invoice_id: i32,
    pub content: String,
}

/// Envelope of every message on the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", content = "data")]
pub enum Message {
    #[serde(rename = "process_invoice")]
    ProcessInvoice(ProcessInvoice),
    #[serde(rename = "analyze_invoice")]
    AnalyzeInvoice(AnalyzeInvoice),
    #[serde(rename = "invoice_data")]
    InvoiceData(InvoiceDataPayload),
    #[serde(rename = "processing_error")]
    ProcessingError(ProcessingError),
    #[serde(rename = "ocr_result")]
    OcrResult(OcrResult),
}

impl Message {
    pub fn topic(&self) -> Topic {
        match self {
            Message::ProcessInvoice(_) => Topic::ProcessInvoice,
            Message::AnalyzeInvoice(_) => Topic::AnalyzeInvoice,
            Message::InvoiceData(_) => Topic::InvoiceData,
            Message::ProcessingError(_) => Topic::ProcessingError,
            Message::OcrResult(_) => Topic::OcrResult,
        }
    }

    pub fn invoice_id(&self) -> i32 {
        match self {
            Message::ProcessInvoice(m) => m.invoice_id,
            Message::AnalyzeInvoice(m) => m.invoice_id,
            Message::InvoiceData(m) => m.invoice_id,
            Message::ProcessingError(m) => m.invoice_id,
            Message::OcrResult(m) => m.invoice_id,
        }
    }
}
