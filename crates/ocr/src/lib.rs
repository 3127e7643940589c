//! InvoiceFlow OCR Service
//!
//! Consumes `process_invoice`, detects the file format, extracts text and
//! publishes `analyze_invoice`, or `processing_error` when the file cannot
//! be read at all.

pub mod errors;
pub mod extraction;
pub mod format;
pub mod handler;
pub mod pdf;
pub mod recognizer;

pub use errors::OcrError;
pub use extraction::{DegradedExtractionPolicy, Extraction, TextExtractor};
pub use format::{detect_format, FileFormat};
pub use handler::OcrHandler;
pub use recognizer::{TesseractCli, TextRecognizer};
