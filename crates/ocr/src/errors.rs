//! OCR service error types

use invoiceflow_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Unknown file format")]
    UnknownFormat,

    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: &'static str },

    #[error("Invalid base64 content: {0}")]
    InvalidContent(#[from] base64::DecodeError),

    #[error("PDF parse error: {message}")]
    PdfParse { message: String },

    #[error("Text recognition failed: {message}")]
    Recognition { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl OcrError {
    /// Stable code carried in `processing_error` payloads and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            OcrError::UnknownFormat => "UNKNOWN_FORMAT",
            OcrError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            OcrError::InvalidContent(_) => "INVALID_INPUT",
            OcrError::PdfParse { .. } | OcrError::Recognition { .. } => "EXTRACTION_FAILED",
            OcrError::Io(_) => "IO_ERROR",
            OcrError::App(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OcrError>;
