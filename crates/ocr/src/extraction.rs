//! Text extraction with placeholder substitution
//!
//! Extraction never blocks the pipeline: a failed or near-empty extraction
//! is replaced by a fixed placeholder and reported as degraded.

use crate::errors::OcrError;
use crate::format::FileFormat;
use crate::pdf::extract_text_from_pdf;
use crate::recognizer::TextRecognizer;
use invoiceflow_common::config::OcrConfig;
use invoiceflow_common::metrics;
use std::sync::Arc;
use tracing::{instrument, warn};

pub const PDF_PLACEHOLDER: &str =
    "Document PDF sans texte exploitable: aucun contenu n'a pu être extrait de la facture.";
pub const IMAGE_PLACEHOLDER: &str =
    "Image sans texte exploitable: aucun contenu n'a pu être reconnu sur la facture.";

/// Why an extraction was replaced by a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    Failed,
    TooShort,
}

impl DegradedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedReason::Failed => "failed",
            DegradedReason::TooShort => "too_short",
        }
    }
}

/// Extracted text, possibly a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub degraded: Option<DegradedReason>,
}

impl Extraction {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DegradedExtractionPolicy {
    /// Output with fewer non-whitespace characters is replaced
    pub min_text_chars: usize,
    pub pdf_placeholder: String,
    pub image_placeholder: String,
}

impl Default for DegradedExtractionPolicy {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            pdf_placeholder: PDF_PLACEHOLDER.to_string(),
            image_placeholder: IMAGE_PLACEHOLDER.to_string(),
        }
    }
}

impl DegradedExtractionPolicy {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            min_text_chars: config.min_text_chars,
            ..Self::default()
        }
    }

    fn placeholder(&self, format: FileFormat) -> &str {
        if format.is_image() {
            &self.image_placeholder
        } else {
            &self.pdf_placeholder
        }
    }

    /// Keep `raw` if it carries enough text, otherwise substitute the placeholder
    pub fn apply(&self, format: FileFormat, raw: Result<String, OcrError>) -> Extraction {
        let reason = match raw {
            Ok(text) => {
                let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
                if meaningful >= self.min_text_chars {
                    return Extraction {
                        text: text.trim().to_string(),
                        degraded: None,
                    };
                }
                warn!(format = format.as_str(), chars = meaningful, "Extracted text too short");
                DegradedReason::TooShort
            }
            Err(e) => {
                warn!(format = format.as_str(), error = %e, "Text extraction failed");
                DegradedReason::Failed
            }
        };

        metrics::record_degraded("ocr", reason.as_str());
        Extraction {
            text: self.placeholder(format).to_string(),
            degraded: Some(reason),
        }
    }
}

/// Routes PDFs to the text layer and images to recognition
pub struct TextExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    policy: DegradedExtractionPolicy,
}

impl TextExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, policy: DegradedExtractionPolicy) -> Self {
        Self { recognizer, policy }
    }

    /// `format` must be extractable; see [`crate::format::detect_format`]
    #[instrument(skip(self, bytes), fields(format = format.as_str(), size = bytes.len()))]
    pub async fn extract_text(&self, bytes: &[u8], format: FileFormat) -> Extraction {
        let raw = match format {
            FileFormat::Pdf => extract_text_from_pdf(bytes),
            FileFormat::Png | FileFormat::Jpeg => self.recognizer.recognize(bytes).await,
            other => Err(OcrError::UnsupportedFormat {
                format: other.as_str(),
            }),
        };

        self.policy.apply(format, raw)
    }
}
