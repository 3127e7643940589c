//! Text treatment error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Completion response has no content")]
    EmptyResponse,

    #[error("Malformed analysis JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Analysis violates schema: {message}")]
    SchemaViolation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AnalysisError {
    /// Label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Request(_) | AnalysisError::Api { .. } => "call_failed",
            AnalysisError::EmptyResponse => "empty_response",
            AnalysisError::Malformed(_) => "malformed_json",
            AnalysisError::SchemaViolation { .. } => "schema_violation",
            AnalysisError::Configuration { .. } => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
