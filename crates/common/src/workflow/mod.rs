//! Invoice processing state machine
//!
//! The invoice status is the only durable signal of pipeline progress. Every
//! status change goes through [`transition`], which validates the move against
//! a fixed table:
//!
//! ```text
//! UPLOADED --Dispatched--------> PROCESSING --AnalysisReceived--> COMPLETED
//!     \                              |                               |
//!      `---------Failed------------> ERROR <---------Failed---------'
//! ```
//!
//! `ERROR` is terminal. `Failed` is accepted from every state so that a late
//! `processing_error` always wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Persisted invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Uploaded,
        InvoiceStatus::Processing,
        InvoiceStatus::Completed,
        InvoiceStatus::Error,
    ];

    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Uploaded => "UPLOADED",
            InvoiceStatus::Processing => "PROCESSING",
            InvoiceStatus::Completed => "COMPLETED",
            InvoiceStatus::Error => "ERROR",
        }
    }

    /// No automated transition leaves a terminal state except `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Completed | InvoiceStatus::Error)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown invoice status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UPLOADED" => Ok(InvoiceStatus::Uploaded),
            "PROCESSING" => Ok(InvoiceStatus::Processing),
            "COMPLETED" => Ok(InvoiceStatus::Completed),
            "ERROR" => Ok(InvoiceStatus::Error),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl From<InvoiceStatus> for String {
    fn from(status: InvoiceStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Something that happened to an invoice in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowEvent {
    /// The upload was handed to the OCR stage
    Dispatched,
    /// An `invoice_data` result arrived from the text treatment stage
    AnalysisReceived,
    /// Any stage reported an unrecoverable failure
    Failed,
}

impl WorkflowEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEvent::Dispatched => "dispatched",
            WorkflowEvent::AnalysisReceived => "analysis_received",
            WorkflowEvent::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid transition: {event} is not allowed from {from}")]
pub struct InvalidTransition {
    pub from: InvoiceStatus,
    pub event: WorkflowEvent,
}

/// Pure transition function over the status table
pub fn transition(
    from: InvoiceStatus,
    event: WorkflowEvent,
) -> Result<InvoiceStatus, InvalidTransition> {
    use InvoiceStatus::*;
    use WorkflowEvent::*;

    match (from, event) {
        (Uploaded, Dispatched) => Ok(Processing),
        (Processing, AnalysisReceived) => Ok(Completed),
        (_, Failed) => Ok(Error),
        _ => Err(InvalidTransition { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let status = transition(InvoiceStatus::Uploaded, WorkflowEvent::Dispatched).unwrap();
        assert_eq!(status, InvoiceStatus::Processing);

        let status = transition(status, WorkflowEvent::AnalysisReceived).unwrap();
        assert_eq!(status, InvoiceStatus::Completed);
    }

    #[test]
    fn test_failure_reachable_from_every_state() {
        for status in InvoiceStatus::ALL {
            assert_eq!(
                transition(status, WorkflowEvent::Failed),
                Ok(InvoiceStatus::Error)
            );
        }
    }

    #[test]
    fn test_error_is_terminal() {
        for event in [WorkflowEvent::Dispatched, WorkflowEvent::AnalysisReceived] {
            let err = transition(InvoiceStatus::Error, event).unwrap_err();
            assert_eq!(err.from, InvoiceStatus::Error);
        }
    }

    #[test]
    fn test_duplicate_analysis_rejected() {
        let err = transition(InvoiceStatus::Completed, WorkflowEvent::AnalysisReceived)
            .unwrap_err();
        assert_eq!(err.event, WorkflowEvent::AnalysisReceived);
    }

    #[test]
    fn test_analysis_before_dispatch_rejected() {
        assert!(transition(InvoiceStatus::Uploaded, WorkflowEvent::AnalysisReceived).is_err());
        assert!(transition(InvoiceStatus::Processing, WorkflowEvent::Dispatched).is_err());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert_eq!("processing".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Processing));
        assert!("DONE".parse::<InvoiceStatus>().is_err());
    }
}
