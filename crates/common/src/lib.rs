//! InvoiceFlow Common Library
//!
//! Shared code for the three InvoiceFlow services:
//! - Invoice status state machine
//! - Message contracts, publishers and the queue consumer loop
//! - Database models and the invoice repository
//! - Invoice file storage
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and tracing setup

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod queue;
pub mod storage;
pub mod telemetry;
pub mod workflow;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use workflow::{transition, InvoiceStatus, WorkflowEvent};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wait for Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
