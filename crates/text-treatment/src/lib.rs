//! InvoiceFlow Text Treatment Service
//!
//! Consumes `analyze_invoice`, asks a language model for a structured
//! `{content, amount}` summary and publishes `invoice_data`. Unusable model
//! output is replaced by a fixed fallback so every invoice completes.

pub mod analysis;
pub mod client;
pub mod errors;
pub mod handler;

pub use analysis::{FallbackAnalysisPolicy, InvoiceAnalysis, InvoiceAnalyzer};
pub use client::{OpenAiCompatibleAnalyzer, TextAnalyzer};
pub use errors::AnalysisError;
pub use handler::AnalysisHandler;
