//! InvoiceFlow Public API
//!
//! Accepts invoice uploads, tracks their processing status and ingests the
//! results published by the OCR and text treatment services.

pub mod handlers;
pub mod ingestion;
pub mod middleware;
pub mod service;

use axum::{
    extract::{DefaultBodyLimit, FromRef, Request},
    middleware::Next,
    routing::get,
    Router,
};
use invoiceflow_common::{auth::JwtManager, config::AppConfig};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use ingestion::{DataOutcome, ResultIngestion};
pub use service::InvoiceService;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<InvoiceService>,
    pub jwt: Arc<JwtManager>,
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route(
            "/invoices",
            get(handlers::invoices::list_invoices).post(handlers::invoices::create_invoice),
        )
        .route(
            "/invoices/{id}",
            get(handlers::invoices::get_invoice)
                .put(handlers::invoices::replace_invoice)
                .patch(handlers::invoices::update_invoice)
                .delete(handlers::invoices::delete_invoice),
        )
        .route(
            "/invoices/status/{status}",
            get(handlers::invoices::invoices_by_status),
        )
        .route(
            "/invoices/processing/count",
            get(handlers::invoices::processing_count),
        )
        .route("/invoices/summary", get(handlers::invoices::status_summary))
        .route(
            "/tags",
            get(handlers::tags::list_tags).post(handlers::tags::create_tag),
        )
        .route("/tags/stats", get(handlers::tags::tag_stats))
        .route(
            "/tags/{id}",
            get(handlers::tags::get_tag)
                .patch(handlers::tags::update_tag)
                .delete(handlers::tags::delete_tag),
        );

    let rate_limit = &state.config.rate_limit;
    let api_routes = if rate_limit.enabled {
        let requests_per_second = rate_limit.requests_per_second;
        let limiter =
            middleware::rate_limit::create_rate_limiter(requests_per_second, rate_limit.burst);
        api_routes.layer(axum::middleware::from_fn(move |request: Request, next: Next| {
            middleware::rate_limit::rate_limit_middleware(
                request,
                next,
                limiter.clone(),
                requests_per_second,
            )
        }))
    } else {
        api_routes
    };

    let body_limit = state.config.server.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let timeout = state.config.request_timeout();

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(axum::middleware::from_fn(middleware::request_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}
