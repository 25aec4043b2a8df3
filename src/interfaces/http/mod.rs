//! HTTP API over the billing engine.
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `POST /properties`, `POST /tenants`
//! - `GET /tenants/{id}/ledger`, `/invoices`, `/payments`, `/notifications`,
//!   `/meter-readings`
//! - `POST /meter-readings`
//! - `POST /invoices/generate`
//! - `POST /payments/stk-push`, `GET /payments/{id}`
//! - `POST /payments/callback` (called by the gateway)

mod auth;
mod handlers;
pub mod types;

use crate::application::engine::BillingEngine;
use crate::error::Result;
use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BillingEngine>,
    /// Bearer key required on non-public routes. `None` disables auth.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(engine: BillingEngine, api_key: Option<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    if state.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("API key authentication disabled; set RENTBILL_API_KEY to enable it");
    }

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/properties", post(handlers::register_property_handler))
        .route("/tenants", post(handlers::register_tenant_handler))
        .route("/tenants/{id}/ledger", get(handlers::ledger_handler))
        .route("/tenants/{id}/invoices", get(handlers::invoices_handler))
        .route("/tenants/{id}/payments", get(handlers::payments_handler))
        .route("/tenants/{id}/meter-readings", get(handlers::meter_readings_handler))
        .route("/tenants/{id}/notifications", get(handlers::notifications_handler))
        .route("/meter-readings", post(handlers::meter_reading_handler))
        .route("/invoices/generate", post(handlers::generate_invoices_handler))
        .route("/payments/stk-push", post(handlers::stk_push_handler))
        .route("/payments/callback", post(handlers::callback_handler))
        .route("/payments/{id}", get(handlers::payment_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth_middleware,
        ))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(addr: &str, state: AppState) -> Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "rentbill HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
