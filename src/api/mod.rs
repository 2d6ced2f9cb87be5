//! RESTful HTTP API for merchants (invoice/intent lifecycle, inbound
//! provider webhook) and operators (cancellation, outbox inspection).
//! Documented via `utoipa` and served with an embedded Swagger UI,
//! with a generated OpenAPI document served alongside it.

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
mod handlers;
pub mod types;

use crate::db::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub provider_webhook_secret: String,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.db_pool.clone()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_invoice,
        handlers::get_invoice,
        handlers::get_invoice_status,
        handlers::create_intent,
        handlers::receive_provider_webhook,
        handlers::cancel_invoice,
        handlers::list_outbox,
    ),
    components(schemas(
        types::CreateInvoiceRequest,
        types::InvoiceResponse,
        types::CreateIntentRequest,
        types::IntentResponse,
        types::InvoiceStatusResponse,
        types::OutboxSummary,
    ))
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/invoices", post(handlers::create_invoice))
        .route("/api/invoices/{id}", get(handlers::get_invoice))
        .route("/api/invoices/{id}/status", get(handlers::get_invoice_status))
        .route("/api/invoices/{id}/intents", post(handlers::create_intent))
        .route("/webhooks/provider", post(handlers::receive_provider_webhook))
        .route("/admin/invoices/{id}/cancel", post(handlers::cancel_invoice))
        .route("/admin/outbox", get(handlers::list_outbox))
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
