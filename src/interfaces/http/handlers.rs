use super::AppState;
use super::types::{
    CallbackAck, ErrorResponse, GenerateInvoicesRequest, GenerateInvoicesResponse, HealthResponse,
    RegisterTenantRequest, StkPushRequest,
};
use crate::application::payments::CallbackDisposition;
use crate::domain::ledger::Property;
use crate::domain::meter::ReadingSubmission;
use crate::error::BillingError;
use crate::infrastructure::mpesa::parse_callback;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

/// Maps engine errors onto HTTP status codes.
pub struct ApiError(BillingError);

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse::ok(state.engine.has_gateway()))
}

pub async fn register_property_handler(
    State(state): State<AppState>,
    Json(property): Json<Property>,
) -> ApiResult<impl IntoResponse> {
    let property = state.engine.register_property(property).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn register_tenant_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterTenantRequest>,
) -> ApiResult<impl IntoResponse> {
    let ledger = state
        .engine
        .register_tenant(request.tenant, &request.name, request.phone, request.property)
        .await?;
    Ok((StatusCode::CREATED, Json(ledger)))
}

pub async fn ledger_handler(
    State(state): State<AppState>,
    Path(tenant): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.ledger(tenant).await?))
}

pub async fn invoices_handler(
    State(state): State<AppState>,
    Path(tenant): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.invoices(tenant).await?))
}

pub async fn meter_readings_handler(
    State(state): State<AppState>,
    Path(tenant): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.meter_readings(tenant).await?))
}

pub async fn payment_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.payment(id).await?))
}

pub async fn payments_handler(
    State(state): State<AppState>,
    Path(tenant): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.payments(tenant).await?))
}

pub async fn notifications_handler(
    State(state): State<AppState>,
    Path(tenant): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.notifications(tenant).await?))
}

pub async fn meter_reading_handler(
    State(state): State<AppState>,
    Json(submission): Json<ReadingSubmission>,
) -> ApiResult<impl IntoResponse> {
    let reading = state.engine.record_meter_reading(submission).await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

pub async fn generate_invoices_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateInvoicesRequest>,
) -> ApiResult<impl IntoResponse> {
    let issued_on = request.issued_on.unwrap_or_else(|| Utc::now().date_naive());
    let summary = state
        .engine
        .generate_monthly_invoices(request.period, issued_on)
        .await?;
    Ok(Json(GenerateInvoicesResponse::new(request.period, summary)))
}

pub async fn stk_push_handler(
    State(state): State<AppState>,
    Json(request): Json<StkPushRequest>,
) -> ApiResult<impl IntoResponse> {
    let tx = state
        .engine
        .initiate_payment(&request.invoice, request.phone)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(tx)))
}

/// Receives the gateway's asynchronous result.
///
/// Always acknowledges: the gateway does not act on our errors, and a
/// retried delivery is already harmless.
pub async fn callback_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match parse_callback(&body) {
        Ok(outcome) => match state.engine.handle_callback(outcome).await {
            Ok(CallbackDisposition::Applied(tx)) => {
                tracing::debug!(transaction = %tx.id, "Callback applied");
            }
            Ok(CallbackDisposition::Declined(tx)) => {
                tracing::debug!(transaction = %tx.id, "Callback declined");
            }
            Ok(CallbackDisposition::Duplicate(_) | CallbackDisposition::Unknown) => {}
            Err(e) => tracing::error!(error = %e, "Failed to reconcile callback"),
        },
        Err(e) => tracing::warn!(error = %e, "Unreadable payment callback"),
    }
    Json(CallbackAck::accepted())
}
