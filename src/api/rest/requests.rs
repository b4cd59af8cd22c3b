use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::engine::lifecycle::{
    self, AcceptCommand, BillCommand, CancelCommand, CreateCommand, PaymentCallback,
};
use crate::error::AppError;
use crate::models::request::ServiceRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/accept", post(accept_request))
        .route("/requests/:id/verify-otp", post(verify_otp))
        .route("/requests/:id/bill", post(send_bill))
        .route("/requests/:id/payment", post(confirm_payment))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requests/:id/complete", post(complete_request))
        .route("/requests/:id/expire", post(expire_request))
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

#[derive(Serialize)]
pub struct VerifyOtpResponse {
    pub success: bool,
    pub message: String,
    pub request: ServiceRequest,
}

#[derive(Serialize)]
pub struct BillResponse {
    pub total_amount: f64,
    pub request: ServiceRequest,
}

#[derive(Serialize)]
pub struct RequestEnvelope {
    pub request: ServiceRequest,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCommand>,
) -> Result<(StatusCode, Json<ServiceRequest>), AppError> {
    let request = lifecycle::create_request(&state, payload)?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(state.requests.require(&id)?))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptCommand>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::accept_request(&state, id, payload)?))
}

async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Response {
    match lifecycle::verify_otp(&state, id, &payload.otp) {
        Ok(outcome) => Json(VerifyOtpResponse {
            success: outcome.success,
            message: outcome.message,
            request: outcome.request,
        })
        .into_response(),
        Err(err) => {
            let body = Json(json!({
                "success": false,
                "message": err.message(),
                "error": err.message(),
                "kind": err.kind(),
            }));
            (err.status_code(), body).into_response()
        }
    }
}

async fn send_bill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BillCommand>,
) -> Result<Json<BillResponse>, AppError> {
    let request = lifecycle::send_bill(&state, id, payload)?;
    Ok(Json(BillResponse {
        total_amount: request.pricing.total_amount,
        request,
    }))
}

async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentCallback>,
) -> Result<Json<RequestEnvelope>, AppError> {
    let request = lifecycle::confirm_payment(&state, id, payload)?;
    Ok(Json(RequestEnvelope { request }))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelCommand>,
) -> Result<Json<RequestEnvelope>, AppError> {
    let request = lifecycle::cancel_request(&state, id, payload)?;
    Ok(Json(RequestEnvelope { request }))
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::complete_request(&state, id)?))
}

async fn expire_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::expire_request(&state, id)?))
}
