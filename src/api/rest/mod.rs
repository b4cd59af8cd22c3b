pub mod accounts;
pub mod rates;
pub mod requests;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::error::AppError;
use crate::models::request::RequestStatus;
use crate::realtime::relay::announce;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(accounts::router())
        .merge(rates::router())
        .merge(requests::router())
        .route("/announcements", post(create_announcement))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(ServeDir::new("static"))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    accounts: usize,
    requests: usize,
    pending_requests: usize,
    sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        accounts: state.accounts.len(),
        requests: state.requests.len(),
        pending_requests: state.requests.count_by_status(RequestStatus::Pending),
        sessions: state.bus.session_count(),
    })
}

#[derive(Deserialize)]
struct AnnouncementRequest {
    #[serde(default)]
    title: String,
    message: String,
}

#[derive(Serialize)]
struct AnnouncementResponse {
    delivered: usize,
}

async fn create_announcement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnnouncementRequest>,
) -> Result<Json<AnnouncementResponse>, AppError> {
    let delivered = announce(&state, payload.title, payload.message)?;
    Ok(Json(AnnouncementResponse { delivered }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
