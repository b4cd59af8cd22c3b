use std::sync::Arc;

use axum::extract::State;
use axum::routing::{post, put};
use axum::Json;
use axum::Router;

use crate::engine::matching::{search_providers, ProviderMatch, SearchQuery};
use crate::error::AppError;
use crate::models::rate::PricingRate;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rates", put(upsert_rate).get(list_rates))
        .route("/providers/search", post(search))
}

async fn upsert_rate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PricingRate>,
) -> Result<Json<PricingRate>, AppError> {
    let name = payload.service_name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput(
            "service_name cannot be empty".to_string(),
        ));
    }

    let prices = [
        Some(payload.base_price),
        Some(payload.price_per_km),
        payload.price_per_litre(),
    ];
    if prices
        .iter()
        .flatten()
        .any(|price| !price.is_finite() || *price < 0.0)
    {
        return Err(AppError::InvalidInput(
            "prices must be non-negative numbers".to_string(),
        ));
    }

    let rate = PricingRate {
        service_name: name,
        ..payload
    };
    state.rates.insert(rate.service_name.clone(), rate.clone());
    Ok(Json(rate))
}

async fn list_rates(State(state): State<Arc<AppState>>) -> Json<Vec<PricingRate>> {
    let mut rates: Vec<PricingRate> = state
        .rates
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    rates.sort_by(|a, b| a.service_name.cmp(&b.service_name));
    Json(rates)
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<Vec<ProviderMatch>>, AppError> {
    Ok(Json(search_providers(&state, &query)?))
}
