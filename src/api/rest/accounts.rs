use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, GeoPoint, ProviderProfile, Role};
use crate::models::request::ServiceRequest;
use crate::realtime::relay::{track_provider, update_live_location};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(upsert_account).get(list_accounts))
        .route("/accounts/:id/online", patch(update_online))
        .route("/accounts/:id/location", patch(update_location))
        .route("/accounts/:id/requests", get(list_account_requests))
}

#[derive(Deserialize)]
pub struct UpsertAccountRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub provider: Option<ProviderProfile>,
}

#[derive(Deserialize)]
pub struct UpdateOnlineRequest {
    pub is_online: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    /// When set, the tick is also mirrored to this request's room.
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

async fn upsert_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpsertAccountRequest>,
) -> Result<Json<Account>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("name cannot be empty".to_string()));
    }

    let provider = match (payload.role, payload.provider) {
        (Role::Provider, Some(mut profile)) => {
            if !profile.shop_location.is_valid() {
                return Err(AppError::InvalidInput("invalid shop location".to_string()));
            }
            if profile.categories.is_empty() {
                return Err(AppError::InvalidInput(
                    "provider must offer at least one category".to_string(),
                ));
            }
            profile.rating.average_rating = profile.rating.average_rating.clamp(0.0, 5.0);
            Some(profile)
        }
        (Role::Provider, None) => {
            return Err(AppError::InvalidInput(
                "provider profile is required for providers".to_string(),
            ));
        }
        (Role::Customer, _) => None,
    };

    let id = payload.id.unwrap_or_else(Uuid::new_v4);
    let account = match state.accounts.entry(id) {
        Entry::Occupied(mut slot) => {
            let stored = slot.get_mut();
            if stored.role != payload.role {
                return Err(AppError::StateConflict(format!(
                    "account {id} is registered as {:?}",
                    stored.role
                )));
            }

            stored.name = payload.name;
            stored.phone = payload.phone;
            // Only the service catalogue is editable after registration.
            if let (Some(current), Some(update)) = (stored.provider.as_mut(), provider) {
                current.categories = update.categories;
                current.capabilities = update.capabilities;
            }
            stored.updated_at = Utc::now();
            stored.clone()
        }
        Entry::Vacant(slot) => slot
            .insert(Account {
                id,
                name: payload.name,
                phone: payload.phone,
                role: payload.role,
                provider,
                updated_at: Utc::now(),
            })
            .value()
            .clone(),
    };

    Ok(Json(account))
}

async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<Account>> {
    let accounts = state
        .accounts
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(accounts)
}

async fn update_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOnlineRequest>,
) -> Result<Json<Account>, AppError> {
    let mut account = state
        .accounts
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("account {} not found", id)))?;

    let profile = account
        .provider
        .as_mut()
        .ok_or_else(|| AppError::InvalidInput(format!("account {} is not a provider", id)))?;
    profile.is_online = payload.is_online;
    account.updated_at = Utc::now();

    Ok(Json(account.clone()))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Account>, AppError> {
    if !payload.location.is_valid() {
        return Err(AppError::InvalidInput("invalid location".to_string()));
    }

    match payload.request_id {
        Some(request_id) => track_provider(&state, request_id, id, payload.location),
        None => update_live_location(&state, &id, payload.location)?,
    }

    Ok(Json(state.account(&id)?))
}

async fn list_account_requests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<ServiceRequest>> {
    Json(state.requests.list_for_account(id))
}
