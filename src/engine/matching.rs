use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::pricing::{bundle_estimate, resolve_rates};
use crate::error::AppError;
use crate::geo::distance_within;
use crate::models::account::{Account, GeoPoint, ProviderCategory, RatingSummary};
use crate::models::rate::PricingRate;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub origin: GeoPoint,
    pub category: ProviderCategory,
    pub services: Vec<String>,
}

/// Public view of a provider shown in search results.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub categories: Vec<ProviderCategory>,
    pub shop_location: GeoPoint,
    pub live_location: Option<GeoPoint>,
    pub rating: RatingSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderMatch {
    pub provider: ProviderSummary,
    pub distance_km: f64,
    pub base_fee: f64,
    pub price_per_km: f64,
    pub total_estimate: f64,
}

pub fn search_providers(state: &AppState, query: &SearchQuery) -> Result<Vec<ProviderMatch>, AppError> {
    let start = Instant::now();

    if !query.origin.is_valid() {
        return Err(AppError::InvalidInput(format!(
            "invalid origin coordinate ({}, {})",
            query.origin.lat, query.origin.lng
        )));
    }

    let rates = resolve_rates(&state.rates, query.category, &query.services)?;
    let matches = match_providers(&state.accounts, query, &rates, state.match_radius_km);

    state
        .metrics
        .search_latency_seconds
        .observe(start.elapsed().as_secs_f64());
    debug!(
        category = query.category.label(),
        services = ?query.services,
        candidates = matches.len(),
        "provider search finished"
    );

    Ok(matches)
}

/// Filters the directory and prices each candidate with already-resolved rates.
///
/// Distance is always measured to the provider's shop location so that the
/// same search gives the same prices regardless of live GPS updates.
pub fn match_providers(
    accounts: &DashMap<Uuid, Account>,
    query: &SearchQuery,
    rates: &[PricingRate],
    radius_km: f64,
) -> Vec<ProviderMatch> {
    let requires_capabilities = query.category != ProviderCategory::FuelDelivery;

    let mut matches: Vec<ProviderMatch> = accounts
        .iter()
        .filter_map(|entry| {
            let account = entry.value();
            let profile = account.provider_profile()?;

            let eligible = profile.is_verified
                && profile.is_online
                && profile.serves(query.category)
                && (!requires_capabilities || profile.has_all_capabilities(&query.services));
            if !eligible {
                return None;
            }

            let distance_km = distance_within(&query.origin, &profile.shop_location, radius_km)?;

            let estimate = bundle_estimate(rates, distance_km);

            Some(ProviderMatch {
                provider: ProviderSummary {
                    id: account.id,
                    name: account.name.clone(),
                    phone: account.phone.clone(),
                    categories: profile.categories.clone(),
                    shop_location: profile.shop_location,
                    live_location: profile.live_location,
                    rating: profile.rating.clone(),
                },
                distance_km,
                base_fee: estimate.base_fee,
                price_per_km: estimate.price_per_km,
                total_estimate: estimate.total_estimate,
            })
        })
        .collect();

    matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    matches
}
