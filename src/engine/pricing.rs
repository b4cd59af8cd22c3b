use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::models::account::ProviderCategory;
use crate::models::rate::{PricingRate, RateKind};
use crate::models::request::Pricing;

const DEFAULT_FUEL_BASE_PRICE: f64 = 50.0;
const DEFAULT_FUEL_PRICE_PER_KM: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEstimate {
    pub base_fee: f64,
    pub price_per_km: f64,
    pub distance_km: f64,
    pub distance_fee: f64,
    pub total_estimate: f64,
}

/// Sums base prices and charges the costliest per-km rate of the bundle.
/// The total is rounded up for display.
pub fn bundle_estimate(rates: &[PricingRate], distance_km: f64) -> BundleEstimate {
    let base_fee: f64 = rates.iter().map(|rate| rate.base_price).sum();
    let price_per_km = rates
        .iter()
        .map(|rate| rate.price_per_km)
        .fold(0.0_f64, f64::max);
    let distance_fee = distance_km * price_per_km;

    BundleEstimate {
        base_fee,
        price_per_km,
        distance_km,
        distance_fee,
        total_estimate: (base_fee + distance_fee).ceil(),
    }
}

/// Exact total for a billed request. Unlike the estimate this is never rounded.
pub fn final_total(pricing: &Pricing, material_cost: f64) -> f64 {
    pricing.base_fee + pricing.distance_fee + material_cost
}

/// Total used by the manual completion path, rounded up like the estimate.
pub fn manual_completion_total(pricing: &Pricing) -> f64 {
    final_total(pricing, pricing.material_cost).ceil()
}

pub fn resolve_rates(
    rates: &DashMap<String, PricingRate>,
    category: ProviderCategory,
    service_names: &[String],
) -> Result<Vec<PricingRate>, AppError> {
    if service_names.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one service must be requested".to_string(),
        ));
    }

    service_names
        .iter()
        .map(|name| match rates.get(name) {
            Some(rate) => Ok(rate.value().clone()),
            None if category == ProviderCategory::FuelDelivery => Ok(fuel_fallback_rate(rates, name)),
            None => Err(AppError::ServiceNotConfigured(format!(
                "no pricing configured for service '{name}'"
            ))),
        })
        .collect()
}

fn generic_fuel_rate(rates: &DashMap<String, PricingRate>) -> Option<PricingRate> {
    if let Some(rate) = rates.get(ProviderCategory::FuelDelivery.label()) {
        return Some(rate.value().clone());
    }

    rates
        .iter()
        .filter(|entry| entry.value().category() == ProviderCategory::FuelDelivery)
        .map(|entry| entry.value().clone())
        .min_by(|a, b| a.service_name.cmp(&b.service_name))
}

fn fuel_fallback_rate(rates: &DashMap<String, PricingRate>, service_name: &str) -> PricingRate {
    if let Some(rate) = generic_fuel_rate(rates) {
        return rate;
    }

    warn!(
        service = service_name,
        base_price = DEFAULT_FUEL_BASE_PRICE,
        price_per_km = DEFAULT_FUEL_PRICE_PER_KM,
        "no fuel delivery rate configured; using default rate"
    );

    PricingRate {
        service_name: service_name.to_string(),
        base_price: DEFAULT_FUEL_BASE_PRICE,
        price_per_km: DEFAULT_FUEL_PRICE_PER_KM,
        kind: RateKind::Service {
            category: ProviderCategory::FuelDelivery,
        },
    }
}

/// Current price per litre for a fuel type, read fresh from the rate book.
pub fn current_price_per_litre(
    rates: &DashMap<String, PricingRate>,
    fuel_type: &str,
) -> Result<f64, AppError> {
    if let Some(price) = rates.get(fuel_type).and_then(|rate| rate.price_per_litre()) {
        return Ok(price);
    }

    let by_fuel_type = rates
        .iter()
        .filter(|entry| entry.value().fuel_type() == Some(fuel_type))
        .filter_map(|entry| entry.value().price_per_litre())
        .next();
    if let Some(price) = by_fuel_type {
        return Ok(price);
    }

    generic_fuel_rate(rates)
        .and_then(|rate| rate.price_per_litre())
        .ok_or_else(|| {
            AppError::ServiceNotConfigured(format!("no fuel price configured for '{fuel_type}'"))
        })
}
