use serde::{Deserialize, Serialize};

use crate::models::account::ProviderCategory;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateKind {
    Service {
        category: ProviderCategory,
    },
    Fuel {
        fuel_type: String,
        price_per_litre: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingRate {
    pub service_name: String,
    pub base_price: f64,
    pub price_per_km: f64,
    #[serde(flatten)]
    pub kind: RateKind,
}

impl PricingRate {
    pub fn category(&self) -> ProviderCategory {
        match &self.kind {
            RateKind::Service { category } => *category,
            RateKind::Fuel { .. } => ProviderCategory::FuelDelivery,
        }
    }

    pub fn price_per_litre(&self) -> Option<f64> {
        match &self.kind {
            RateKind::Fuel {
                price_per_litre, ..
            } => Some(*price_per_litre),
            RateKind::Service { .. } => None,
        }
    }

    pub fn fuel_type(&self) -> Option<&str> {
        match &self.kind {
            RateKind::Fuel { fuel_type, .. } => Some(fuel_type),
            RateKind::Service { .. } => None,
        }
    }
}
