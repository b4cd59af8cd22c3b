use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProviderCategory {
    Mechanic,
    #[serde(rename = "Fuel Delivery")]
    FuelDelivery,
    #[serde(rename = "EV Support")]
    EvSupport,
}

impl ProviderCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderCategory::Mechanic => "Mechanic",
            ProviderCategory::FuelDelivery => "Fuel Delivery",
            ProviderCategory::EvSupport => "EV Support",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCapability {
    pub name: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub total_reviews: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub categories: Vec<ProviderCategory>,
    pub capabilities: Vec<ServiceCapability>,
    /// Registered shop location. Matching and pricing only ever read this one.
    pub shop_location: GeoPoint,
    /// Last reported GPS position, display only.
    #[serde(default)]
    pub live_location: Option<GeoPoint>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub rating: RatingSummary,
}

impl ProviderProfile {
    pub fn serves(&self, category: ProviderCategory) -> bool {
        self.categories.contains(&category)
    }

    /// True when every requested name is an active capability.
    pub fn has_all_capabilities(&self, names: &[String]) -> bool {
        names.iter().all(|name| {
            self.capabilities
                .iter()
                .any(|capability| capability.active && &capability.name == name)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderProfile>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn provider_profile(&self) -> Option<&ProviderProfile> {
        match self.role {
            Role::Provider => self.provider.as_ref(),
            Role::Customer => None,
        }
    }
}
