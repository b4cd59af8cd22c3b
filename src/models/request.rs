use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::account::{GeoPoint, ProviderCategory};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Accepted,
    /// Kept for data compatibility; nothing transitions into it yet.
    Arrived,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    pub base_fee: f64,
    pub price_per_km: f64,
    pub distance_metric: f64,
    pub distance_fee: f64,
    pub material_cost: f64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FuelDetails {
    pub fuel_type: String,
    pub quantity: f64,
    /// Price per litre, refreshed from the rate book when the bill is sent.
    #[serde(default)]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillItem {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignee {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleInfo {
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub otp_verified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            accepted_at: None,
            otp_verified_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub category: ProviderCategory,
    pub services: Vec<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub vehicle: Option<VehicleInfo>,
    pub status: RequestStatus,
    pub pricing: Pricing,
    pub fuel_details: Option<FuelDetails>,
    pub service_otp: Option<String>,
    pub otp_verified: bool,
    pub assignee: Option<Assignee>,
    pub bill: Vec<BillItem>,
    pub bill_sent: bool,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub timestamps: Timestamps,
    /// Bumped on every committed mutation; lets clients order bus events.
    pub version: u64,
}

impl ServiceRequest {
    pub fn involves(&self, account_id: Uuid) -> bool {
        self.customer_id == account_id || self.provider_id == Some(account_id)
    }
}
