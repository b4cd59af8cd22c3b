use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, ProviderProfile};
use crate::models::rate::PricingRate;
use crate::observability::metrics::Metrics;
use crate::realtime::RoomBus;
use crate::store::RequestStore;

pub struct AppState {
    pub accounts: DashMap<Uuid, Account>,
    pub rates: DashMap<String, PricingRate>,
    pub requests: RequestStore,
    pub bus: RoomBus,
    pub metrics: Metrics,
    pub match_radius_km: f64,
}

impl AppState {
    pub fn new(match_radius_km: f64, session_buffer_size: usize) -> Self {
        let metrics = Metrics::new();

        Self {
            accounts: DashMap::new(),
            rates: DashMap::new(),
            requests: RequestStore::new(),
            bus: RoomBus::new(session_buffer_size, metrics.clone()),
            metrics,
            match_radius_km,
        }
    }

    pub fn account(&self, id: &Uuid) -> Result<Account, AppError> {
        self.accounts
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("account {id} not found")))
    }

    pub fn provider(&self, id: &Uuid) -> Result<(Account, ProviderProfile), AppError> {
        let account = self.account(id)?;
        let profile = account
            .provider_profile()
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("provider {id} not found")))?;
        Ok((account, profile))
    }
}
