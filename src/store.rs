use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::request::{RequestStatus, ServiceRequest};

/// Result of a transition closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
}

#[derive(Default)]
pub struct RequestStore {
    requests: DashMap<Uuid, ServiceRequest>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<ServiceRequest> {
        self.requests.get(id).map(|entry| entry.value().clone())
    }

    pub fn require(&self, id: &Uuid) -> Result<ServiceRequest, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))
    }

    pub fn list_for_account(&self, account_id: Uuid) -> Vec<ServiceRequest> {
        let mut requests: Vec<ServiceRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.value().involves(account_id))
            .map(|entry| entry.value().clone())
            .collect();
        requests.sort_by(|a, b| b.timestamps.created_at.cmp(&a.timestamps.created_at));
        requests
    }

    pub fn count_by_status(&self, status: RequestStatus) -> usize {
        self.requests
            .iter()
            .filter(|entry| entry.value().status == status)
            .count()
    }

    /// Stores a new request and runs `after_commit` while the entry is still locked.
    pub fn insert<P>(&self, request: ServiceRequest, after_commit: P) -> Result<(), AppError>
    where
        P: FnOnce(&ServiceRequest),
    {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(AppError::StateConflict(format!(
                "request {} already exists",
                request.id
            ))),
            Entry::Vacant(slot) => {
                let committed = slot.insert(request);
                after_commit(committed.value());
                Ok(())
            }
        }
    }

    /// Applies `mutate` to a draft of the request under the entry's write lock.
    ///
    /// The draft replaces the stored request only when `mutate` returns
    /// `Outcome::Changed`; an error leaves the stored request untouched.
    /// Requests in a terminal status accept only `Outcome::Unchanged`.
    /// `after_commit` runs before the lock is released, so anything it
    /// publishes is ordered the same way commits are.
    pub fn transition<F, P>(
        &self,
        id: &Uuid,
        mutate: F,
        after_commit: P,
    ) -> Result<(ServiceRequest, Outcome), AppError>
    where
        F: FnOnce(&mut ServiceRequest) -> Result<Outcome, AppError>,
        P: FnOnce(&ServiceRequest),
    {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

        let mut draft = entry.value().clone();
        let outcome = mutate(&mut draft)?;

        if outcome == Outcome::Changed {
            let current = entry.value().status;
            if current.is_terminal() {
                return Err(AppError::StateConflict(format!(
                    "request {id} is already {current:?}"
                )));
            }
            draft.version += 1;
            draft.timestamps.updated_at = Utc::now();
            *entry.value_mut() = draft;
            after_commit(entry.value());
        }

        Ok((entry.value().clone(), outcome))
    }
}

/// Rejects the transition unless the request is in one of `allowed`.
pub fn ensure_status(
    request: &ServiceRequest,
    allowed: &[RequestStatus],
    action: &str,
) -> Result<(), AppError> {
    if allowed.contains(&request.status) {
        Ok(())
    } else {
        Err(AppError::StateConflict(format!(
            "cannot {action} request {} in status {:?}",
            request.id, request.status
        )))
    }
}
