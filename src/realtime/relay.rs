use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::GeoPoint;
use crate::realtime::events::{BusEvent, RoomId};
use crate::state::AppState;

/// Records a provider's live position and mirrors it to the request room.
///
/// Fire-and-forget: a failed directory write is logged and the tick is still
/// mirrored. Nothing here touches the request itself.
pub fn track_provider(state: &AppState, request_id: Uuid, provider_id: Uuid, location: GeoPoint) {
    if !location.is_valid() {
        warn!(provider_id = %provider_id, "ignoring invalid live location");
        return;
    }

    if let Err(err) = update_live_location(state, &provider_id, location) {
        warn!(provider_id = %provider_id, error = %err, "failed to store live location");
    }

    state.bus.publish(
        RoomId::Request(request_id),
        BusEvent::TrackProvider {
            request_id,
            provider_id,
            location,
            sent_at: Utc::now(),
        },
    );
}

/// Last write wins; no ordering is kept between ticks.
pub fn update_live_location(
    state: &AppState,
    provider_id: &Uuid,
    location: GeoPoint,
) -> Result<(), AppError> {
    let mut account = state
        .accounts
        .get_mut(provider_id)
        .ok_or_else(|| AppError::NotFound(format!("provider {provider_id} not found")))?;

    let profile = account
        .provider
        .as_mut()
        .ok_or_else(|| AppError::InvalidInput(format!("account {provider_id} is not a provider")))?;
    profile.live_location = Some(location);
    account.updated_at = Utc::now();
    Ok(())
}

pub fn relay_chat(state: &AppState, request_id: Uuid, sender_id: Uuid, message: String) -> usize {
    if message.trim().is_empty() {
        return 0;
    }

    state.bus.publish(
        RoomId::Request(request_id),
        BusEvent::ChatMessage {
            request_id,
            sender_id,
            message,
            sent_at: Utc::now(),
        },
    )
}

pub fn announce(state: &AppState, title: String, message: String) -> Result<usize, AppError> {
    if message.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "announcement message cannot be empty".to_string(),
        ));
    }

    Ok(state.bus.broadcast(BusEvent::Announcement {
        title,
        message,
        sent_at: Utc::now(),
    }))
}
