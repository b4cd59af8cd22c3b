use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::realtime::events::{BusEvent, RoomId};

pub type SessionId = Uuid;

/// Room-based fan-out to connected sessions.
///
/// Every session owns a bounded queue. Room membership is explicit: a session
/// receives room traffic only between `subscribe` and `unsubscribe`.
/// Announcements go to every connected session regardless of rooms.
pub struct RoomBus {
    sessions: DashMap<SessionId, mpsc::Sender<BusEvent>>,
    rooms: DashMap<RoomId, HashSet<SessionId>>,
    buffer_size: usize,
    metrics: Metrics,
}

impl RoomBus {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    pub fn connect(&self) -> (SessionId, mpsc::Receiver<BusEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let session_id = Uuid::new_v4();
        self.sessions.insert(session_id, tx);
        self.metrics.active_sessions.inc();
        debug!(session_id = %session_id, "session connected");
        (session_id, rx)
    }

    pub fn disconnect(&self, session_id: &SessionId) {
        if self.sessions.remove(session_id).is_some() {
            self.metrics.active_sessions.dec();
        }
        self.rooms.retain(|_, members| {
            members.remove(session_id);
            !members.is_empty()
        });
        debug!(session_id = %session_id, "session disconnected");
    }

    pub fn subscribe(&self, session_id: &SessionId, room: RoomId) -> Result<(), AppError> {
        if !self.sessions.contains_key(session_id) {
            return Err(AppError::NotFound(format!("session {session_id} not found")));
        }
        self.rooms.entry(room).or_default().insert(*session_id);
        debug!(session_id = %session_id, room = %room, "joined room");
        Ok(())
    }

    pub fn unsubscribe(&self, session_id: &SessionId, room: &RoomId) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(session_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    /// Delivers `event` to every member of `room`; returns how many sessions got it.
    pub fn publish(&self, room: RoomId, event: BusEvent) -> usize {
        let members: Vec<SessionId> = match self.rooms.get(&room) {
            Some(members) => members.iter().copied().collect(),
            None => Vec::new(),
        };

        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();

        let delivered = members
            .iter()
            .filter(|session_id| self.deliver(session_id, &event))
            .count();

        debug!(room = %room, event = event.name(), delivered, "event published");
        delivered
    }

    pub fn broadcast(&self, event: BusEvent) -> usize {
        let sessions: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();

        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();

        sessions
            .iter()
            .filter(|session_id| self.deliver(session_id, &event))
            .count()
    }

    fn deliver(&self, session_id: &SessionId, event: &BusEvent) -> bool {
        let Some(tx) = self.sessions.get(session_id).map(|entry| entry.value().clone()) else {
            return false;
        };

        match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.events_dropped_total.inc();
                warn!(session_id = %session_id, event = event.name(), "session queue full; event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.events_dropped_total.inc();
                false
            }
        }
    }
}
