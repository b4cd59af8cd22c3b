use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::account::GeoPoint;
use crate::models::request::{BillItem, FuelDetails, Pricing, RequestStatus, ServiceRequest};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoomId {
    Request(Uuid),
    Account(Uuid),
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomId::Request(id) => write!(f, "request:{id}"),
            RoomId::Account(id) => write!(f, "account:{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    NewRequest {
        request: ServiceRequest,
    },
    RequestAccepted {
        request: ServiceRequest,
    },
    StatusChanged {
        request_id: Uuid,
        status: RequestStatus,
        version: u64,
        request: ServiceRequest,
    },
    OtpVerified {
        request_id: Uuid,
        message: String,
    },
    BillReceived {
        request_id: Uuid,
        pricing: Pricing,
        bill: Vec<BillItem>,
        fuel_details: Option<FuelDetails>,
    },
    PaymentConfirmed {
        request_id: Uuid,
        customer_id: Uuid,
        customer_name: Option<String>,
        payment_id: Option<String>,
        total_amount: f64,
    },
    TrackProvider {
        request_id: Uuid,
        provider_id: Uuid,
        location: GeoPoint,
        sent_at: DateTime<Utc>,
    },
    RequestCancelled {
        request_id: Uuid,
        reason: String,
    },
    ChatMessage {
        request_id: Uuid,
        sender_id: Uuid,
        message: String,
        sent_at: DateTime<Utc>,
    },
    Announcement {
        title: String,
        message: String,
        sent_at: DateTime<Utc>,
    },
}

impl BusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::NewRequest { .. } => "new_request",
            BusEvent::RequestAccepted { .. } => "request_accepted",
            BusEvent::StatusChanged { .. } => "status_changed",
            BusEvent::OtpVerified { .. } => "otp_verified",
            BusEvent::BillReceived { .. } => "bill_received",
            BusEvent::PaymentConfirmed { .. } => "payment_confirmed",
            BusEvent::TrackProvider { .. } => "track_provider",
            BusEvent::RequestCancelled { .. } => "request_cancelled",
            BusEvent::ChatMessage { .. } => "chat_message",
            BusEvent::Announcement { .. } => "announcement",
        }
    }

    pub fn status_changed(request: &ServiceRequest) -> Self {
        BusEvent::StatusChanged {
            request_id: request.id,
            status: request.status,
            version: request.version,
            request: request.clone(),
        }
    }
}

/// Messages a websocket session may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        room: RoomId,
    },
    Leave {
        room: RoomId,
    },
    Chat {
        request_id: Uuid,
        sender_id: Uuid,
        message: String,
    },
    Location {
        request_id: Uuid,
        provider_id: Uuid,
        location: GeoPoint,
    },
}
