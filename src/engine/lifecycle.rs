//! Service request state machine.
//!
//! Every transition runs through [`RequestStore::transition`](crate::store::RequestStore::transition),
//! so the status check and the write happen under one entry lock. Bus events
//! are published from the commit hook and never before the write lands.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::pricing::{current_price_per_litre, final_total, manual_completion_total};
use crate::error::AppError;
use crate::models::account::{GeoPoint, ProviderCategory, Role};
use crate::models::request::{
    Assignee, BillItem, FuelDetails, PaymentStatus, Pricing, RequestStatus, ServiceRequest,
    Timestamps, VehicleInfo,
};
use crate::realtime::{BusEvent, RoomId};
use crate::state::AppState;
use crate::store::{ensure_status, Outcome};

const CANCELLABLE: &[RequestStatus] = &[
    RequestStatus::Pending,
    RequestStatus::Accepted,
    RequestStatus::Arrived,
];
const MANUALLY_COMPLETABLE: &[RequestStatus] = &[
    RequestStatus::Accepted,
    RequestStatus::Arrived,
    RequestStatus::InProgress,
];
const DEFAULT_CANCEL_REASON: &str = "Cancelled by provider";

#[derive(Debug, Clone, Deserialize)]
pub struct EstimateSnapshot {
    pub base_fee: f64,
    pub price_per_km: f64,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuelOrder {
    pub fuel_type: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommand {
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub category: ProviderCategory,
    pub services: Vec<String>,
    pub location: GeoPoint,
    pub estimate: EstimateSnapshot,
    #[serde(default)]
    pub vehicle: Option<VehicleInfo>,
    #[serde(default)]
    pub fuel: Option<FuelOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptCommand {
    pub provider_id: Uuid,
    #[serde(default)]
    pub assignee_name: Option<String>,
    #[serde(default)]
    pub assignee_phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillCommand {
    pub provider_id: Uuid,
    #[serde(default)]
    pub items: Vec<BillItem>,
    /// Litres delivered; overrides the quantity ordered at creation.
    #[serde(default)]
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelCommand {
    pub provider_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub message: String,
    pub request: ServiceRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatewayStatus {
    Succeeded,
    Failed,
}

fn parse_gateway_status(raw: &str) -> Result<GatewayStatus, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "success" | "paid" | "captured" => Ok(GatewayStatus::Succeeded),
        "failed" => Ok(GatewayStatus::Failed),
        other => Err(AppError::UpstreamFailure(format!(
            "payment gateway reported unknown status '{other}'"
        ))),
    }
}

fn generate_otp() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

fn ensure_non_negative(value: f64, field: &str) -> Result<(), AppError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "{field} must be a non-negative number"
        )))
    }
}

fn ensure_assigned_to(request: &ServiceRequest, provider_id: Uuid) -> Result<(), AppError> {
    match request.provider_id {
        Some(bound) if bound != provider_id => Err(AppError::StateConflict(format!(
            "request {} is assigned to another provider",
            request.id
        ))),
        _ => Ok(()),
    }
}

pub fn create_request(state: &AppState, command: CreateCommand) -> Result<ServiceRequest, AppError> {
    let result = create_inner(state, command);
    state.metrics.record_transition("create", &result);
    result
}

fn create_inner(state: &AppState, command: CreateCommand) -> Result<ServiceRequest, AppError> {
    if !command.location.is_valid() {
        return Err(AppError::InvalidInput("invalid request location".to_string()));
    }
    let services: Vec<String> = command
        .services
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if services.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one service must be requested".to_string(),
        ));
    }

    let estimate = &command.estimate;
    ensure_non_negative(estimate.base_fee, "estimate.base_fee")?;
    ensure_non_negative(estimate.price_per_km, "estimate.price_per_km")?;
    ensure_non_negative(estimate.distance_km, "estimate.distance_km")?;

    let customer = state.account(&command.customer_id)?;
    if customer.role != Role::Customer {
        return Err(AppError::InvalidInput(format!(
            "account {} is not a customer",
            command.customer_id
        )));
    }

    let (_, profile) = state.provider(&command.provider_id)?;
    if !profile.serves(command.category) {
        return Err(AppError::InvalidInput(format!(
            "provider {} does not offer {}",
            command.provider_id,
            command.category.label()
        )));
    }

    let fuel_details = match (command.category, command.fuel) {
        (ProviderCategory::FuelDelivery, Some(order)) => {
            if order.fuel_type.trim().is_empty() {
                return Err(AppError::InvalidInput("fuel.fuel_type is required".to_string()));
            }
            if !(order.quantity.is_finite() && order.quantity > 0.0) {
                return Err(AppError::InvalidInput(
                    "fuel.quantity must be greater than zero".to_string(),
                ));
            }
            let rate = current_price_per_litre(&state.rates, order.fuel_type.trim()).ok();
            Some(FuelDetails {
                fuel_type: order.fuel_type.trim().to_string(),
                quantity: order.quantity,
                rate,
            })
        }
        (ProviderCategory::FuelDelivery, None) => {
            return Err(AppError::InvalidInput(
                "fuel details are required for fuel delivery".to_string(),
            ));
        }
        (_, _) => None,
    };

    let distance_fee = estimate.distance_km * estimate.price_per_km;
    let now = Utc::now();
    let request = ServiceRequest {
        id: Uuid::new_v4(),
        customer_id: command.customer_id,
        provider_id: Some(command.provider_id),
        category: command.category,
        services,
        location: command.location,
        vehicle: command.vehicle,
        status: RequestStatus::Pending,
        pricing: Pricing {
            base_fee: estimate.base_fee,
            price_per_km: estimate.price_per_km,
            distance_metric: estimate.distance_km,
            distance_fee,
            material_cost: 0.0,
            total_amount: (estimate.base_fee + distance_fee).ceil(),
        },
        fuel_details,
        service_otp: None,
        otp_verified: false,
        assignee: None,
        bill: Vec::new(),
        bill_sent: false,
        payment_status: PaymentStatus::Unpaid,
        payment_id: None,
        cancellation_reason: None,
        timestamps: Timestamps::new(now),
        version: 0,
    };

    let provider_id = command.provider_id;
    state.requests.insert(request.clone(), |committed| {
        state.bus.publish(
            RoomId::Account(provider_id),
            BusEvent::NewRequest {
                request: committed.clone(),
            },
        );
    })?;

    info!(
        request_id = %request.id,
        customer_id = %request.customer_id,
        provider_id = %provider_id,
        category = request.category.label(),
        total_estimate = request.pricing.total_amount,
        "service request created"
    );

    Ok(request)
}

pub fn accept_request(
    state: &AppState,
    request_id: Uuid,
    command: AcceptCommand,
) -> Result<ServiceRequest, AppError> {
    let result = state
        .requests
        .transition(
            &request_id,
            |request| {
                ensure_status(request, &[RequestStatus::Pending], "accept")?;
                ensure_assigned_to(request, command.provider_id)?;

                request.provider_id = Some(command.provider_id);
                request.status = RequestStatus::Accepted;
                request.service_otp = Some(generate_otp());
                request.timestamps.accepted_at = Some(Utc::now());
                if command.assignee_name.is_some() || command.assignee_phone.is_some() {
                    request.assignee = Some(Assignee {
                        name: command.assignee_name.clone(),
                        phone: command.assignee_phone.clone(),
                    });
                }
                Ok(Outcome::Changed)
            },
            |committed| {
                state.bus.publish(
                    RoomId::Account(committed.customer_id),
                    BusEvent::RequestAccepted {
                        request: committed.clone(),
                    },
                );
                state.bus.publish(
                    RoomId::Request(committed.id),
                    BusEvent::status_changed(committed),
                );
            },
        )
        .map(|(request, _)| request);

    state.metrics.record_transition("accept", &result);
    if result.is_ok() {
        info!(request_id = %request_id, provider_id = %command.provider_id, "request accepted");
    }
    result
}

/// Starts the job once the customer's code matches.
///
/// There is no attempt limit or code expiry here; callers wanting lockout
/// must add it around this function.
pub fn verify_otp(state: &AppState, request_id: Uuid, code: &str) -> Result<VerifyOutcome, AppError> {
    let submitted = code.trim();

    let result = state.requests.transition(
        &request_id,
        |request| {
            if request.otp_verified {
                return Ok(Outcome::Unchanged);
            }
            ensure_status(request, &[RequestStatus::Accepted], "verify otp for")?;

            let stored = request.service_otp.as_deref().map(str::trim).unwrap_or_default();
            if stored.is_empty() || stored != submitted {
                return Err(AppError::InvalidOtp);
            }

            request.otp_verified = true;
            request.status = RequestStatus::InProgress;
            request.timestamps.otp_verified_at = Some(Utc::now());
            Ok(Outcome::Changed)
        },
        |committed| {
            state.bus.publish(
                RoomId::Request(committed.id),
                BusEvent::status_changed(committed),
            );
            state.bus.publish(
                RoomId::Account(committed.customer_id),
                BusEvent::OtpVerified {
                    request_id: committed.id,
                    message: "Your provider has verified the code and started the service"
                        .to_string(),
                },
            );
        },
    );

    state.metrics.record_transition("verify_otp", &result);
    let (request, outcome) = result?;

    let message = match outcome {
        Outcome::Changed => {
            info!(request_id = %request_id, "otp verified; service started");
            "OTP verified. Service started."
        }
        Outcome::Unchanged => "OTP already verified.",
    };

    Ok(VerifyOutcome {
        success: true,
        message: message.to_string(),
        request,
    })
}

pub fn send_bill(
    state: &AppState,
    request_id: Uuid,
    command: BillCommand,
) -> Result<ServiceRequest, AppError> {
    let result = state
        .requests
        .transition(
            &request_id,
            |request| {
                ensure_status(request, &[RequestStatus::InProgress], "bill")?;
                ensure_assigned_to(request, command.provider_id)?;

                let (material_cost, bill) = if request.category == ProviderCategory::FuelDelivery {
                    fuel_bill(state, request, command.quantity)?
                } else {
                    itemized_bill(&command.items)?
                };

                request.pricing.material_cost = material_cost;
                request.pricing.total_amount = final_total(&request.pricing, material_cost);
                request.bill = bill;
                request.bill_sent = true;
                Ok(Outcome::Changed)
            },
            |committed| {
                state.bus.publish(
                    RoomId::Account(committed.customer_id),
                    BusEvent::BillReceived {
                        request_id: committed.id,
                        pricing: committed.pricing.clone(),
                        bill: committed.bill.clone(),
                        fuel_details: committed.fuel_details.clone(),
                    },
                );
            },
        )
        .map(|(request, _)| request);

    state.metrics.record_transition("send_bill", &result);
    if let Ok(request) = &result {
        info!(
            request_id = %request_id,
            material_cost = request.pricing.material_cost,
            total_amount = request.pricing.total_amount,
            "bill sent"
        );
    }
    result
}

fn fuel_bill(
    state: &AppState,
    request: &mut ServiceRequest,
    quantity: Option<f64>,
) -> Result<(f64, Vec<BillItem>), AppError> {
    let request_id = request.id;
    let details = request.fuel_details.as_mut().ok_or_else(|| {
        AppError::InvalidInput(format!("request {request_id} has no fuel details"))
    })?;

    if let Some(quantity) = quantity {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(AppError::InvalidInput(
                "quantity must be greater than zero".to_string(),
            ));
        }
        details.quantity = quantity;
    }

    let price_per_litre = current_price_per_litre(&state.rates, &details.fuel_type)?;
    details.rate = Some(price_per_litre);

    let material_cost = details.quantity * price_per_litre;
    let line = BillItem {
        description: format!(
            "{} ({} L @ {}/L)",
            details.fuel_type, details.quantity, price_per_litre
        ),
        amount: material_cost,
    };

    Ok((material_cost, vec![line]))
}

fn itemized_bill(items: &[BillItem]) -> Result<(f64, Vec<BillItem>), AppError> {
    if items.is_empty() {
        return Err(AppError::InvalidInput(
            "bill must contain at least one item".to_string(),
        ));
    }

    for item in items {
        if item.description.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "bill item description cannot be empty".to_string(),
            ));
        }
        ensure_non_negative(item.amount, "bill item amount")?;
    }

    let material_cost = items.iter().map(|item| item.amount).sum();
    Ok((material_cost, items.to_vec()))
}

pub fn confirm_payment(
    state: &AppState,
    request_id: Uuid,
    callback: PaymentCallback,
) -> Result<ServiceRequest, AppError> {
    let result = confirm_payment_inner(state, request_id, callback);
    state.metrics.record_transition("confirm_payment", &result);
    result
}

fn confirm_payment_inner(
    state: &AppState,
    request_id: Uuid,
    callback: PaymentCallback,
) -> Result<ServiceRequest, AppError> {
    let gateway_status = parse_gateway_status(&callback.status)?;
    let payment_id = callback.payment_id.trim().to_string();
    if payment_id.is_empty() {
        return Err(AppError::InvalidInput("payment_id is required".to_string()));
    }

    let customer_id = state.requests.require(&request_id)?.customer_id;
    let customer_name = state
        .accounts
        .get(&customer_id)
        .map(|account| account.name.clone());

    let (request, outcome) = state.requests.transition(
        &request_id,
        |request| {
            let already_settled = request.status == RequestStatus::Completed
                && request.payment_status == PaymentStatus::Paid
                && request.payment_id.as_deref() == Some(payment_id.as_str());
            if already_settled {
                return Ok(Outcome::Unchanged);
            }

            ensure_status(request, &[RequestStatus::InProgress], "confirm payment for")?;
            if !request.bill_sent {
                return Err(AppError::StateConflict(format!(
                    "request {} has no bill to pay",
                    request.id
                )));
            }

            request.payment_id = Some(payment_id.clone());
            match gateway_status {
                GatewayStatus::Succeeded => {
                    request.payment_status = PaymentStatus::Paid;
                    request.status = RequestStatus::Completed;
                    request.timestamps.completed_at = Some(Utc::now());
                }
                GatewayStatus::Failed => {
                    request.payment_status = PaymentStatus::Failed;
                }
            }
            Ok(Outcome::Changed)
        },
        |committed| {
            if committed.status != RequestStatus::Completed {
                return;
            }
            if let Some(provider_id) = committed.provider_id {
                state.bus.publish(
                    RoomId::Account(provider_id),
                    BusEvent::PaymentConfirmed {
                        request_id: committed.id,
                        customer_id: committed.customer_id,
                        customer_name: customer_name.clone(),
                        payment_id: committed.payment_id.clone(),
                        total_amount: committed.pricing.total_amount,
                    },
                );
            }
            state.bus.publish(
                RoomId::Request(committed.id),
                BusEvent::status_changed(committed),
            );
        },
    )?;

    if outcome == Outcome::Changed {
        info!(
            request_id = %request_id,
            payment_status = ?request.payment_status,
            status = ?request.status,
            "payment callback applied"
        );
    }
    Ok(request)
}

pub fn cancel_request(
    state: &AppState,
    request_id: Uuid,
    command: CancelCommand,
) -> Result<ServiceRequest, AppError> {
    let reason = command
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or(DEFAULT_CANCEL_REASON)
        .to_string();

    let result = state
        .requests
        .transition(
            &request_id,
            |request| {
                ensure_status(request, CANCELLABLE, "cancel")?;
                ensure_assigned_to(request, command.provider_id)?;

                request.status = RequestStatus::Cancelled;
                request.cancellation_reason = Some(reason.clone());
                request.timestamps.completed_at = Some(Utc::now());
                Ok(Outcome::Changed)
            },
            |committed| {
                state.bus.publish(
                    RoomId::Account(committed.customer_id),
                    BusEvent::RequestCancelled {
                        request_id: committed.id,
                        reason: reason.clone(),
                    },
                );
                state.bus.publish(
                    RoomId::Request(committed.id),
                    BusEvent::status_changed(committed),
                );
            },
        )
        .map(|(request, _)| request);

    state.metrics.record_transition("cancel", &result);
    if result.is_ok() {
        info!(request_id = %request_id, reason = %reason, "request cancelled");
    }
    result
}

/// Manual completion for jobs that skip itemized billing.
pub fn complete_request(state: &AppState, request_id: Uuid) -> Result<ServiceRequest, AppError> {
    let result = state
        .requests
        .transition(
            &request_id,
            |request| {
                ensure_status(request, MANUALLY_COMPLETABLE, "complete")?;
                if request.category == ProviderCategory::FuelDelivery {
                    return Err(AppError::InvalidInput(
                        "fuel delivery requests are completed through billing and payment"
                            .to_string(),
                    ));
                }

                request.pricing.total_amount = manual_completion_total(&request.pricing);
                request.status = RequestStatus::Completed;
                request.timestamps.completed_at = Some(Utc::now());
                Ok(Outcome::Changed)
            },
            |committed| {
                state.bus.publish(
                    RoomId::Request(committed.id),
                    BusEvent::status_changed(committed),
                );
            },
        )
        .map(|(request, _)| request);

    state.metrics.record_transition("complete", &result);
    if let Ok(request) = &result {
        info!(
            request_id = %request_id,
            total_amount = request.pricing.total_amount,
            "request completed manually"
        );
    }
    result
}

/// Moves an unanswered request to `Expired`. When to call this is up to the caller.
pub fn expire_request(state: &AppState, request_id: Uuid) -> Result<ServiceRequest, AppError> {
    let result = state
        .requests
        .transition(
            &request_id,
            |request| {
                ensure_status(request, &[RequestStatus::Pending], "expire")?;
                request.status = RequestStatus::Expired;
                Ok(Outcome::Changed)
            },
            |committed| {
                state.bus.publish(
                    RoomId::Request(committed.id),
                    BusEvent::status_changed(committed),
                );
            },
        )
        .map(|(request, _)| request);

    state.metrics.record_transition("expire", &result);
    if result.is_ok() {
        info!(request_id = %request_id, "request expired");
    }
    result
}
