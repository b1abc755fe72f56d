//! Settlement notifications.
//! The gateway's free-form webhook body is narrowed to a tagged structure at the
//! boundary so that reconciliation never depends on the provider's wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::transaction::TransactionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Success,
    Failure,
}

impl SettlementOutcome {
    pub fn target_status(&self) -> TransactionStatus {
        match self {
            SettlementOutcome::Success => TransactionStatus::Completed,
            SettlementOutcome::Failure => TransactionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementNotification {
    pub external_ref: String,
    pub outcome: SettlementOutcome,
    pub raw_provider_payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("missing correlation field (invoice_id or order_id)")]
    MissingReference,
    #[error("missing payment_status")]
    MissingStatus,
    #[error("unknown payment_status '{0}'")]
    UnknownStatus(String),
}

/// What a gateway payment status means for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Terminal(SettlementOutcome),
    InFlight,
}

impl GatewayStatus {
    pub fn parse(status: &str) -> Result<Self, NotificationError> {
        match status {
            "finished" => Ok(GatewayStatus::Terminal(SettlementOutcome::Success)),
            "failed" | "expired" | "refunded" => {
                Ok(GatewayStatus::Terminal(SettlementOutcome::Failure))
            }
            "waiting" | "confirming" | "confirmed" | "sending" | "partially_paid" => {
                Ok(GatewayStatus::InFlight)
            }
            other => Err(NotificationError::UnknownStatus(other.to_string())),
        }
    }
}

impl SettlementNotification {
    /// Parses a payment-gateway IPN body.
    ///
    /// Returns `Ok(None)` for in-flight statuses, which carry no settlement.
    pub fn from_gateway_payload(payload: Value) -> Result<Option<Self>, NotificationError> {
        let object = payload.as_object().ok_or(NotificationError::NotAnObject)?;

        let external_ref = ["invoice_id", "order_id"]
            .iter()
            .find_map(|key| object.get(*key).and_then(reference_text))
            .ok_or(NotificationError::MissingReference)?;

        let status = object
            .get("payment_status")
            .and_then(Value::as_str)
            .ok_or(NotificationError::MissingStatus)?;

        match GatewayStatus::parse(status)? {
            GatewayStatus::InFlight => Ok(None),
            GatewayStatus::Terminal(outcome) => Ok(Some(Self {
                external_ref,
                outcome,
                raw_provider_payload: payload,
            })),
        }
    }
}

// Gateways send ids both as JSON numbers and as strings.
fn reference_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
