use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;

use crate::domain::{SettlementNotification, Transaction};
use crate::error::AppError;
use crate::services::NewDeposit;
use crate::validation::validate_user_id;
use crate::AppState;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";
pub const PAYMENT_HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub user_id: String,
    pub amount: BigDecimal,
}

/// Gateway signature: hex HMAC-SHA512 over the payload re-serialised the way
/// the gateway's `JSON.stringify` writes it, with keys sorted.
pub fn sign_payload(secret: &str, payload: &Value) -> Result<String, AppError> {
    let mut mac = new_mac(secret)?;
    mac.update(&canonical_json(payload)?);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, payload: &Value, signature: &str) -> Result<(), AppError> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| AppError::Unauthorized("invalid signature format".to_string()))?;

    let mut mac = new_mac(secret)?;
    mac.update(&canonical_json(payload)?);

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| AppError::Unauthorized("signature verification failed".to_string()))
}

fn new_mac(secret: &str) -> Result<HmacSha512, AppError> {
    HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvariantViolation("invalid payment IPN secret".to_string()))
}

fn canonical_json(payload: &Value) -> Result<Vec<u8>, AppError> {
    let mut out = String::new();
    write_canonical(&mut out, payload)?;
    Ok(out.into_bytes())
}

// `serde_json::Map` iterates in key order, which gives the sorted form.
fn write_canonical(out: &mut String, value: &Value) -> Result<(), AppError> {
    match value {
        Value::Number(number) if number.is_f64() => match number.as_f64() {
            Some(float) => out.push_str(&js_number(float)),
            None => out.push_str(&number.to_string()),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&to_json(key)?);
                out.push(':');
                write_canonical(out, item)?;
            }
            out.push('}');
        }
        other => out.push_str(&to_json(other)?),
    }
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Validation(format!("payload cannot be serialised: {}", e)))
}

/// Formats a float like JavaScript's `Number.prototype.toString`: `1` not
/// `1.0`, plain notation from 1e-6 up to 1e21, `1e+21` style beyond.
fn js_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    // `{:e}` gives the shortest round-tripping digits, e.g. "1.2345e3".
    let scientific = format!("{:e}", value.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };
    let digits: String = mantissa.chars().filter(|ch| *ch != '.').collect();
    let k = digits.len() as i32;
    let n = exponent + 1;

    let body = if k <= n && n <= 21 {
        format!("{}{}", digits, "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let (head, tail) = digits.split_at(1);
        let sign = if n - 1 < 0 { '-' } else { '+' };
        if tail.is_empty() {
            format!("{}e{}{}", head, sign, (n - 1).abs())
        } else {
            format!("{}.{}e{}{}", head, tail, sign, (n - 1).abs())
        }
    };

    if value < 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(deposit): Json<NewDeposit>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.recorder.record_pending_deposit(deposit).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Json(request): Json<WithdrawalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .recorder
        .record_withdrawal(&request.user_id, request.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Settlement notification from the payment gateway. In-flight statuses are
/// acknowledged without touching the ledger.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid JSON body: {}", e)))?;

    if let Some(secret) = state.ipn_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", SIGNATURE_HEADER)))?;
        if let Err(e) = verify_signature(secret, &payload, signature) {
            tracing::warn!(error = %e, "Payment webhook rejected");
            return Err(e);
        }
    }

    let Some(notification) = SettlementNotification::from_gateway_payload(payload)? else {
        tracing::debug!("Payment webhook carries an in-flight status; nothing to settle");
        return Ok(Json(WebhookResponse {
            status: "ignored",
            transaction: None,
        }));
    };

    let result = state.reconciler.apply_settlement(notification).await?;
    Ok(Json(WebhookResponse {
        status: if result.applied { "applied" } else { "duplicate" },
        transaction: Some(result.transaction),
    }))
}

pub async fn transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    let rows = state
        .resolver
        .recent_transactions(&user_id, PAYMENT_HISTORY_LIMIT)
        .await?;
    Ok(Json(rows))
}
