use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{BalanceSnapshot, TransactionKind};
use crate::error::AppError;
use crate::services::TriggerReport;
use crate::validation::{parse_date, validate_user_id, ValidationError};
use crate::AppState;

pub const DEFAULT_HISTORY_DAYS: i64 = 30;

#[derive(Debug, Serialize)]
pub struct CurrentBalanceResponse {
    pub user_id: String,
    pub balance: BigDecimal,
    pub as_of: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub days: i64,
    pub history: Vec<BalanceSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct RecalculateResponse {
    pub report: TriggerReport,
    pub current_balance: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateQuery {
    pub user_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

fn optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    raw.filter(|d| !d.trim().is_empty())
        .map(|d| parse_date("date", d))
        .transpose()
}

pub async fn current(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    let balance = state.resolver.current_balance(&user_id).await?;

    Ok(Json(CurrentBalanceResponse {
        user_id,
        balance,
        as_of: state.resolver.today(),
    }))
}

pub async fn detailed(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    Ok(Json(state.resolver.detailed_balance(&user_id).await?))
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    let days = match query.days.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_HISTORY_DAYS,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ValidationError::new("days", "must be a number between 1 and 365"))?,
    };

    let history = state.resolver.balance_history(&user_id, days).await?;
    Ok(Json(HistoryResponse {
        user_id,
        days,
        history,
    }))
}

pub async fn today_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    Ok(Json(state.resolver.today_transactions(&user_id).await?))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    Ok(Json(state.resolver.user_stats(&user_id).await?))
}

/// Manual trigger: every active user for the date, or just `userId`.
pub async fn calculate(
    State(state): State<AppState>,
    Query(query): Query<CalculateQuery>,
) -> Result<impl IntoResponse, AppError> {
    let date = optional_date(query.date.as_deref())?;
    let user_id = query.user_id.as_deref().filter(|u| !u.is_empty());

    let report = state.scheduler.trigger(user_id, date).await?;
    Ok(Json(report))
}

pub async fn recalculate(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<impl IntoResponse, AppError> {
    validate_user_id(&user_id)?;
    let date = optional_date(query.date.as_deref())?;

    let report = state.scheduler.trigger(Some(&user_id), date).await?;
    let current_balance = state.resolver.current_balance(&user_id).await?;
    Ok(Json(RecalculateResponse {
        report,
        current_balance,
    }))
}

pub async fn credit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<CreditRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .recorder
        .record_credit(&user_id, request.kind, request.amount, request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}
