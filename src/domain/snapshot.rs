use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Closing balance of one user at the end of one UTC day.
/// Keyed by `(user_id, date)`; written only by the daily aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub user_id: String,
    pub date: NaiveDate,
    pub balance: BigDecimal,
    pub updated_at: DateTime<Utc>,
}
