//! Transaction domain entity.
//! An append-only financial event. Only `status` and `webhook_received` change
//! after creation.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A stored string that does not name any variant of a closed domain enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {field} '{value}'")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    GameWin,
    GameLoss,
    Bonus,
    Refund,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 6] = [
        TransactionKind::Deposit,
        TransactionKind::Withdrawal,
        TransactionKind::GameWin,
        TransactionKind::GameLoss,
        TransactionKind::Bonus,
        TransactionKind::Refund,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdrawal => "WITHDRAWAL",
            TransactionKind::GameWin => "GAME_WIN",
            TransactionKind::GameLoss => "GAME_LOSS",
            TransactionKind::Bonus => "BONUS",
            TransactionKind::Refund => "REFUND",
        }
    }

    /// Deposits settle through the payment gateway; everything else is
    /// resolved internally at creation time.
    pub fn initial_status(&self) -> TransactionStatus {
        match self {
            TransactionKind::Deposit => TransactionStatus::Pending,
            _ => TransactionStatus::Completed,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                field: "transaction kind",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(UnknownVariant {
                field: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

/// Domain entity representing a ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub currency: Option<String>,
    pub external_payment_ref: Option<String>,
    pub payment_url: Option<String>,
    pub description: Option<String>,
    pub webhook_received: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        user_id: String,
        kind: TransactionKind,
        amount: BigDecimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            status: kind.initial_status(),
            currency: None,
            external_payment_ref: None,
            payment_url: None,
            description: None,
            webhook_received: false,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_external_ref(mut self, reference: String) -> Self {
        self.external_payment_ref = Some(reference);
        self
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_payment_url(mut self, payment_url: Option<String>) -> Self {
        self.payment_url = payment_url;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }
}
