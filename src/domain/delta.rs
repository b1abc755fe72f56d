//! Delta classification: the signed contribution each transaction kind makes
//! to a balance, and the netting of those contributions over a window.

use bigdecimal::BigDecimal;
use serde::Serialize;

use super::transaction::{Transaction, TransactionKind};

impl TransactionKind {
    pub fn is_credit(&self) -> bool {
        match self {
            TransactionKind::Deposit
            | TransactionKind::GameWin
            | TransactionKind::Bonus
            | TransactionKind::Refund => true,
            TransactionKind::Withdrawal | TransactionKind::GameLoss => false,
        }
    }

    pub fn signed(&self, amount: &BigDecimal) -> BigDecimal {
        if self.is_credit() {
            amount.clone()
        } else {
            -amount.clone()
        }
    }
}

/// Net signed sum of the COMPLETED transactions in `transactions`.
///
/// Callers already filter on status at the store; rows in any other status are
/// skipped here as well so that a PENDING or FAILED row can never move a
/// balance.
pub fn net_delta<'a, I>(transactions: I) -> BigDecimal
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .filter(|tx| tx.is_completed())
        .fold(BigDecimal::from(0), |acc, tx| acc + tx.kind.signed(&tx.amount))
}

/// Unsigned totals per transaction kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindTotals {
    pub deposits: BigDecimal,
    pub withdrawals: BigDecimal,
    pub wins: BigDecimal,
    pub losses: BigDecimal,
    pub bonuses: BigDecimal,
    pub refunds: BigDecimal,
}

impl Default for KindTotals {
    fn default() -> Self {
        Self {
            deposits: BigDecimal::from(0),
            withdrawals: BigDecimal::from(0),
            wins: BigDecimal::from(0),
            losses: BigDecimal::from(0),
            bonuses: BigDecimal::from(0),
            refunds: BigDecimal::from(0),
        }
    }
}

impl KindTotals {
    pub fn from_transactions<'a, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut totals = Self::default();
        for tx in transactions.into_iter().filter(|tx| tx.is_completed()) {
            totals.add(tx.kind, &tx.amount);
        }
        totals
    }

    pub fn add(&mut self, kind: TransactionKind, amount: &BigDecimal) {
        let slot = match kind {
            TransactionKind::Deposit => &mut self.deposits,
            TransactionKind::Withdrawal => &mut self.withdrawals,
            TransactionKind::GameWin => &mut self.wins,
            TransactionKind::GameLoss => &mut self.losses,
            TransactionKind::Bonus => &mut self.bonuses,
            TransactionKind::Refund => &mut self.refunds,
        };
        *slot += amount.clone();
    }

    /// Same result as [`net_delta`] over the transactions that built these totals.
    pub fn net(&self) -> BigDecimal {
        self.deposits.clone() + self.wins.clone() + self.bonuses.clone() + self.refunds.clone()
            - self.withdrawals.clone()
            - self.losses.clone()
    }
}
