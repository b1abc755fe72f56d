use serde::Serialize;
use std::sync::Arc;

use crate::domain::{SettlementNotification, Transaction};
use crate::error::AppError;
use crate::ports::TransactionRepository;
use crate::validation::validate_external_ref;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementResult {
    pub transaction: Transaction,
    /// False when the notification was a duplicate and changed nothing.
    pub applied: bool,
}

/// Moves PENDING transactions to their terminal status when the payment
/// provider reports an outcome. The PENDING guard lives in the store, so
/// duplicate or concurrent notifications for one reference are harmless.
pub struct SettlementReconciler {
    transactions: Arc<dyn TransactionRepository>,
}

impl SettlementReconciler {
    pub fn new(transactions: Arc<dyn TransactionRepository>) -> Self {
        Self { transactions }
    }

    pub async fn apply_settlement(
        &self,
        notification: SettlementNotification,
    ) -> Result<SettlementResult, AppError> {
        validate_external_ref(&notification.external_ref)?;
        let reference = notification.external_ref.as_str();
        let target = notification.outcome.target_status();

        let existing = self
            .transactions
            .find_by_external_ref(reference)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no transaction for payment reference '{}'", reference))
            })?;

        if existing.status.is_terminal() {
            self.log_duplicate(&existing, &notification);
            return Ok(SettlementResult {
                transaction: existing,
                applied: false,
            });
        }

        match self.transactions.update_status(existing.id, target, true).await? {
            Some(updated) => {
                tracing::info!(
                    transaction_id = %updated.id,
                    user_id = %updated.user_id,
                    external_ref = %reference,
                    status = %updated.status,
                    amount = %updated.amount,
                    "Settlement applied"
                );
                Ok(SettlementResult {
                    transaction: updated,
                    applied: true,
                })
            }
            None => {
                // Another notification settled the row between our read and write.
                let current = self
                    .transactions
                    .find_by_external_ref(reference)
                    .await?
                    .ok_or_else(|| {
                        AppError::InvariantViolation(format!(
                            "transaction for '{}' vanished during settlement",
                            reference
                        ))
                    })?;
                self.log_duplicate(&current, &notification);
                Ok(SettlementResult {
                    transaction: current,
                    applied: false,
                })
            }
        }
    }

    fn log_duplicate(&self, stored: &Transaction, notification: &SettlementNotification) {
        let requested = notification.outcome.target_status();
        if stored.status == requested {
            tracing::debug!(
                transaction_id = %stored.id,
                external_ref = %notification.external_ref,
                status = %stored.status,
                "Duplicate settlement ignored"
            );
        } else {
            tracing::warn!(
                transaction_id = %stored.id,
                external_ref = %notification.external_ref,
                stored = %stored.status,
                requested = %requested,
                "Conflicting settlement ignored; transaction already terminal"
            );
        }
    }
}
