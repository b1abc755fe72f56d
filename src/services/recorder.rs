use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{GameResult, Transaction, TransactionKind};
use crate::error::AppError;
use crate::ports::{RepositoryError, TransactionRepository};
use crate::services::locks::UserLocks;
use crate::services::resolver::BalanceResolver;
use crate::validation::{
    sanitize_string, validate_amount_precision, validate_currency, validate_dice_face,
    validate_external_ref, validate_positive_amount, validate_user_id, ValidationError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewDeposit {
    pub user_id: String,
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub external_payment_ref: String,
    pub payment_url: Option<String>,
}

/// A settled dice round as reported by the game engine.
#[derive(Debug, Clone, Deserialize)]
pub struct GameOutcome {
    pub user_id: String,
    pub bet_amount: BigDecimal,
    pub prediction: i16,
    pub rolled: i16,
    pub payout: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedGame {
    pub game: GameResult,
    pub transaction: Transaction,
    /// Balance right after this outcome, as the resolver would report it.
    pub new_balance: BigDecimal,
}

/// Append path used by producers. Every debit is checked against the balance
/// the resolver serves, under the same per-user lock the aggregator takes.
pub struct TransactionRecorder {
    transactions: Arc<dyn TransactionRepository>,
    resolver: Arc<BalanceResolver>,
    locks: UserLocks,
    clock: Arc<dyn Clock>,
}

impl TransactionRecorder {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        resolver: Arc<BalanceResolver>,
        locks: UserLocks,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions,
            resolver,
            locks,
            clock,
        }
    }

    /// Inserts a PENDING deposit awaiting settlement by the payment provider.
    pub async fn record_pending_deposit(&self, deposit: NewDeposit) -> Result<Transaction, AppError> {
        validate_user_id(&deposit.user_id)?;
        validate_positive_amount(&deposit.amount)?;
        let reference = sanitize_string(&deposit.external_payment_ref);
        validate_external_ref(&reference)?;
        let currency = deposit
            .currency
            .as_deref()
            .map(|c| sanitize_string(c).to_ascii_uppercase());
        if let Some(currency) = &currency {
            validate_currency(currency)?;
        }

        let tx = Transaction::new(
            deposit.user_id,
            TransactionKind::Deposit,
            deposit.amount,
            self.clock.now(),
        )
        .with_external_ref(reference.clone())
        .with_currency(currency)
        .with_payment_url(deposit.payment_url)
        .with_description("Crypto deposit");

        let stored = self.transactions.insert(&tx).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AppError::Validation(format!(
                "payment reference '{}' is already recorded",
                reference
            )),
            other => other.into(),
        })?;

        tracing::info!(
            transaction_id = %stored.id,
            user_id = %stored.user_id,
            external_ref = %reference,
            amount = %stored.amount,
            "Pending deposit recorded"
        );
        Ok(stored)
    }

    /// Stores the game result and exactly one COMPLETED transaction: a
    /// GAME_WIN for the payout when it is positive, else a GAME_LOSS for the bet.
    pub async fn record_game_outcome(&self, outcome: GameOutcome) -> Result<RecordedGame, AppError> {
        validate_user_id(&outcome.user_id)?;
        validate_positive_amount(&outcome.bet_amount)?;
        validate_dice_face("prediction", outcome.prediction)?;
        validate_dice_face("rolled", outcome.rolled)?;
        let zero = BigDecimal::from(0);
        if outcome.payout < zero {
            return Err(ValidationError::new("payout", "must not be negative").into());
        }
        validate_amount_precision("payout", &outcome.payout)?;

        let _guard = self.locks.acquire(&outcome.user_id).await;
        let available = self.ensure_funds(&outcome.user_id, &outcome.bet_amount).await?;

        let now = self.clock.now();
        let is_win = outcome.payout > zero;
        let (kind, amount, description) = if is_win {
            (
                TransactionKind::GameWin,
                outcome.payout.clone(),
                format!("Dice win (rolled {})", outcome.rolled),
            )
        } else {
            (
                TransactionKind::GameLoss,
                outcome.bet_amount.clone(),
                format!("Dice loss (rolled {})", outcome.rolled),
            )
        };

        let game = GameResult {
            id: Uuid::new_v4(),
            user_id: outcome.user_id.clone(),
            bet_amount: outcome.bet_amount,
            prediction: outcome.prediction,
            rolled: outcome.rolled,
            payout: outcome.payout,
            is_win,
            created_at: now,
        };
        let tx = Transaction::new(outcome.user_id, kind, amount, now).with_description(description);
        let transaction = self.transactions.insert_game_outcome(&game, &tx).await?;
        let new_balance = available + transaction.kind.signed(&transaction.amount);

        tracing::info!(
            user_id = %game.user_id,
            game_id = %game.id,
            kind = %transaction.kind,
            amount = %transaction.amount,
            new_balance = %new_balance,
            "Game outcome recorded"
        );
        Ok(RecordedGame {
            game,
            transaction,
            new_balance,
        })
    }

    pub async fn record_withdrawal(
        &self,
        user_id: &str,
        amount: BigDecimal,
    ) -> Result<Transaction, AppError> {
        validate_user_id(user_id)?;
        validate_positive_amount(&amount)?;

        let _guard = self.locks.acquire(user_id).await;
        self.ensure_funds(user_id, &amount).await?;

        let tx = Transaction::new(
            user_id.to_string(),
            TransactionKind::Withdrawal,
            amount,
            self.clock.now(),
        );
        let stored = self.transactions.insert(&tx).await?;
        tracing::info!(user_id = %user_id, amount = %stored.amount, "Withdrawal recorded");
        Ok(stored)
    }

    /// Credits a BONUS or REFUND. Other kinds have their own entry points.
    pub async fn record_credit(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        if !matches!(kind, TransactionKind::Bonus | TransactionKind::Refund) {
            return Err(ValidationError::new("kind", "must be BONUS or REFUND").into());
        }
        validate_user_id(user_id)?;
        validate_positive_amount(&amount)?;

        let mut tx = Transaction::new(user_id.to_string(), kind, amount, self.clock.now());
        if let Some(description) = description {
            tx = tx.with_description(sanitize_string(&description));
        }

        let _guard = self.locks.acquire(user_id).await;
        let stored = self.transactions.insert(&tx).await?;
        tracing::info!(user_id = %user_id, kind = %kind, amount = %stored.amount, "Credit recorded");
        Ok(stored)
    }

    /// Returns the available balance when it covers `required`.
    async fn ensure_funds(&self, user_id: &str, required: &BigDecimal) -> Result<BigDecimal, AppError> {
        let available = self.resolver.current_balance(user_id).await?;
        if &available < required {
            tracing::debug!(
                user_id = %user_id,
                available = %available,
                required = %required,
                "Insufficient balance"
            );
            return Err(AppError::InsufficientBalance {
                available,
                required: required.clone(),
            });
        }
        Ok(available)
    }
}
