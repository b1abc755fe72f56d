use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one dice round as reported by the game engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub id: Uuid,
    pub user_id: String,
    pub bet_amount: BigDecimal,
    pub prediction: i16,
    pub rolled: i16,
    pub payout: BigDecimal,
    pub is_win: bool,
    pub created_at: DateTime<Utc>,
}

/// Lifetime aggregates over a user's game results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStats {
    pub games_played: i64,
    pub total_bet_amount: BigDecimal,
    pub total_payout: BigDecimal,
}

impl Default for GameStats {
    fn default() -> Self {
        Self {
            games_played: 0,
            total_bet_amount: BigDecimal::from(0),
            total_payout: BigDecimal::from(0),
        }
    }
}
