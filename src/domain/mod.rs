//! Framework-agnostic ledger entities and the pure rules over them.

pub mod day;
pub mod delta;
pub mod game;
pub mod settlement;
pub mod snapshot;
pub mod transaction;

pub use day::DayWindow;
pub use delta::{net_delta, KindTotals};
pub use game::{GameResult, GameStats};
pub use settlement::{SettlementNotification, SettlementOutcome};
pub use snapshot::BalanceSnapshot;
pub use transaction::{Transaction, TransactionKind, TransactionStatus, UnknownVariant};
