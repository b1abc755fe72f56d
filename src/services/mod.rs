pub mod aggregator;
pub mod locks;
pub mod reconciler;
pub mod recorder;
pub mod resolver;
pub mod scheduler;
pub mod snapshot_writer;

pub use aggregator::DailyAggregator;
pub use locks::UserLocks;
pub use reconciler::{SettlementReconciler, SettlementResult};
pub use recorder::{GameOutcome, NewDeposit, RecordedGame, TransactionRecorder};
pub use resolver::{BalanceResolver, DetailedBalance, HistoryEntry, UserBalanceStats};
pub use scheduler::{BatchScheduler, TriggerReport, UserFailure};
pub use snapshot_writer::SnapshotWriter;
