//! Business logic services

pub mod environment;
pub mod events;
pub mod export;
pub mod history;
pub mod history_log;
pub mod retention_scheduler;
pub mod sanitizer;

pub use environment::{EnvironmentInfo, FixedEnvironment, NoEnvironment, RequestEnvironment};
pub use events::{EventKind, EventNotifier, HistoryEvent, SubscriptionId};
pub use export::{CsvOptions, ExportFormat};
pub use history::{load_snapshot, HistoryService, Recorded, PAGE_HELPER_SIZE};
pub use history_log::{HistoryLimits, HistoryLog};
pub use retention_scheduler::{start_retention_scheduler, RetentionSchedulerState};
