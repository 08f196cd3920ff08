//! Background scheduler for history retention
//!
//! Periodically removes entries older than the configured retention window.
//! The first pass runs one interval after start; loading the history already
//! performs an initial cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::services::history::HistoryService;

/// Scheduler state for history retention
#[derive(Clone)]
pub struct RetentionSchedulerState {
    /// Whether the scheduler is running
    running: Arc<RwLock<bool>>,
    history: Arc<HistoryService>,
    period: Duration,
}

impl RetentionSchedulerState {
    fn new(history: Arc<HistoryService>, period: Duration) -> Self {
        Self {
            running: Arc::new(RwLock::new(true)),
            history,
            period,
        }
    }

    /// Check if the scheduler is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Stop the scheduler; takes effect at the next tick
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("History retention scheduler stop requested");
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Start the periodic retention task
pub fn start_retention_scheduler(
    history: Arc<HistoryService>,
    period: Duration,
) -> RetentionSchedulerState {
    let period = period.max(Duration::from_millis(1));
    let state = RetentionSchedulerState::new(history, period);

    let task_state = state.clone();
    tokio::spawn(async move {
        retention_task(task_state).await;
    });

    info!(
        "History retention scheduler started (interval: {}s)",
        period.as_secs()
    );
    state
}

async fn retention_task(state: RetentionSchedulerState) {
    let mut timer = interval_at(Instant::now() + state.period, state.period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if !*state.running.read().await {
            info!("History retention task stopping");
            break;
        }

        debug!("Running history retention pass");
        let removed = state.history.cleanup().await;
        if removed == 0 {
            debug!("No expired history entries");
        }
    }
}
