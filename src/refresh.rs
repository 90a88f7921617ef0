//! Background status polling and scheduled refresh
//!
//! `RefreshHandle` owns two tokio tasks: one recomputes the cache status on a
//! fixed interval, the other waits for the configured daily refresh time and
//! runs a full refresh. Updates are sent over a channel to the owner. Every
//! await in the tasks also watches for shutdown, so `shutdown()` returns even
//! if the owner never drains the channel. Dropping the handle aborts them.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::orchestrator::CacheOrchestrator;
use crate::schedule::next_occurrence;
use crate::status::CacheStatusReport;

/// Messages sent from the background tasks to the owner
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// Periodic status recomputation
    StatusUpdated(CacheStatusReport),
    /// The scheduled daily refresh began
    ScheduledRefreshStarted,
    /// The scheduled daily refresh finished
    ScheduledRefreshCompleted {
        success: bool,
        error: Option<String>,
    },
}

/// Configuration for the background tasks
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between status recomputations
    pub poll_interval: Duration,
    /// Whether to run the scheduled refresh task at all
    pub scheduled_refresh: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60), // once per minute
            scheduled_refresh: true,
        }
    }
}

/// Handle for controlling the background tasks
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns the polling task and, if enabled, the scheduled refresh task
    pub fn spawn(orchestrator: Arc<CacheOrchestrator>, config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![tokio::spawn(poll_status(
            orchestrator.clone(),
            config.poll_interval,
            msg_tx.clone(),
            shutdown_rx.clone(),
        ))];
        if config.scheduled_refresh {
            tasks.push(tokio::spawn(run_schedule(
                orchestrator,
                config.poll_interval,
                msg_tx,
                shutdown_rx,
            )));
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
            tasks,
        }
    }

    /// Signals the tasks to stop and waits for them to exit
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn poll_status(
    orchestrator: Arc<CacheOrchestrator>,
    poll_interval: Duration,
    tx: mpsc::Sender<RefreshMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = orchestrator.get_status();
                if !deliver(&tx, RefreshMessage::StatusUpdated(report), &mut shutdown_rx).await {
                    break;
                }
            }
            _ = shutdown_rx.changed() => {
                break;
            }
        }
    }
    debug!("Status polling stopped");
}

/// Sends `message` unless shutdown is signalled first
///
/// # Returns
/// `false` when the task should stop: shutdown was requested or the owner
/// hung up.
async fn deliver(
    tx: &mpsc::Sender<RefreshMessage>,
    message: RefreshMessage,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        sent = tx.send(message) => sent.is_ok(),
        _ = shutdown_rx.changed() => false,
    }
}

/// How long to sleep before checking the schedule again
///
/// Capped so config changes are picked up within one poll interval.
fn wait_before_check(target: Option<NaiveDateTime>, now: NaiveDateTime, cap: Duration) -> Duration {
    match target {
        Some(target) => (target - now)
            .to_std()
            .map(|until| until.min(cap))
            .unwrap_or(Duration::ZERO),
        None => cap,
    }
}

async fn run_schedule(
    orchestrator: Arc<CacheOrchestrator>,
    check_interval: Duration,
    tx: mpsc::Sender<RefreshMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let now = orchestrator.local_now();
        let target = next_occurrence(&orchestrator.config().get(), now).next_refresh;
        let wait = wait_before_check(target, now, check_interval);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown_rx.changed() => break,
        }

        let Some(target) = target else {
            continue;
        };
        if orchestrator.local_now() < target {
            continue;
        }

        info!(scheduled_for = %target, "Running scheduled cache refresh");
        if !deliver(&tx, RefreshMessage::ScheduledRefreshStarted, &mut shutdown_rx).await {
            break;
        }
        let result = tokio::select! {
            result = orchestrator.refresh_all() => result,
            _ = shutdown_rx.changed() => break,
        };
        let completed = RefreshMessage::ScheduledRefreshCompleted {
            success: result.success,
            error: result.error,
        };
        if !deliver(&tx, completed, &mut shutdown_rx).await {
            break;
        }
    }
    debug!("Scheduled refresh stopped");
}
