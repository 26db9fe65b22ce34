//! Connectivity monitor and auto-sync scheduler.
//!
//! The host reports connectivity through a [`Connectivity`] handle. A
//! running [`Scheduler`] mirrors it into the engine's `online` flag, starts a
//! cycle whenever connectivity comes back, and starts one on every timer
//! tick. Cycles are awaited inside the scheduler task, so `stop` lets an
//! in-flight cycle finish.

use super::{SyncEngine, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Host-side connectivity source.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Report a connectivity change. Repeating the current state is a no-op.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    engine: Arc<SyncEngine>,
    connectivity: watch::Receiver<bool>,
    task: Option<RunningTask>,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, connectivity: watch::Receiver<bool>) -> Self {
        Self {
            engine,
            connectivity,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start auto-sync with the given timer period. Does nothing if already
    /// running.
    pub fn start(&mut self, interval: Duration) {
        if self.task.is_some() {
            tracing::debug!("Auto-sync already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.engine.clone(),
            self.connectivity.clone(),
            shutdown_rx,
            interval,
        ));
        tracing::info!(interval_secs = interval.as_secs_f64(), "Auto-sync started");
        self.task = Some(RunningTask { shutdown, handle });
    }

    /// Stop auto-sync, waiting for an in-flight cycle to finish.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            tracing::warn!("Auto-sync task ended abnormally: {}", e);
        }
        tracing::info!("Auto-sync stopped");
    }
}

async fn run(
    engine: Arc<SyncEngine>,
    mut connectivity: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
) {
    let online = *connectivity.borrow_and_update();
    engine.set_online(online);

    // The flag must follow the host while a cycle is running, so
    // connectivity is watched outside the loop that awaits cycles.
    let reconnected = Arc::new(Notify::new());
    let watcher = tokio::spawn(watch_connectivity(
        engine.clone(),
        connectivity,
        shutdown.clone(),
        reconnected.clone(),
    ));

    if online {
        run_cycle(&engine, "startup").await;
    }

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => run_cycle(&engine, "timer").await,
            _ = reconnected.notified() => run_cycle(&engine, "online").await,
        }
    }

    if let Err(e) = watcher.await {
        tracing::warn!("Connectivity watcher ended abnormally: {}", e);
    }
}

/// Mirror connectivity into the engine, signalling `reconnected` on every
/// transition to online.
async fn watch_connectivity(
    engine: Arc<SyncEngine>,
    mut connectivity: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
    reconnected: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = connectivity.changed() => {
                if changed.is_err() {
                    // Host dropped its handle; keep the last known state
                    break;
                }
                let online = *connectivity.borrow_and_update();
                if !engine.set_online(online) {
                    continue;
                }
                if online {
                    tracing::info!("Connectivity restored");
                    reconnected.notify_one();
                } else {
                    tracing::info!("Connectivity lost");
                }
            }
        }
    }
}

async fn run_cycle(engine: &SyncEngine, trigger: &'static str) {
    match engine.sync_all().await {
        SyncOutcome::Completed(report) if !report.is_clean() => {
            tracing::warn!(trigger, errors = ?report.errors, "Sync finished with failures");
        }
        SyncOutcome::Completed(_) => {}
        SyncOutcome::Skipped(reason) => tracing::debug!(trigger, ?reason, "Sync skipped"),
    }
}
