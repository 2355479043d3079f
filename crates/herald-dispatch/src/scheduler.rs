//! Periodic dispatch driver

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::worker::{DispatchCycle, DispatchWorker};

/// Longest accepted tick period
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
const MIN_INTERVAL: Duration = Duration::from_millis(1);

enum SchedulerState {
    Stopped,
    Running { shutdown_tx: oneshot::Sender<()> },
}

/// Runs one dispatch cycle on start and one per tick after that.
///
/// Cycles are not serialized: a slow cycle can overlap the next one.
pub struct Scheduler {
    worker: DispatchWorker,
    interval: Duration,
    state: Mutex<SchedulerState>,
    observer: Option<mpsc::UnboundedSender<DispatchCycle>>,
}

impl Scheduler {
    /// `interval` is clamped to `1ms..=MAX_INTERVAL`.
    pub fn new(worker: DispatchWorker, interval: Duration) -> Self {
        let clamped = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        if clamped != interval {
            warn!(
                requested_ms = interval.as_millis() as u64,
                interval_ms = clamped.as_millis() as u64,
                "Scheduler interval out of range, clamped"
            );
        }
        let interval = clamped;

        Self {
            worker,
            interval,
            state: Mutex::new(SchedulerState::Stopped),
            observer: None,
        }
    }

    /// Hand every launched cycle to `observer` instead of detaching it
    pub fn with_cycle_observer(mut self, observer: mpsc::UnboundedSender<DispatchCycle>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn batch_size(&self) -> u32 {
        self.worker.config().batch_size
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), SchedulerState::Running { .. })
    }

    /// Start the periodic loop. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SchedulerState::Running { .. }) {
            warn!("Scheduler already running");
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *state = SchedulerState::Running { shutdown_tx };

        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size(),
            "Scheduler started"
        );

        spawn_cycle(self.worker.clone(), self.observer.clone());

        let worker = self.worker.clone();
        let observer = self.observer.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        spawn_cycle(worker.clone(), observer.clone());
                    }
                }
            }
            info!("Scheduler loop exited");
        });

        true
    }

    /// Stop the periodic loop. Returns `false` if it was not running.
    ///
    /// Cycles already in flight are left to finish.
    pub fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), SchedulerState::Stopped);
        match previous {
            SchedulerState::Running { shutdown_tx } => {
                let _ = shutdown_tx.send(());
                info!("Scheduler stopped");
                true
            }
            SchedulerState::Stopped => {
                warn!("Scheduler not running");
                false
            }
        }
    }
}

fn spawn_cycle(worker: DispatchWorker, observer: Option<mpsc::UnboundedSender<DispatchCycle>>) {
    tokio::spawn(async move {
        match worker.process_batch().await {
            Ok(cycle) => {
                if let Some(observer) = observer {
                    let _ = observer.send(cycle);
                }
            }
            Err(e) => {
                error!(error = %e, "Dispatch cycle failed");
            }
        }
    });
}
