/// scheduler.rs – Owned refresh loop driving the aggregator.
///
/// Lifecycle: `Idle --start()--> Polling --stop()--> Stopped`.
///  - `start()` fires one full entity + chart batch immediately, then one per period
///  - a timeframe change re-fetches only that chart kind, without touching the timer phase
///  - `stop()` disarms the timer; batches still in flight are dropped before they
///    reach the state
///
/// Batches are spawned rather than awaited inline, so a slow backend never
/// delays the next tick. There is no retry or backoff: every tick stands alone.
use anyhow::{bail, Result};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::aggregator::{apply_charts, apply_entities, Aggregator};
use crate::gateway::Transport;
use crate::models::{AppState, ChartKind, Timeframe};

pub type SharedState = Arc<RwLock<AppState>>;

pub fn read_state(state: &SharedState) -> RwLockReadGuard<'_, AppState> {
    state.read().unwrap_or_else(|e| e.into_inner())
}

pub fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, AppState> {
    state.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
enum Trigger {
    /// Entities and every chart.
    Full,
    /// Only the listed chart kinds, each on its current timeframe.
    Charts(Vec<ChartKind>),
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<T> {
    aggregator: Arc<Aggregator<T>>,
    state: SharedState,
    period: Duration,
    phase: Phase,
    stop_tx: watch::Sender<bool>,
    trigger_tx: Option<mpsc::UnboundedSender<Trigger>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> Scheduler<T> {
    /// Each scheduler owns a fresh `AppState`; nothing is shared with other
    /// instances.
    pub fn new(aggregator: Arc<Aggregator<T>>, period: Duration, timeframe: Timeframe) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            aggregator,
            state: Arc::new(RwLock::new(AppState::with_timeframe(timeframe))),
            period,
            phase: Phase::Idle,
            stop_tx,
            trigger_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Idle {
            bail!("scheduler can only start from Idle (currently {:?})", self.phase);
        }
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            aggregator: Arc::clone(&self.aggregator),
            state: Arc::clone(&self.state),
            stop: self.stop_tx.subscribe(),
        };
        self.handle = Some(tokio::spawn(run_loop(worker, self.period, trigger_rx)));
        self.trigger_tx = Some(trigger_tx);
        self.phase = Phase::Polling;
        info!(
            "Refresh scheduler started (every {:.1}s against {})",
            self.period.as_secs_f64(),
            self.aggregator.gateway().base_url()
        );
        Ok(())
    }

    /// Select a new timeframe for one chart kind and re-fetch just that kind.
    /// Returns `false` if the timeframe was already selected.
    pub fn set_timeframe(&self, kind: ChartKind, timeframe: Timeframe) -> bool {
        let changed = {
            let mut st = write_state(&self.state);
            let changed = st.select_timeframe(kind, timeframe);
            if changed {
                st.add_log(format!("{kind} chart timeframe → {timeframe}"));
            }
            changed
        };
        if changed {
            self.trigger(Trigger::Charts(vec![kind]));
        }
        changed
    }

    /// Advance one chart kind to its next timeframe.
    pub fn cycle_timeframe(&self, kind: ChartKind) -> Timeframe {
        let next = read_state(&self.state).timeframe(kind).next();
        self.set_timeframe(kind, next);
        next
    }

    /// Fire a full batch now, outside the timer.
    pub fn refresh(&self) {
        self.trigger(Trigger::Full);
    }

    fn trigger(&self, trigger: Trigger) {
        if self.phase != Phase::Polling {
            return;
        }
        if let Some(tx) = &self.trigger_tx {
            let _ = tx.send(trigger);
        }
    }

    /// Disarm the timer. Idempotent; a stopped scheduler cannot restart.
    pub fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        {
            // Workers check the flag under the same lock before applying.
            let _guard = write_state(&self.state);
            self.stop_tx.send_replace(true);
        }
        self.trigger_tx = None;
        self.phase = Phase::Stopped;
        info!("Refresh scheduler stopped");
    }

    /// Wait for the refresh loop task to exit after `stop()`.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl<T> Drop for Scheduler<T> {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Refresh loop
// ---------------------------------------------------------------------------

struct Worker<T> {
    aggregator: Arc<Aggregator<T>>,
    state: SharedState,
    stop: watch::Receiver<bool>,
}

impl<T: Transport + 'static> Worker<T> {
    fn full_cycle(&self) {
        self.spawn_entities();
        let requests = read_state(&self.state).chart_requests();
        self.spawn_charts(requests);
    }

    fn chart_cycle(&self, kinds: &[ChartKind]) {
        let requests = {
            let st = read_state(&self.state);
            kinds.iter().map(|&k| (k, st.timeframe(k))).collect()
        };
        self.spawn_charts(requests);
    }

    fn spawn_entities(&self) {
        let seq = self.aggregator.next_seq();
        let aggregator = Arc::clone(&self.aggregator);
        let state = Arc::clone(&self.state);
        let stop = self.stop.clone();
        tokio::spawn(async move {
            let batch = aggregator.fetch_entities(seq).await;
            let mut st = write_state(&state);
            if *stop.borrow() {
                debug!("Dropping entity batch #{seq} settled after stop");
                return;
            }
            let report = apply_entities(&mut st, batch);
            debug!(
                "Entity batch #{seq}: {} applied, {} failed",
                report.applied.len(),
                report.failed.len()
            );
        });
    }

    fn spawn_charts(&self, requests: Vec<(ChartKind, Timeframe)>) {
        if requests.is_empty() {
            return;
        }
        let seq = self.aggregator.next_seq();
        let aggregator = Arc::clone(&self.aggregator);
        let state = Arc::clone(&self.state);
        let stop = self.stop.clone();
        tokio::spawn(async move {
            let batch = aggregator.fetch_charts(seq, &requests).await;
            let mut st = write_state(&state);
            if *stop.borrow() {
                debug!("Dropping chart batch #{seq} settled after stop");
                return;
            }
            let report = apply_charts(&mut st, batch);
            debug!(
                "Chart batch #{seq}: {} applied, {} failed, {} discarded",
                report.applied.len(),
                report.failed.len(),
                report.discarded.len()
            );
        });
    }
}

async fn run_loop<T: Transport + 'static>(
    worker: Worker<T>,
    period: Duration,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
) {
    let mut stop = worker.stop.clone();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => worker.full_cycle(),

            Some(trigger) = triggers.recv() => match trigger {
                Trigger::Full => worker.full_cycle(),
                Trigger::Charts(kinds) => worker.chart_cycle(&kinds),
            },
        }
    }

    debug!("Refresh loop exited");
}
