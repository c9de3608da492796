/// aggregator.rs – Concurrent, failure-isolated fetch batches.
///
/// A batch issues all of its requests at once and waits for every one of them
/// to settle. Each successful result replaces exactly one state slot; a failed
/// request leaves its slot untouched and is only logged.
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::gateway::{FetchError, Gateway, Transport};
use crate::models::{
    AppState, BalanceSnapshot, ChartKind, ChartPayload, MetricsSnapshot, Position,
    PositionsEnvelope, Slot, SlotId, Timeframe, Trade,
};

/// Number of most recent trades kept after each fetch.
pub const DEFAULT_TRADES_WINDOW: usize = 20;

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Settled outcome of the four entity requests of one cycle.
#[derive(Debug)]
pub struct EntityBatch {
    pub seq: u64,
    pub metrics: Result<MetricsSnapshot, FetchError>,
    pub balances: Result<BalanceSnapshot, FetchError>,
    pub positions: Result<Vec<Position>, FetchError>,
    pub trades: Result<Vec<Trade>, FetchError>,
}

#[derive(Debug)]
pub struct ChartResult {
    pub kind: ChartKind,
    /// Timeframe the request was issued for.
    pub timeframe: Timeframe,
    pub payload: Result<ChartPayload, FetchError>,
}

#[derive(Debug)]
pub struct ChartBatch {
    pub seq: u64,
    pub results: Vec<ChartResult>,
}

/// What applying a batch did to each slot it touched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplyReport {
    pub applied: Vec<SlotId>,
    pub failed: Vec<(SlotId, FetchError)>,
    /// Results that arrived after a newer one, or for a deselected timeframe.
    pub discarded: Vec<SlotId>,
}

impl ApplyReport {
    pub fn failed_slots(&self) -> Vec<SlotId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct Aggregator<T> {
    gateway: Gateway<T>,
    trades_window: usize,
    seq: AtomicU64,
}

impl<T: Transport> Aggregator<T> {
    pub fn new(gateway: Gateway<T>, trades_window: usize) -> Self {
        Self {
            gateway,
            trades_window,
            seq: AtomicU64::new(0),
        }
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    /// Monotonic batch sequence number; take it when the batch is triggered.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fetch metrics, balances, positions and trades concurrently.
    pub async fn fetch_entities(&self, seq: u64) -> EntityBatch {
        let (metrics, balances, positions, trades) = tokio::join!(
            self.gateway.get_json::<MetricsSnapshot>("/api/metrics", &[]),
            self.gateway.get_json::<BalanceSnapshot>("/api/balances", &[]),
            self.fetch_positions(),
            self.fetch_trades(),
        );
        EntityBatch {
            seq,
            metrics,
            balances,
            positions,
            trades,
        }
    }

    /// Fetch the given chart kinds concurrently, each for its own timeframe.
    pub async fn fetch_charts(&self, seq: u64, requests: &[(ChartKind, Timeframe)]) -> ChartBatch {
        let results = join_all(requests.iter().map(|&(kind, timeframe)| async move {
            ChartResult {
                kind,
                timeframe,
                payload: self.fetch_chart(kind, timeframe).await,
            }
        }))
        .await;
        ChartBatch { seq, results }
    }

    pub async fn fetch_chart(
        &self,
        kind: ChartKind,
        timeframe: Timeframe,
    ) -> Result<ChartPayload, FetchError> {
        let query = [("timeframe", timeframe.as_str())];
        let path = kind.path();
        let payload = match kind {
            ChartKind::Volume => ChartPayload::Volume(self.gateway.get_json(path, &query).await?),
            ChartKind::Trades => ChartPayload::Trades(self.gateway.get_json(path, &query).await?),
            ChartKind::Portfolio => {
                ChartPayload::Portfolio(self.gateway.get_json(path, &query).await?)
            }
            ChartKind::Pnl => ChartPayload::Pnl(self.gateway.get_json(path, &query).await?),
        };
        payload.validate().map_err(FetchError::Decode)?;
        Ok(payload)
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, FetchError> {
        let envelope: PositionsEnvelope = self.gateway.get_json("/api/positions", &[]).await?;
        Ok(envelope.positions.unwrap_or_default())
    }

    async fn fetch_trades(&self) -> Result<Vec<Trade>, FetchError> {
        let mut trades: Vec<Trade> = self.gateway.get_json("/api/trades", &[]).await?;
        trades.truncate(self.trades_window);
        Ok(trades)
    }
}

// ---------------------------------------------------------------------------
// Applying settled batches
// ---------------------------------------------------------------------------

fn settle<V>(
    slot: &mut Slot<V>,
    id: SlotId,
    seq: u64,
    result: Result<V, FetchError>,
    now: DateTime<Utc>,
    report: &mut ApplyReport,
) {
    match result {
        Ok(value) => {
            if slot.apply(seq, value, now) {
                report.applied.push(id);
            } else {
                report.discarded.push(id);
            }
        }
        Err(e) => report.failed.push((id, e)),
    }
}

/// Write an entity batch into `state`, slot by slot in a fixed order.
///
/// The batch-level `last_update` marker advances even when slots failed.
pub fn apply_entities(state: &mut AppState, batch: EntityBatch) -> ApplyReport {
    let now = Utc::now();
    let seq = batch.seq;
    let mut report = ApplyReport::default();

    settle(&mut state.metrics, SlotId::Metrics, seq, batch.metrics, now, &mut report);
    settle(&mut state.balances, SlotId::Balances, seq, batch.balances, now, &mut report);
    settle(&mut state.positions, SlotId::Positions, seq, batch.positions, now, &mut report);
    settle(&mut state.trades, SlotId::Trades, seq, batch.trades, now, &mut report);

    state.last_update = Some(now);
    state.loading = false;
    log_report(state, &report);
    report
}

/// Write a chart batch into `state`. Results fetched for a timeframe that is
/// no longer selected for their kind are discarded.
pub fn apply_charts(state: &mut AppState, batch: ChartBatch) -> ApplyReport {
    let now = Utc::now();
    let mut report = ApplyReport::default();

    for result in batch.results {
        let id = SlotId::Chart(result.kind);
        let slot = state.chart_mut(result.kind);
        match result.payload {
            Ok(_) if result.timeframe != slot.timeframe => report.discarded.push(id),
            payload => settle(&mut slot.data, id, batch.seq, payload, now, &mut report),
        }
    }

    log_report(state, &report);
    report
}

fn log_report(state: &mut AppState, report: &ApplyReport) {
    for (id, e) in &report.failed {
        warn!("Failed to refresh {id}: {e}");
        state.add_log(format!("ERROR refreshing {id}: {e}"));
    }
    for id in &report.discarded {
        debug!("Discarded out-of-date {id} result");
    }
}
