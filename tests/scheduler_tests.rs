/// Integration tests for the refresh scheduler, run on tokio's paused clock.
#[path = "../src/models.rs"]
mod models;

#[path = "../src/gateway.rs"]
mod gateway;

#[path = "../src/aggregator.rs"]
mod aggregator;

#[path = "../src/scheduler.rs"]
mod scheduler;

mod support;

use aggregator::{Aggregator, DEFAULT_TRADES_WINDOW};
use gateway::Gateway;
use models::{ChartKind, Timeframe};
use scheduler::{read_state, Phase, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use support::{chart_route, metrics_json, points_for, Reply, StubTransport, STUB_BASE};

const PERIOD: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_scheduler(stub: &StubTransport) -> Scheduler<StubTransport> {
    let gateway = Gateway::new(STUB_BASE, stub.clone());
    let aggregator = Arc::new(Aggregator::new(gateway, DEFAULT_TRADES_WINDOW));
    Scheduler::new(aggregator, PERIOD, Timeframe::Day)
}

/// Let spawned batches run; advances the paused clock by `ms`.
async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn chart_labels(scheduler: &Scheduler<StubTransport>, kind: ChartKind) -> Option<usize> {
    let state = scheduler.state();
    let st = read_state(&state);
    st.chart(kind).data.get().map(|p| p.labels().len())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_start_fires_immediately_then_every_period() {
    let stub = StubTransport::healthy();
    let mut scheduler = make_scheduler(&stub);
    assert_eq!(scheduler.phase(), Phase::Idle);
    assert!(read_state(&scheduler.state()).loading);

    scheduler.start().expect("start");
    assert_eq!(scheduler.phase(), Phase::Polling);
    advance_ms(1).await;

    assert_eq!(stub.calls("/api/metrics"), 1);
    assert_eq!(stub.calls_with_prefix("/api/charts/"), 4);
    {
        let state = scheduler.state();
        let st = read_state(&state);
        assert!(!st.loading);
        assert!(st.metrics.get().is_some());
        assert!(ChartKind::ALL.iter().all(|&k| st.chart(k).data.get().is_some()));
    }

    advance_ms(9_000).await;
    assert_eq!(stub.calls("/api/metrics"), 1);

    advance_ms(1_000).await;
    assert_eq!(stub.calls("/api/metrics"), 2);
    assert_eq!(stub.calls_with_prefix("/api/charts/"), 8);

    advance_ms(10_000).await;
    assert_eq!(stub.calls("/api/metrics"), 3);

    scheduler.stop();
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_is_rejected_unless_idle() {
    let stub = StubTransport::healthy();
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");
    assert!(scheduler.start().is_err());

    scheduler.stop();
    scheduler.stop();
    assert_eq!(scheduler.phase(), Phase::Stopped);
    assert!(scheduler.start().is_err());
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_fires_full_batch_now() {
    let stub = StubTransport::healthy();
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");
    advance_ms(1).await;

    scheduler.refresh();
    advance_ms(1).await;

    assert_eq!(stub.calls("/api/metrics"), 2);
    assert_eq!(stub.calls_with_prefix("/api/charts/"), 8);

    // Manual refresh does not shift the periodic timer.
    advance_ms(9_997).await;
    assert_eq!(stub.calls("/api/metrics"), 2);
    advance_ms(3).await;
    assert_eq!(stub.calls("/api/metrics"), 3);

    scheduler.stop();
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_scheduler_ignores_refresh_and_timeframe_fetches() {
    let stub = StubTransport::healthy();
    let scheduler = make_scheduler(&stub);

    scheduler.refresh();
    assert!(scheduler.set_timeframe(ChartKind::Trades, Timeframe::Month));
    advance_ms(20_000).await;

    assert_eq!(stub.calls_with_prefix("/api/"), 0);
    assert_eq!(
        read_state(&scheduler.state()).timeframe(ChartKind::Trades),
        Timeframe::Month
    );
}

// ---------------------------------------------------------------------------
// Timeframe changes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_timeframe_change_refetches_only_that_chart() {
    let stub = StubTransport::healthy();
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");
    advance_ms(1).await;
    assert_eq!(chart_labels(&scheduler, ChartKind::Volume), Some(points_for(Timeframe::Day)));

    assert!(scheduler.set_timeframe(ChartKind::Volume, Timeframe::Week));
    advance_ms(1).await;

    assert_eq!(stub.calls(&chart_route(ChartKind::Volume, Timeframe::Week)), 1);
    assert_eq!(stub.calls_with_prefix(ChartKind::Trades.path()), 1);
    assert_eq!(stub.calls_with_prefix(ChartKind::Portfolio.path()), 1);
    assert_eq!(stub.calls_with_prefix(ChartKind::Pnl.path()), 1);
    assert_eq!(stub.calls("/api/metrics"), 1);
    assert_eq!(chart_labels(&scheduler, ChartKind::Volume), Some(points_for(Timeframe::Week)));
    assert_eq!(chart_labels(&scheduler, ChartKind::Pnl), Some(points_for(Timeframe::Day)));

    // Re-selecting the current timeframe is a no-op.
    assert!(!scheduler.set_timeframe(ChartKind::Volume, Timeframe::Week));
    advance_ms(1).await;
    assert_eq!(stub.calls(&chart_route(ChartKind::Volume, Timeframe::Week)), 1);

    // Periodic batches now use the new selection; the timer was not reset.
    advance_ms(9_996).await;
    assert_eq!(stub.calls("/api/metrics"), 1);
    advance_ms(2).await;
    assert_eq!(stub.calls("/api/metrics"), 2);
    assert_eq!(stub.calls(&chart_route(ChartKind::Volume, Timeframe::Week)), 2);
    assert_eq!(stub.calls(&chart_route(ChartKind::Volume, Timeframe::Day)), 1);

    scheduler.stop();
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeframe_change_logs_once_per_change() {
    let stub = StubTransport::healthy();
    let scheduler = make_scheduler(&stub);
    let timeframe_lines = |s: &Scheduler<StubTransport>| {
        let state = s.state();
        let st = read_state(&state);
        st.logs.iter().filter(|l| l.contains("timeframe")).count()
    };

    assert!(scheduler.set_timeframe(ChartKind::Portfolio, Timeframe::Month));
    assert_eq!(timeframe_lines(&scheduler), 1);

    assert!(!scheduler.set_timeframe(ChartKind::Portfolio, Timeframe::Month));
    assert_eq!(timeframe_lines(&scheduler), 1);

    assert!(scheduler.set_timeframe(ChartKind::Portfolio, Timeframe::Day));
    assert_eq!(timeframe_lines(&scheduler), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_timeframe_wraps() {
    let stub = StubTransport::healthy();
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");

    assert_eq!(scheduler.cycle_timeframe(ChartKind::Pnl), Timeframe::Week);
    assert_eq!(scheduler.cycle_timeframe(ChartKind::Pnl), Timeframe::Month);
    assert_eq!(scheduler.cycle_timeframe(ChartKind::Pnl), Timeframe::Day);
    advance_ms(1).await;
    assert_eq!(chart_labels(&scheduler, ChartKind::Pnl), Some(points_for(Timeframe::Day)));

    scheduler.stop();
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_result_for_old_timeframe_is_discarded() {
    let stub = StubTransport::healthy();
    let slow = Reply::json(support::chart_json(ChartKind::Volume, Timeframe::Day))
        .after(Duration::from_secs(3));
    stub.set(&chart_route(ChartKind::Volume, Timeframe::Day), slow);
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");
    advance_ms(1).await;

    scheduler.set_timeframe(ChartKind::Volume, Timeframe::Week);
    advance_ms(5_000).await;

    assert_eq!(chart_labels(&scheduler, ChartKind::Volume), Some(points_for(Timeframe::Week)));

    scheduler.stop();
    scheduler.join().await;
}

// ---------------------------------------------------------------------------
// Overlapping batches + teardown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_slow_batch_does_not_overwrite_newer_tick() {
    let stub = StubTransport::healthy();
    stub.queue(
        "/api/metrics",
        vec![
            Reply::json(metrics_json(1)).after(Duration::from_secs(15)),
            Reply::json(metrics_json(2)),
        ],
    );
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");

    advance_ms(10_001).await;
    let open = |s: &Scheduler<StubTransport>| {
        let state = s.state();
        let st = read_state(&state);
        st.metrics.get().map(|m| m.open_positions)
    };
    assert_eq!(open(&scheduler), Some(2));

    advance_ms(6_000).await;
    assert_eq!(stub.calls("/api/metrics"), 2);
    assert_eq!(open(&scheduler), Some(2));

    scheduler.stop();
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_drops_in_flight_results() {
    let stub = StubTransport::healthy();
    stub.set(
        "/api/metrics",
        Reply::json(metrics_json(3)).after(Duration::from_secs(5)),
    );
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");
    advance_ms(1).await;
    assert_eq!(stub.calls("/api/metrics"), 1);

    scheduler.stop();
    scheduler.join().await;
    advance_ms(30_000).await;

    let state = scheduler.state();
    let st = read_state(&state);
    assert!(st.metrics.get().is_none());
    assert!(st.loading);
    assert!(st.last_update.is_none());
    assert_eq!(stub.calls("/api/metrics"), 1);
    assert_eq!(scheduler.phase(), Phase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_new_scheduler_starts_from_fresh_state() {
    let stub = StubTransport::healthy();
    let mut first = make_scheduler(&stub);
    first.start().expect("start");
    advance_ms(1).await;
    first.stop();
    first.join().await;

    let second = make_scheduler(&stub);
    let state = second.state();
    let st = read_state(&state);
    assert!(st.loading);
    assert!(st.metrics.get().is_none());
    assert!(ChartKind::ALL.iter().all(|&k| st.chart(k).data.get().is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_scheduler_stops_polling() {
    let stub = StubTransport::healthy();
    let mut scheduler = make_scheduler(&stub);
    scheduler.start().expect("start");
    advance_ms(1).await;
    drop(scheduler);

    advance_ms(30_000).await;
    assert_eq!(stub.calls("/api/metrics"), 1);
}
