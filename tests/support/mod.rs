//! Shared test helpers: an in-memory `Transport` and backend JSON fixtures.
//!
//! Test crates include this with `mod support;` after pulling in
//! `gateway` and `models` via `#[path]`.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::gateway::{FetchError, Transport};
use crate::models::{ChartKind, Timeframe};

pub const STUB_BASE: &str = "http://stub.local";

// ---------------------------------------------------------------------------
// Stub transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Fail(FetchError),
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Reply::Body(value.to_string())
    }

    pub fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }
}

#[derive(Default)]
struct Inner {
    /// Route key → queued replies; the last one is sticky.
    routes: HashMap<String, VecDeque<Reply>>,
    calls: Vec<String>,
}

/// Answers GETs from canned replies keyed by `path[?query]`.
#[derive(Clone, Default)]
pub struct StubTransport {
    inner: Arc<Mutex<Inner>>,
}

impl StubTransport {
    /// Every endpoint answers with a well-formed payload.
    pub fn healthy() -> Self {
        let stub = Self::default();
        stub.set("/api/metrics", Reply::json(metrics_json(3)));
        stub.set("/api/balances", Reply::json(balances_json()));
        stub.set("/api/positions", Reply::json(positions_json(3)));
        stub.set("/api/trades", Reply::json(trades_json(5)));
        for kind in ChartKind::ALL {
            for tf in Timeframe::ALL {
                stub.set(&chart_route(kind, tf), Reply::json(chart_json(kind, tf)));
            }
        }
        stub
    }

    pub fn set(&self, route: &str, reply: Reply) {
        self.queue(route, vec![reply]);
    }

    pub fn queue(&self, route: &str, replies: Vec<Reply>) {
        let mut inner = self.inner.lock().expect("stub lock");
        inner.routes.insert(route.to_string(), replies.into());
    }

    /// Number of requests made for an exact route key.
    pub fn calls(&self, route: &str) -> usize {
        let inner = self.inner.lock().expect("stub lock");
        inner.calls.iter().filter(|c| c.as_str() == route).count()
    }

    /// Number of requests whose route key starts with `prefix`.
    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        let inner = self.inner.lock().expect("stub lock");
        inner.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn next_reply(&self, key: &str) -> Reply {
        let mut inner = self.inner.lock().expect("stub lock");
        inner.calls.push(key.to_string());
        let path = key.split('?').next().unwrap_or(key);
        let queue = if inner.routes.contains_key(key) {
            inner.routes.get_mut(key)
        } else {
            inner.routes.get_mut(path)
        };
        match queue {
            Some(q) if q.len() > 1 => q.pop_front().expect("non-empty queue"),
            Some(q) => q.front().cloned().unwrap_or(Reply::Fail(FetchError::HttpStatus(404))),
            None => Reply::Fail(FetchError::HttpStatus(404)),
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut key = url.strip_prefix(STUB_BASE).unwrap_or(url).to_string();
        if !query.is_empty() {
            let qs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            key = format!("{key}?{}", qs.join("&"));
        }

        let mut reply = self.next_reply(&key);
        loop {
            match reply {
                Reply::Body(body) => return Ok(body),
                Reply::Fail(e) => return Err(e),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

pub fn chart_route(kind: ChartKind, timeframe: Timeframe) -> String {
    format!("{}?timeframe={timeframe}", kind.path())
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn metrics_json(open_positions: u32) -> Value {
    json!({
        "openPositions": open_positions,
        "totalPnL": 0.012345,
        "winRate": 61.5,
        "totalVolume": 4.2,
        "last24hTrades": 12,
        "peakPrice": 0.00321,
        "lastPrice": 0.00312,
        "pctChangePeak": -2.8,
        "minutesSincePeak": 42.0,
        "totalExposure": 0.9,
        "exposurePercentage": 45.0,
        "remainingCapacity": 1.1,
        "activeTrailingDip": false,
        "baseTokenSymbol": "ETH",
        "quoteTokenSymbol": "WBNB"
    })
}

fn token(symbol: &str, balance: f64, price: f64) -> Value {
    json!({
        "symbol": symbol,
        "balance": balance,
        "balanceUSD": balance * price,
        "priceUSD": price
    })
}

pub fn balances_json() -> Value {
    json!({
        "baseToken": token("ETH", 1.5, 3000.0),
        "quoteToken": token("WBNB", 2.0, 600.0),
        "nativeToken": token("BNB", 0.1, 600.0),
        "portfolio": { "totalUSD": 5760.0, "lastUpdated": "2024-05-01T12:00:00Z" }
    })
}

pub fn position_json(i: usize) -> Value {
    json!({
        "id": format!("pos-{i}"),
        "buyPrice": 0.0031,
        "currentPrice": 0.0032,
        "amountOut": 100.0 + i as f64,
        "amountIn": 0.31,
        "currentValue": 0.32,
        "pnlPercent": 3.2,
        "pnlAbsolute": 0.01,
        "ageHours": 1.5,
        "trailingStopStatus": "inactive",
        "dcaInfo": { "tranches": [ { "amountIn": 0.1, "price": 0.0031 } ] }
    })
}

pub fn positions_json(n: usize) -> Value {
    json!({ "positions": (0..n).map(position_json).collect::<Vec<_>>() })
}

/// Trade `i` carries `reason = "t{i}"` so tests can check ordering.
pub fn trade_json(i: usize) -> Value {
    let closing = i % 2 == 1;
    let (side, profit, profit_pct, display_profit, display_profit_pct) = if closing {
        ("sell", json!(0.002), json!(2.0), "+0.002000 ETH", "+2.00%")
    } else {
        ("buy", Value::Null, Value::Null, "", "")
    };
    json!({
        "timestamp": format!("2024-05-01T12:{:02}:00Z", i % 60),
        "side": side,
        "amount_in": 0.1,
        "amount_out": 31.0,
        "profit": profit,
        "profit_pct": profit_pct,
        "reason": format!("t{i}"),
        "displayAmountIn": "0.1000 ETH",
        "displayAmountOut": "31.0000 WBNB",
        "displayProfit": display_profit,
        "displayProfitPct": display_profit_pct,
        "hasProfit": closing
    })
}

pub fn trades_json(n: usize) -> Value {
    Value::Array((0..n).map(trade_json).collect())
}

/// Point count per timeframe, so tests can tell which window a payload came from.
pub fn points_for(timeframe: Timeframe) -> usize {
    match timeframe {
        Timeframe::Day => 24,
        Timeframe::Week => 7,
        Timeframe::Month => 30,
    }
}

pub fn chart_json(kind: ChartKind, timeframe: Timeframe) -> Value {
    chart_json_with(kind, points_for(timeframe), points_for(timeframe))
}

/// Chart payload with `labels` label entries and `points` values per series.
pub fn chart_json_with(kind: ChartKind, labels: usize, points: usize) -> Value {
    let labels: Vec<String> = (0..labels)
        .map(|i| (1_714_521_600_000_i64 + i as i64 * 3_600_000).to_string())
        .collect();
    let values: Vec<f64> = (0..points).map(|i| i as f64 * 0.5).collect();
    match kind {
        ChartKind::Volume => json!({
            "success": true,
            "labels": labels,
            "buyVolume": values,
            "sellVolume": values,
            "totalVolume": 12.5,
            "avgTradeSize": 0.25
        }),
        ChartKind::Trades => json!({
            "success": true,
            "labels": labels,
            "successfulTrades": values,
            "failedTrades": values,
            "totalTrades": 40,
            "winRate": 62.5
        }),
        ChartKind::Portfolio => json!({
            "success": true,
            "labels": labels,
            "totalValue": values,
            "baseTokenValue": values,
            "quoteTokenValue": values,
            "currentBalance": 5760.0,
            "change24h": 1.25
        }),
        ChartKind::Pnl => json!({
            "success": true,
            "labels": labels,
            "cumulativePnL": values,
            "realizedPnL": values,
            "totalPnL": 0.012345,
            "unrealizedPnL": 0.0004
        }),
    }
}
