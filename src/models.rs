/// models.rs – Backend payload types and the dashboard's application state.
///
/// Every payload is decoded into an explicit type at the gateway boundary;
/// shape mismatches surface as decode errors instead of leaking untyped JSON.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Historical window selected for a chart kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::Day, Timeframe::Week, Timeframe::Month];

    /// Query-string value understood by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
        }
    }

    /// Selector order used by the dashboard: 24h → 7d → 30d → 24h.
    pub fn next(self) -> Self {
        match self {
            Timeframe::Day => Timeframe::Week,
            Timeframe::Week => Timeframe::Month,
            Timeframe::Month => Timeframe::Day,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            _ => Err(anyhow::anyhow!("Unknown timeframe: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    Volume,
    Trades,
    Portfolio,
    Pnl,
}

impl ChartKind {
    pub const ALL: [ChartKind; 4] = [
        ChartKind::Volume,
        ChartKind::Trades,
        ChartKind::Portfolio,
        ChartKind::Pnl,
    ];

    pub fn index(self) -> usize {
        match self {
            ChartKind::Volume => 0,
            ChartKind::Trades => 1,
            ChartKind::Portfolio => 2,
            ChartKind::Pnl => 3,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ChartKind::Volume => "/api/charts/volume",
            ChartKind::Trades => "/api/charts/trades",
            ChartKind::Portfolio => "/api/charts/portfolio",
            ChartKind::Pnl => "/api/charts/pnl",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Volume => "volume",
            ChartKind::Trades => "trades",
            ChartKind::Portfolio => "portfolio",
            ChartKind::Pnl => "pnl",
        }
    }

    /// Next chart in display order, wrapping around.
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "buy", alias = "BUY", alias = "Buy")]
    Buy,
    #[serde(rename = "sell", alias = "SELL", alias = "Sell")]
    Sell,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Read `null` the same as an absent key: the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// State of the backend's trailing-dip entry logic.
///
/// Older backends report a bare boolean, newer ones an object describing the
/// active dip. `null`/absent means inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrailingDip {
    Flag(bool),
    Detail(TrailingDipDetail),
}

impl TrailingDip {
    pub fn is_active(&self) -> bool {
        match self {
            TrailingDip::Flag(active) => *active,
            TrailingDip::Detail(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrailingDipDetail {
    pub peak_price: Option<f64>,
    pub low_price: Option<f64>,
    pub pct_from_peak: Option<f64>,
    pub started_at: Option<String>,
}

/// `/api/metrics` – scalar KPIs as computed by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub open_positions: u32,
    #[serde(rename = "totalPnL", deserialize_with = "null_as_default")]
    pub total_pnl: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub win_rate: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_volume: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub last_24h_trades: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub peak_price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub last_price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub pct_change_peak: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub minutes_since_peak: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_exposure: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub exposure_percentage: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub remaining_capacity: f64,
    pub active_trailing_dip: Option<TrailingDip>,
    #[serde(deserialize_with = "null_as_default")]
    pub base_token_symbol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub quote_token_symbol: String,
}

impl MetricsSnapshot {
    pub fn trailing_dip_active(&self) -> bool {
        self.active_trailing_dip
            .as_ref()
            .is_some_and(TrailingDip::is_active)
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBalance {
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub balance: f64,
    #[serde(rename = "balanceUSD", deserialize_with = "null_as_default")]
    pub balance_usd: f64,
    #[serde(rename = "priceUSD", deserialize_with = "null_as_default")]
    pub price_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    #[serde(rename = "totalUSD", default, deserialize_with = "null_as_default")]
    pub total_usd: f64,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Option<String>,
}

/// `/api/balances`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub base_token: TokenBalance,
    pub quote_token: TokenBalance,
    pub native_token: TokenBalance,
    pub portfolio: PortfolioSummary,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// One staged buy-in of a DCA position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DcaTranche {
    pub amount_in: Option<f64>,
    pub amount_out: Option<f64>,
    pub price: Option<f64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcaInfo {
    pub tranches: Vec<DcaTranche>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub buy_price: f64,
    pub current_price: f64,
    pub amount_out: f64,
    pub amount_in: f64,
    pub current_value: f64,
    pub pnl_percent: f64,
    pub pnl_absolute: f64,
    pub age_hours: f64,
    #[serde(default)]
    pub trailing_stop_status: String,
    #[serde(default)]
    pub dca_info: Option<DcaInfo>,
}

impl Position {
    pub fn tranche_count(&self) -> usize {
        self.dca_info.as_ref().map_or(0, |d| d.tranches.len())
    }
}

/// `/api/positions` wraps the list; a missing or null list means no positions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionsEnvelope {
    #[serde(default)]
    pub positions: Option<Vec<Position>>,
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: String,
    pub side: TradeSide,
    #[serde(default)]
    pub amount_in: f64,
    #[serde(default)]
    pub amount_out: f64,
    /// Only meaningful when `has_profit` is set (closing trades).
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub profit_pct: Option<f64>,
    #[serde(default)]
    pub reason: String,
    #[serde(rename = "displayAmountIn", default)]
    pub display_amount_in: String,
    #[serde(rename = "displayAmountOut", default)]
    pub display_amount_out: String,
    #[serde(rename = "displayProfit", default)]
    pub display_profit: String,
    #[serde(rename = "displayProfitPct", default)]
    pub display_profit_pct: String,
    #[serde(rename = "hasProfit", default)]
    pub has_profit: bool,
}

impl Trade {
    /// Realised profit, if this trade closed a position.
    pub fn realised_profit(&self) -> Option<f64> {
        if self.has_profit {
            self.profit
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Chart payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeChart {
    #[serde(default)]
    pub success: bool,
    pub labels: Vec<String>,
    pub buy_volume: Vec<f64>,
    pub sell_volume: Vec<f64>,
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub avg_trade_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesChart {
    #[serde(default)]
    pub success: bool,
    pub labels: Vec<String>,
    pub successful_trades: Vec<f64>,
    pub failed_trades: Vec<f64>,
    #[serde(default)]
    pub total_trades: f64,
    #[serde(default)]
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioChart {
    #[serde(default)]
    pub success: bool,
    pub labels: Vec<String>,
    pub total_value: Vec<f64>,
    pub base_token_value: Vec<f64>,
    pub quote_token_value: Vec<f64>,
    #[serde(default)]
    pub current_balance: f64,
    #[serde(default, rename = "change24h")]
    pub change_24h: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlChart {
    #[serde(default)]
    pub success: bool,
    pub labels: Vec<String>,
    #[serde(rename = "cumulativePnL")]
    pub cumulative_pnl: Vec<f64>,
    #[serde(rename = "realizedPnL")]
    pub realized_pnl: Vec<f64>,
    #[serde(rename = "totalPnL", default)]
    pub total_pnl: f64,
    #[serde(rename = "unrealizedPnL", default)]
    pub unrealized_pnl: f64,
}

/// A decoded chart payload of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartPayload {
    Volume(VolumeChart),
    Trades(TradesChart),
    Portfolio(PortfolioChart),
    Pnl(PnlChart),
}

impl ChartPayload {
    pub fn kind(&self) -> ChartKind {
        match self {
            ChartPayload::Volume(_) => ChartKind::Volume,
            ChartPayload::Trades(_) => ChartKind::Trades,
            ChartPayload::Portfolio(_) => ChartKind::Portfolio,
            ChartPayload::Pnl(_) => ChartKind::Pnl,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            ChartPayload::Volume(c) => &c.labels,
            ChartPayload::Trades(c) => &c.labels,
            ChartPayload::Portfolio(c) => &c.labels,
            ChartPayload::Pnl(c) => &c.labels,
        }
    }

    /// Numeric sequences in the fixed per-kind series order.
    pub fn series_values(&self) -> Vec<&[f64]> {
        match self {
            ChartPayload::Volume(c) => vec![c.buy_volume.as_slice(), c.sell_volume.as_slice()],
            ChartPayload::Trades(c) => vec![c.successful_trades.as_slice(), c.failed_trades.as_slice()],
            ChartPayload::Portfolio(c) => vec![
                c.total_value.as_slice(),
                c.base_token_value.as_slice(),
                c.quote_token_value.as_slice(),
            ],
            ChartPayload::Pnl(c) => vec![c.cumulative_pnl.as_slice(), c.realized_pnl.as_slice()],
        }
    }

    /// Scalar summary values in the fixed per-kind order.
    pub fn summary_values(&self) -> Vec<f64> {
        match self {
            ChartPayload::Volume(c) => vec![c.total_volume, c.avg_trade_size],
            ChartPayload::Trades(c) => vec![c.total_trades, c.win_rate],
            ChartPayload::Portfolio(c) => vec![c.current_balance, c.change_24h],
            ChartPayload::Pnl(c) => vec![c.total_pnl, c.unrealized_pnl],
        }
    }

    /// Every numeric sequence must line up with the label sequence.
    pub fn validate(&self) -> Result<(), String> {
        let expected = self.labels().len();
        for (i, values) in self.series_values().iter().enumerate() {
            if values.len() != expected {
                return Err(format!(
                    "{} chart series #{i} has {} points for {expected} labels",
                    self.kind(),
                    values.len()
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State slots
// ---------------------------------------------------------------------------

/// Name of a unit of state written by exactly one fetch task per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Metrics,
    Balances,
    Positions,
    Trades,
    Chart(ChartKind),
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotId::Metrics => f.write_str("metrics"),
            SlotId::Balances => f.write_str("balances"),
            SlotId::Positions => f.write_str("positions"),
            SlotId::Trades => f.write_str("trades"),
            SlotId::Chart(kind) => write!(f, "chart/{kind}"),
        }
    }
}

/// A value plus the sequence number of the batch that produced it.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    value: Option<T>,
    seq: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            seq: 0,
            updated_at: None,
        }
    }
}

impl<T> Slot<T> {
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Time of the last successful apply; never advanced by failures.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Replace the value if `seq` is newer than the applied one.
    /// Returns `false` (and leaves the slot untouched) otherwise.
    pub fn apply(&mut self, seq: u64, value: T, at: DateTime<Utc>) -> bool {
        if seq <= self.seq {
            return false;
        }
        self.value = Some(value);
        self.seq = seq;
        self.updated_at = Some(at);
        true
    }

    /// Drop the value but keep the sequence high-water mark.
    pub fn clear(&mut self) {
        self.value = None;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChartSlot {
    pub timeframe: Timeframe,
    pub data: Slot<ChartPayload>,
}

// ---------------------------------------------------------------------------
// Shared application state (scheduler writes, dashboard reads)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    pub metrics: Slot<MetricsSnapshot>,
    pub balances: Slot<BalanceSnapshot>,
    pub positions: Slot<Vec<Position>>,
    pub trades: Slot<Vec<Trade>>,
    /// Indexed by `ChartKind::index`.
    pub charts: [ChartSlot; 4],
    /// Advanced once per settled entity batch, whatever the slot outcomes.
    pub last_update: Option<DateTime<Utc>>,
    /// True until the first entity batch settles.
    pub loading: bool,
    pub logs: VecDeque<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_timeframe(Timeframe::default())
    }
}

impl AppState {
    pub fn with_timeframe(timeframe: Timeframe) -> Self {
        let chart = ChartSlot {
            timeframe,
            data: Slot::default(),
        };
        Self {
            metrics: Slot::default(),
            balances: Slot::default(),
            positions: Slot::default(),
            trades: Slot::default(),
            charts: [chart.clone(), chart.clone(), chart.clone(), chart],
            last_update: None,
            loading: true,
            logs: VecDeque::new(),
        }
    }

    pub fn chart(&self, kind: ChartKind) -> &ChartSlot {
        &self.charts[kind.index()]
    }

    pub fn chart_mut(&mut self, kind: ChartKind) -> &mut ChartSlot {
        &mut self.charts[kind.index()]
    }

    pub fn timeframe(&self, kind: ChartKind) -> Timeframe {
        self.chart(kind).timeframe
    }

    /// Current selection for every chart kind, in display order.
    pub fn chart_requests(&self) -> Vec<(ChartKind, Timeframe)> {
        ChartKind::ALL
            .iter()
            .map(|&k| (k, self.timeframe(k)))
            .collect()
    }

    /// Select a timeframe for one chart kind. The slot is emptied so data
    /// fetched for the previous window is never shown under the new one.
    /// Returns `false` when the selection did not change.
    pub fn select_timeframe(&mut self, kind: ChartKind, timeframe: Timeframe) -> bool {
        let slot = self.chart_mut(kind);
        if slot.timeframe == timeframe {
            return false;
        }
        slot.timeframe = timeframe;
        slot.data.clear();
        true
    }

    pub fn open_positions(&self) -> &[Position] {
        self.positions.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn recent_trades(&self) -> &[Trade] {
        self.trades.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn add_log(&mut self, msg: impl Into<String>) {
        let entry = format!("[{}] {}", Utc::now().format("%H:%M:%S"), msg.into());
        self.logs.push_front(entry);
        // Keep a reasonable history
        while self.logs.len() > 200 {
            self.logs.pop_back();
        }
    }
}
