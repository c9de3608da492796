/// projection.rs – Turn raw chart payloads into renderer-ready series.
///
/// Each chart kind has a fixed, ordered list of named series with a stable
/// visual encoding. The projection never reshapes data beyond converting the
/// timestamp labels for display, so index `i` of every series still refers to
/// label `i`.
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::warn;

use crate::models::{ChartKind, ChartPayload};

// ---------------------------------------------------------------------------
// Visual encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const GREEN: Rgb = Rgb(34, 197, 94);
pub const RED: Rgb = Rgb(239, 68, 68);
pub const BLUE: Rgb = Rgb(59, 130, 246);
pub const PURPLE: Rgb = Rgb(168, 85, 247);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStyle {
    pub color: Rgb,
    /// Opacity of the area/bar fill.
    pub fill_opacity: f64,
    /// Opacity of the line/bar border.
    pub line_opacity: f64,
    /// Bezier tension of line segments, 0 for straight/bar.
    pub tension: f64,
    /// Whether the area under a line is filled.
    pub fill: bool,
    pub border_width: u16,
}

impl SeriesStyle {
    const fn bar(color: Rgb) -> Self {
        Self {
            color,
            fill_opacity: 0.7,
            line_opacity: 1.0,
            tension: 0.0,
            fill: true,
            border_width: 1,
        }
    }

    const fn line(color: Rgb, fill: bool) -> Self {
        Self {
            color,
            fill_opacity: 0.1,
            line_opacity: 1.0,
            tension: 0.4,
            fill,
            border_width: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSpec {
    pub name: &'static str,
    pub style: SeriesStyle,
}

/// Fixed presentation profile for one chart kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartProfile {
    pub kind: ChartKind,
    pub title: &'static str,
    pub y_axis_label: &'static str,
    pub render: RenderKind,
    pub series: &'static [SeriesSpec],
    pub summary: &'static [SummaryField],
}

/// How a scalar summary figure is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Amount { decimals: usize, unit: &'static str },
    Count,
    Percent,
    SignedPercent,
    Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryField {
    pub name: &'static str,
    pub format: ValueFormat,
}

const fn field(name: &'static str, format: ValueFormat) -> SummaryField {
    SummaryField { name, format }
}

const ETH_4: ValueFormat = ValueFormat::Amount {
    decimals: 4,
    unit: "ETH",
};
const ETH_6: ValueFormat = ValueFormat::Amount {
    decimals: 6,
    unit: "ETH",
};

static VOLUME_SERIES: [SeriesSpec; 2] = [
    SeriesSpec {
        name: "Buy Volume",
        style: SeriesStyle::bar(GREEN),
    },
    SeriesSpec {
        name: "Sell Volume",
        style: SeriesStyle::bar(RED),
    },
];

static TRADES_SERIES: [SeriesSpec; 2] = [
    SeriesSpec {
        name: "Successful Trades",
        style: SeriesStyle::line(GREEN, true),
    },
    SeriesSpec {
        name: "Failed Trades",
        style: SeriesStyle::line(RED, true),
    },
];

static PORTFOLIO_SERIES: [SeriesSpec; 3] = [
    SeriesSpec {
        name: "Total Portfolio Value",
        style: SeriesStyle::line(BLUE, true),
    },
    SeriesSpec {
        name: "Base Token Value",
        style: SeriesStyle::line(PURPLE, false),
    },
    SeriesSpec {
        name: "Quote Token Value",
        style: SeriesStyle::line(GREEN, false),
    },
];

static PNL_SERIES: [SeriesSpec; 2] = [
    SeriesSpec {
        name: "Cumulative P&L",
        style: SeriesStyle::line(GREEN, true),
    },
    SeriesSpec {
        name: "Realized P&L",
        style: SeriesStyle::line(BLUE, false),
    },
];

static VOLUME_SUMMARY: [SummaryField; 2] = [
    field("Total Volume", ETH_4),
    field("Avg Trade Size", ETH_4),
];
static TRADES_SUMMARY: [SummaryField; 2] = [
    field("Total Trades", ValueFormat::Count),
    field("Win Rate", ValueFormat::Percent),
];
static PORTFOLIO_SUMMARY: [SummaryField; 2] = [
    field("Current Balance", ValueFormat::Currency),
    field("24h Change", ValueFormat::SignedPercent),
];
static PNL_SUMMARY: [SummaryField; 2] = [field("Total P&L", ETH_6), field("Unrealized P&L", ETH_6)];

pub fn profile(kind: ChartKind) -> ChartProfile {
    match kind {
        ChartKind::Volume => ChartProfile {
            kind,
            title: "Trading Volume",
            y_axis_label: "Volume (ETH)",
            render: RenderKind::Bar,
            series: &VOLUME_SERIES,
            summary: &VOLUME_SUMMARY,
        },
        ChartKind::Trades => ChartProfile {
            kind,
            title: "Trade Activity",
            y_axis_label: "Number of Trades",
            render: RenderKind::Line,
            series: &TRADES_SERIES,
            summary: &TRADES_SUMMARY,
        },
        ChartKind::Portfolio => ChartProfile {
            kind,
            title: "Portfolio Balance",
            y_axis_label: "Value (USD)",
            render: RenderKind::Line,
            series: &PORTFOLIO_SERIES,
            summary: &PORTFOLIO_SUMMARY,
        },
        ChartKind::Pnl => ChartProfile {
            kind,
            title: "Cumulative P&L",
            y_axis_label: "P&L (ETH)",
            render: RenderKind::Line,
            series: &PNL_SERIES,
            summary: &PNL_SUMMARY,
        },
    }
}

// ---------------------------------------------------------------------------
// Projected output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedSeries {
    pub name: &'static str,
    pub style: SeriesStyle,
    pub values: Vec<f64>,
}

impl ProjectedSeries {
    /// `(index, value)` pairs for x/y plotting.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64, *v))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryValue {
    pub field: SummaryField,
    pub value: f64,
}

impl SummaryValue {
    pub fn display(&self) -> String {
        format_value(self.value, self.field.format)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    pub profile: ChartProfile,
    pub labels: Vec<String>,
    pub series: Vec<ProjectedSeries>,
    pub summary: Vec<SummaryValue>,
}

impl SeriesSet {
    pub fn empty(kind: ChartKind) -> Self {
        Self {
            profile: profile(kind),
            labels: Vec::new(),
            series: Vec::new(),
            summary: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.series.is_empty()
    }

    /// Y range across every series, always including zero.
    pub fn y_bounds(&self) -> [f64; 2] {
        let (min, max) = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if (max - min).abs() < f64::EPSILON {
            [min, min + 1.0]
        } else {
            [min, max]
        }
    }
}

/// Project an optional payload for `kind`.
///
/// An absent payload, or one whose series do not line up with its labels,
/// yields an empty set.
pub fn project(kind: ChartKind, payload: Option<&ChartPayload>) -> SeriesSet {
    let Some(payload) = payload else {
        return SeriesSet::empty(kind);
    };
    if payload.kind() != kind {
        warn!("Projection for {kind} received a {} payload", payload.kind());
        return SeriesSet::empty(kind);
    }
    if let Err(e) = payload.validate() {
        warn!("Skipping misaligned {kind} chart: {e}");
        return SeriesSet::empty(kind);
    }

    let profile = profile(kind);
    let labels = payload.labels().iter().map(|l| time_label(l)).collect::<Vec<_>>();
    let series = profile
        .series
        .iter()
        .zip(payload.series_values())
        .map(|(spec, values)| ProjectedSeries {
            name: spec.name,
            style: spec.style,
            values: values.to_vec(),
        })
        .collect();
    let summary = profile
        .summary
        .iter()
        .zip(payload.summary_values())
        .map(|(&field, value)| SummaryValue { field, value })
        .collect();

    SeriesSet {
        profile,
        labels,
        series,
        summary,
    }
}

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

pub fn format_number(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn format_currency(value: f64) -> String {
    format!("${value:.2}")
}

pub fn format_value(value: f64, format: ValueFormat) -> String {
    match format {
        ValueFormat::Amount { decimals, unit } => {
            format!("{} {unit}", format_number(value, decimals))
        }
        ValueFormat::Count if value.fract() == 0.0 => format!("{value:.0}"),
        ValueFormat::Count => value.to_string(),
        ValueFormat::Percent => format_percent(value),
        ValueFormat::SignedPercent if value >= 0.0 => format!("+{}", format_percent(value)),
        ValueFormat::SignedPercent => format_percent(value),
        ValueFormat::Currency => format_currency(value),
    }
}

// ---------------------------------------------------------------------------
// Timestamp labels
// ---------------------------------------------------------------------------

/// Parse a backend timestamp: RFC 3339 text or epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// Local time-of-day for chart axes. Unparseable labels are kept verbatim so
/// the label count never changes.
pub fn time_label(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Local date and time for tables.
pub fn datetime_label(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| raw.to_string())
}
