/// dashboard.rs – ratatui live terminal dashboard.
///
/// Layout:
///  ┌─ Header ──────────────────────────────────────────────────────────┐
///  │ Trading Bot Dashboard │ ETH/WBNB • ● Live │ Last update │ keys    │
///  ├─ Tabs ────────────────────────────────────────────────────────────┤
///  │ Overview │ Portfolio │ Positions │ Trades │ Analytics             │
///  ├───────────────────────────────────────────────────────────────────┤
///  │ body of the selected tab                                          │
///  └───────────────────────────────────────────────────────────────────┘
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row,
        Table, Tabs,
    },
    Frame, Terminal,
};
use chrono::{DateTime, Local, Utc};
use std::io::{self, Stdout};

use crate::models::{AppState, ChartKind, TradeSide};
use crate::projection::{
    datetime_label, format_currency, format_number, format_percent, project, RenderKind, Rgb,
    SeriesSet,
};

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

const DEFAULT_BASE_SYMBOL: &str = "ETH";
const DEFAULT_QUOTE_SYMBOL: &str = "WBNB";

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

pub fn set_window_title(terminal: &mut CrossTerm, title: &str) -> anyhow::Result<()> {
    execute!(terminal.backend_mut(), SetTitle(title))?;
    Ok(())
}

/// Terminal title summarising the portfolio, once metrics and balances exist.
pub fn window_title(state: &AppState) -> Option<String> {
    let metrics = state.metrics.get()?;
    let balances = state.balances.get()?;
    let pnl = metrics.total_pnl;
    Some(format!(
        "${:.0} Portfolio | {} Positions | {}{:.4} P&L | Crypto Trading Bot Dashboard",
        balances.portfolio.total_usd,
        metrics.open_positions,
        if pnl >= 0.0 { "+" } else { "" },
        pnl,
    ))
}

// ---------------------------------------------------------------------------
// View state + key handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Overview,
    Portfolio,
    Positions,
    Trades,
    Analytics,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Tab::Overview,
        Tab::Portfolio,
        Tab::Positions,
        Tab::Trades,
        Tab::Analytics,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Portfolio => "Portfolio",
            Tab::Positions => "Positions",
            Tab::Trades => "Trades",
            Tab::Analytics => "Analytics",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Refresh,
    SelectTab(Tab),
    NextTab,
    PrevTab,
    NextChart,
    PrevChart,
    CycleTimeframe,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub tab: Tab,
    pub selected_chart: ChartKind,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            tab: Tab::Overview,
            selected_chart: ChartKind::Volume,
        }
    }
}

impl ViewState {
    /// Apply navigation actions; data actions are left to the caller.
    pub fn navigate(&mut self, action: Action) {
        let n = Tab::ALL.len();
        match action {
            Action::SelectTab(tab) => self.tab = tab,
            Action::NextTab => self.tab = Tab::ALL[(self.tab.index() + 1) % n],
            Action::PrevTab => self.tab = Tab::ALL[(self.tab.index() + n - 1) % n],
            Action::NextChart => self.selected_chart = self.selected_chart.next(),
            Action::PrevChart => self.selected_chart = self.selected_chart.prev(),
            _ => {}
        }
    }
}

pub fn handle_event(event: &Event) -> Action {
    let Event::Key(key) = event else {
        return Action::None;
    };
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Refresh,
        KeyCode::Char('t') | KeyCode::Char('T') => Action::CycleTimeframe,
        KeyCode::Char(c @ '1'..='5') => Action::SelectTab(Tab::ALL[(c as u8 - b'1') as usize]),
        KeyCode::Tab => Action::NextTab,
        KeyCode::BackTab => Action::PrevTab,
        KeyCode::Right => Action::NextChart,
        KeyCode::Left => Action::PrevChart,
        _ => Action::None,
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, state: &AppState, view: &ViewState, network_label: &str) {
    let area = frame.area();

    if state.loading {
        let loading = Paragraph::new("⟳ Loading dashboard...")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(loading, area);
        return;
    }

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);

    render_header(frame, outer[0], state);
    render_tabs(frame, outer[1], view);

    match view.tab {
        Tab::Overview => render_overview(frame, outer[2], state),
        Tab::Portfolio => render_portfolio(frame, outer[2], state, network_label),
        Tab::Positions => render_positions(frame, outer[2], state),
        Tab::Trades => render_trades(frame, outer[2], state),
        Tab::Analytics => render_analytics(frame, outer[2], state, view.selected_chart),
    }
}

fn signed_color(value: f64) -> Color {
    if value >= 0.0 {
        Color::Green
    } else {
        Color::Red
    }
}

fn rgb(color: Rgb) -> Color {
    Color::Rgb(color.0, color.1, color.2)
}

fn symbol_or<'a>(symbol: Option<&'a str>, fallback: &'a str) -> &'a str {
    match symbol {
        Some(s) if !s.is_empty() => s,
        _ => fallback,
    }
}

fn base_symbol(state: &AppState) -> &str {
    symbol_or(
        state.metrics.get().map(|m| m.base_token_symbol.as_str()),
        DEFAULT_BASE_SYMBOL,
    )
}

fn quote_symbol(state: &AppState) -> &str {
    symbol_or(
        state.metrics.get().map(|m| m.quote_token_symbol.as_str()),
        DEFAULT_QUOTE_SYMBOL,
    )
}

/// Block title carrying the local time the panel's data last landed.
fn panel_title(name: &str, updated_at: Option<DateTime<Utc>>) -> String {
    match updated_at {
        Some(at) => format!(" {name} · as of {} ", at.with_timezone(&Local).format("%H:%M:%S")),
        None => format!(" {name} "),
    }
}

fn kv_line(label: &str, value: String, color: Option<Color>) -> Line<'static> {
    let style = color.map_or_else(Style::default, |c| Style::default().fg(c));
    Line::from(vec![
        Span::styled(format!("{label:<20}"), Style::default().fg(Color::DarkGray)),
        Span::styled(value, style.add_modifier(Modifier::BOLD)),
    ])
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

// ---------------------------------------------------------------------------
// Header + tabs
// ---------------------------------------------------------------------------

fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let last_update = state
        .last_update
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "—".into());

    let line = Line::from(vec![
        Span::styled(
            "  Trading Bot Dashboard  │ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{}/{} • ", base_symbol(state), quote_symbol(state))),
        Span::styled("● Live", Style::default().fg(Color::Green)),
        Span::raw(format!("  │ Last update: {last_update}  │ ")),
        Span::styled(
            "[r] refresh  [t] timeframe  [q] quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

fn render_tabs(frame: &mut Frame, area: Rect, view: &ViewState) {
    let titles: Vec<String> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{} {}", i + 1, t.title()))
        .collect();
    let tabs = Tabs::new(titles)
        .select(view.tab.index())
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

fn render_overview(frame: &mut Frame, area: Rect, state: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(area);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let m = state.metrics.get().cloned().unwrap_or_default();
    let base = base_symbol(state);

    let key_metrics = vec![
        kv_line("Open Positions", m.open_positions.to_string(), None),
        kv_line(
            "Total P&L",
            format!("{} {base}", format_number(m.total_pnl, 6)),
            Some(signed_color(m.total_pnl)),
        ),
        kv_line("Win Rate", format_percent(m.win_rate), None),
        kv_line("24h Trades", m.last_24h_trades.to_string(), None),
        kv_line(
            "Total Volume",
            format!("{} {base}", format_number(m.total_volume, 4)),
            None,
        ),
    ];
    frame.render_widget(
        Paragraph::new(key_metrics).block(
            Block::default()
                .borders(Borders::ALL)
                .title(panel_title("Key Metrics", state.metrics.updated_at())),
        ),
        rows[0],
    );

    let market = vec![
        kv_line("Current Price", format_number(m.last_price, 8), None),
        kv_line("Peak Price", format_number(m.peak_price, 8), None),
        kv_line(
            "Change from Peak",
            format_percent(m.pct_change_peak),
            Some(signed_color(m.pct_change_peak)),
        ),
        kv_line("Minutes Since Peak", format_number(m.minutes_since_peak, 1), None),
    ];
    frame.render_widget(
        Paragraph::new(market).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Market Information "),
        ),
        middle[0],
    );

    let (dip_label, dip_color) = if m.trailing_dip_active() {
        ("Active", Color::Yellow)
    } else {
        ("Inactive", Color::DarkGray)
    };
    let risk = vec![
        kv_line(
            "Total Deployed",
            format!("{} {base}", format_number(m.total_exposure, 4)),
            None,
        ),
        kv_line("Usage", format_percent(m.exposure_percentage), None),
        kv_line(
            "Remaining Capacity",
            format!("{} {base}", format_number(m.remaining_capacity, 4)),
            None,
        ),
        kv_line("Trailing DIP", dip_label.to_string(), Some(dip_color)),
    ];
    frame.render_widget(
        Paragraph::new(risk).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Risk Management "),
        ),
        middle[1],
    );

    render_logs(frame, rows[2], state);
}

fn render_logs(frame: &mut Frame, area: Rect, state: &AppState) {
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .take(area.height as usize)
        .map(|line| {
            let color = if line.contains("ERROR") {
                Color::Red
            } else if line.contains("timeframe") {
                Color::Yellow
            } else {
                Color::Gray
            };
            ListItem::new(Line::from(Span::styled(
                line.clone(),
                Style::default().fg(color),
            )))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Logs "))
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

fn render_portfolio(frame: &mut Frame, area: Rect, state: &AppState, network_label: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(0)])
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(rows[0]);

    let balances = state.balances.get();
    let tokens = [
        (balances.map(|b| &b.base_token), DEFAULT_BASE_SYMBOL),
        (balances.map(|b| &b.quote_token), DEFAULT_QUOTE_SYMBOL),
        (balances.map(|b| &b.native_token), "BNB"),
    ];

    for ((token, fallback), col) in tokens.into_iter().zip(cols.iter()) {
        let symbol = symbol_or(token.map(|t| t.symbol.as_str()), fallback);
        let (amount, usd, price) = token.map_or((0.0, 0.0, 0.0), |t| {
            (t.balance, t.balance_usd, t.price_usd)
        });
        let lines = vec![
            Line::from(Span::styled(
                format_number(amount, 4),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format_currency(usd)),
            Line::from(Span::styled(
                format!("Price: {}", format_currency(price)),
                Style::default().fg(Color::DarkGray),
            )),
        ];
        frame.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" {symbol} ")),
            ),
            *col,
        );
    }

    let total = balances.map_or(0.0, |b| b.portfolio.total_usd);
    let updated = balances
        .and_then(|b| b.portfolio.last_updated.as_deref())
        .map(datetime_label)
        .unwrap_or_else(|| "--".into());
    let summary = vec![
        kv_line("Total Portfolio Value", format_currency(total), None),
        kv_line("Last Updated", updated, None),
        kv_line("Network", network_label.to_string(), Some(Color::Cyan)),
    ];
    frame.render_widget(
        Paragraph::new(summary).block(
            Block::default()
                .borders(Borders::ALL)
                .title(panel_title("Portfolio Summary", state.balances.updated_at())),
        ),
        rows[1],
    );
}

// ---------------------------------------------------------------------------
// Open positions table
// ---------------------------------------------------------------------------

fn render_positions(frame: &mut Frame, area: Rect, state: &AppState) {
    let header = header_row(&[
        "ID", "Buy", "Current", "Amount", "Value", "P&L %", "P&L", "Age", "Trailing", "DCA",
    ]);

    let positions = state.open_positions();
    let rows: Vec<Row> = positions
        .iter()
        .map(|pos| {
            let pnl_color = signed_color(pos.pnl_absolute);
            Row::new(vec![
                Cell::from(pos.id.clone()),
                Cell::from(format_number(pos.buy_price, 8)),
                Cell::from(format_number(pos.current_price, 8)),
                Cell::from(format_number(pos.amount_out, 4)),
                Cell::from(format_number(pos.current_value, 4)),
                Cell::from(format_percent(pos.pnl_percent))
                    .style(Style::default().fg(signed_color(pos.pnl_percent))),
                Cell::from(format_number(pos.pnl_absolute, 6))
                    .style(Style::default().fg(pnl_color).add_modifier(Modifier::BOLD)),
                Cell::from(format!("{:.1}h", pos.age_hours)),
                Cell::from(pos.trailing_stop_status.clone()),
                Cell::from(pos.tranche_count().to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(11),
            Constraint::Length(7),
            Constraint::Length(10),
            Constraint::Min(4),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(panel_title(
                &format!("Open Positions ({})", positions.len()),
                state.positions.updated_at(),
            )),
    );

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Recent trades table
// ---------------------------------------------------------------------------

fn render_trades(frame: &mut Frame, area: Rect, state: &AppState) {
    let header = header_row(&["Time", "Side", "In", "Out", "Profit", "Profit %", "Reason"]);

    let trades = state.recent_trades();
    let rows: Vec<Row> = trades
        .iter()
        .map(|trade| {
            let profit_style = match trade.realised_profit() {
                Some(p) => Style::default().fg(signed_color(p)),
                None => Style::default().fg(Color::DarkGray),
            };
            let (profit, profit_pct) = if trade.has_profit {
                (
                    trade.display_profit.clone(),
                    trade.display_profit_pct.clone(),
                )
            } else {
                ("—".to_string(), "—".to_string())
            };
            Row::new(vec![
                Cell::from(datetime_label(&trade.timestamp)),
                Cell::from(trade.side.as_str()).style(Style::default().fg(match trade.side {
                    TradeSide::Buy => Color::Green,
                    TradeSide::Sell => Color::Red,
                })),
                Cell::from(trade.display_amount_in.clone()),
                Cell::from(trade.display_amount_out.clone()),
                Cell::from(profit).style(profit_style),
                Cell::from(profit_pct).style(profit_style),
                Cell::from(trade.reason.clone()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(5),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(panel_title(
                &format!("Recent Trades ({})", trades.len()),
                state.trades.updated_at(),
            )),
    );

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Analytics (charts)
// ---------------------------------------------------------------------------

fn render_analytics(frame: &mut Frame, area: Rect, state: &AppState, selected: ChartKind) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let mut cells = Vec::with_capacity(4);
    for row in rows.iter() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(*row);
        cells.extend(cols.iter().copied());
    }

    for (kind, cell) in ChartKind::ALL.into_iter().zip(cells) {
        let slot = state.chart(kind);
        let set = project(kind, slot.data.get());
        render_chart(frame, cell, &set, slot.timeframe.as_str(), kind == selected);
    }
}

fn render_chart(frame: &mut Frame, area: Rect, set: &SeriesSet, timeframe: &str, selected: bool) {
    let border = if selected {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(format!(" {} [{timeframe}] ", set.profile.title));

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(block.inner(area));
    frame.render_widget(block, area);

    let summary: Vec<Span> = set
        .summary
        .iter()
        .flat_map(|v| {
            [
                Span::styled(
                    format!("{}: ", v.field.name),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{}   ", v.display()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]
        })
        .collect();
    frame.render_widget(Paragraph::new(Line::from(summary)), parts[1]);

    if set.is_empty() {
        frame.render_widget(
            Paragraph::new("No data")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray)),
            parts[0],
        );
        return;
    }

    let points: Vec<Vec<(f64, f64)>> = set.series.iter().map(|s| s.points()).collect();
    let (graph_type, marker) = match set.profile.render {
        RenderKind::Bar => (GraphType::Bar, symbols::Marker::HalfBlock),
        RenderKind::Line => (GraphType::Line, symbols::Marker::Braille),
    };
    let datasets: Vec<Dataset> = set
        .series
        .iter()
        .zip(points.iter())
        .map(|(s, pts)| {
            Dataset::default()
                .name(s.name)
                .marker(marker)
                .graph_type(graph_type)
                .style(Style::default().fg(rgb(s.style.color)))
                .data(pts)
        })
        .collect();

    let last = set.labels.len().saturating_sub(1);
    let x_labels: Vec<Span> = [0, last / 2, last]
        .iter()
        .filter_map(|&i| set.labels.get(i))
        .map(|l| Span::raw(l.clone()))
        .collect();
    let [y_min, y_max] = set.y_bounds();

    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, last.max(1) as f64])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title(set.profile.y_axis_label)
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format_number(y_min, 2)),
                    Span::raw(format_number(y_max, 2)),
                ]),
        );
    frame.render_widget(chart, parts[0]);
}
