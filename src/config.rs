/// config.rs – Load settings from dashboard.yaml + environment variables.
///
/// Environment variables always override YAML values.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::aggregator::DEFAULT_TRADES_WINDOW;
use crate::gateway::{resolve_base_url, HostContext, DEPLOYED_API_URL, LOCAL_API_URL};
use crate::models::Timeframe;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend used when running locally or headless.
    pub local_url: String,
    /// Backend used for any other host.
    pub deployed_url: String,
    /// Hostname the dashboard is served for; unset means headless.
    pub host: Option<String>,
    /// Explicit backend URL, bypassing host-based resolution.
    pub base_url: Option<String>,
    pub request_timeout_seconds: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            local_url: LOCAL_API_URL.into(),
            deployed_url: DEPLOYED_API_URL.into(),
            host: None,
            base_url: None,
            request_timeout_seconds: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Period of the full data + chart refresh.
    pub poll_interval_seconds: f64,
    /// How many of the most recent trades to keep.
    pub trades_window: usize,
    /// Timeframe every chart starts on.
    pub default_timeframe: Timeframe,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10.0,
            trades_window: DEFAULT_TRADES_WINDOW,
            default_timeframe: Timeframe::Day,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dashboard redraw rate in seconds.
    pub refresh_rate: f64,
    pub log_level: String,
    /// Log destination while the terminal UI owns the screen.
    pub log_file: String,
    /// Chain name shown on the portfolio tab.
    pub network_label: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 1.0,
            log_level: "INFO".into(),
            log_file: "dashboard.log".into(),
            network_label: "BSC".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiConfig,
    pub refresh: RefreshConfig,
    pub dashboard: DashboardConfig,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = Self::from_file(config_path)?;
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    fn from_file(config_path: &str) -> Result<Self> {
        if !std::path::Path::new(config_path).exists() {
            return Ok(Settings::default());
        }
        let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
        serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("DASHBOARD_HOST") {
            self.api.host = Some(host);
        }
        if let Some(url) = var("DASHBOARD_API_URL") {
            self.api.base_url = Some(url);
        }
    }

    /// Backend base URL: explicit override first, then host resolution.
    pub fn base_url(&self) -> String {
        match self.api.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => resolve_base_url(
                &HostContext::from_hostname(self.api.host.as_deref()),
                &self.api.local_url,
                &self.api.deployed_url,
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.api.request_timeout_seconds)
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_secs_f64(self.dashboard.refresh_rate)
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive("refresh.poll_interval_seconds", self.refresh.poll_interval_seconds)?;
        validate_positive("api.request_timeout_seconds", self.api.request_timeout_seconds)?;
        validate_positive("dashboard.refresh_rate", self.dashboard.refresh_rate)?;

        if self.refresh.trades_window == 0 {
            bail!("refresh.trades_window must be > 0");
        }
        if self.api.local_url.trim().is_empty() {
            bail!("api.local_url must not be empty");
        }
        if self.api.deployed_url.trim().is_empty() {
            bail!("api.deployed_url must not be empty");
        }
        if self.dashboard.log_file.trim().is_empty() {
            bail!("dashboard.log_file must not be empty");
        }
        Ok(())
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    if Duration::try_from_secs_f64(value).is_err() {
        bail!("{name} is too large to be a duration");
    }
    Ok(())
}
