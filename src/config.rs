//! Configuration system
//!
//! Layers, lowest precedence first:
//! - Built-in defaults
//! - The first config file found (`usage-chart.toml`, `.usage-chart.toml`,
//!   `<config dir>/claude-usage-chart/config.toml`)
//! - Environment variables
//! - Command-line flags (applied by the binary)
//!
//! [`Config::validate`] runs last and rejects values the renderers cannot use.

use crate::time::DisplayTz;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub report: ReportConfig,
    pub tray: TrayConfig,
    pub monitor: MonitorConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// `console`, `file` or `both`
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Lookback in whole days before today.
    pub days: u32,
    pub interval_hours: u32,
    /// IANA zone name; empty means the system zone.
    pub timezone: String,
    pub chart_height: usize,
    pub column_width: usize,
    pub tick_hours: u32,
    pub max_columns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    /// Local hour at which "today" starts.
    pub reset_hour: u32,
    pub refresh_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub claude_home: PathBuf,
    pub include_vms: bool,
    pub gemini_home: PathBuf,
    pub include_gemini: bool,
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            days: 7,
            interval_hours: 1,
            timezone: String::new(),
            chart_height: 38,
            column_width: 1,
            tick_hours: 6,
            max_columns: 500,
        }
    }
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            reset_hour: 3,
            refresh_secs: 300,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            claude_home: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".claude"),
            include_vms: true,
            gemini_home: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".gemini"),
            include_gemini: false,
            log_directory: dirs::data_local_dir()
                .map(|d| d.join("claude-usage-chart").join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs")),
        }
    }
}

impl Config {
    /// Defaults, then the first config file found, then the environment.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            Some(PathBuf::from("usage-chart.toml")),
            Some(PathBuf::from(".usage-chart.toml")),
            dirs::config_dir().map(|d| d.join("claude-usage-chart").join("config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    #[cfg(not(feature = "toml"))]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Err(anyhow!(
            "Config file {} found but TOML support is disabled (enable the `basic` feature)",
            path.display()
        ))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup. [`Self::apply_env_overrides`]
    /// passes the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Some(val) = lookup("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Some(val) = lookup("CLAUDE_USAGE_DAYS") {
            self.report.days = val.parse().context("Invalid CLAUDE_USAGE_DAYS")?;
        }
        if let Some(val) = lookup("CLAUDE_USAGE_TIMEZONE") {
            self.report.timezone = val;
        }
        if let Some(val) = lookup("CLAUDE_USAGE_INTERVAL_HOURS") {
            self.report.interval_hours = val
                .parse()
                .context("Invalid CLAUDE_USAGE_INTERVAL_HOURS")?;
        }
        if let Some(val) = lookup("CLAUDE_USAGE_CHART_HEIGHT") {
            self.report.chart_height = val.parse().context("Invalid CLAUDE_USAGE_CHART_HEIGHT")?;
        }
        if let Some(val) = lookup("CLAUDE_USAGE_RESET_HOUR") {
            self.tray.reset_hour = val.parse().context("Invalid CLAUDE_USAGE_RESET_HOUR")?;
        }

        if let Some(val) = lookup("CLAUDE_CONFIG_DIR") {
            self.paths.claude_home = PathBuf::from(val);
        }
        if let Some(val) = lookup("GEMINI_CONFIG_DIR") {
            self.paths.gemini_home = PathBuf::from(val);
        }
        if let Some(val) = lookup("CLAUDE_USAGE_INCLUDE_GEMINI") {
            self.paths.include_gemini = val
                .parse()
                .context("Invalid CLAUDE_USAGE_INCLUDE_GEMINI, expected true or false")?;
        }
        if let Some(val) = lookup("CLAUDE_USAGE_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let report = &self.report;

        if report.interval_hours == 0 || report.interval_hours > 24 || 24 % report.interval_hours != 0 {
            return Err(anyhow!(
                "Interval must divide 24 hours (1, 2, 3, 4, 6, 8, 12 or 24), got {}",
                report.interval_hours
            ));
        }
        if report.chart_height < 2 {
            return Err(anyhow!(
                "Chart height must be at least 2 rows, got {}",
                report.chart_height
            ));
        }
        if report.column_width == 0 {
            return Err(anyhow!("Column width must be greater than 0"));
        }
        if report.tick_hours == 0 {
            return Err(anyhow!("Tick spacing must be greater than 0"));
        }
        if self.tray.reset_hour > 23 {
            return Err(anyhow!(
                "Reset hour must be between 0 and 23, got {}",
                self.tray.reset_hour
            ));
        }
        if self.monitor.interval_secs == 0 {
            return Err(anyhow!("Monitor interval must be greater than 0"));
        }
        if self.tray.refresh_secs == 0 {
            return Err(anyhow!("Tray refresh interval must be greater than 0"));
        }

        self.display_tz()?;

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => return Err(anyhow!("Unknown log format '{}'", other)),
        }
        match self.logging.output.as_str() {
            "console" | "file" | "both" => {}
            other => return Err(anyhow!("Unknown log output '{}'", other)),
        }

        Ok(())
    }

    pub fn display_tz(&self) -> Result<DisplayTz> {
        DisplayTz::from_config(Some(&self.report.timezone))
    }
}
