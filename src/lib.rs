//! Claude Usage Chart Library
//!
//! Reads the JSONL conversation logs Claude Code writes under `~/.claude`
//! (and any `~/.claude/vms/*` instances), extracts token usage, and renders
//! it as terminal reports: overall totals, a per-model table and ASCII
//! time-series charts bucketed by the hour.
//!
//! ## Architecture Overview
//!
//! - [`parser`] - Root and file discovery, line-by-line JSONL streaming
//! - [`normalizer`] - Turns one raw record into a [`UsageEvent`] or a rejection
//! - [`aggregator`] - Time window, bucketing and per-model totals
//! - [`analyzer`] - Orchestrates scan, aggregation and rendering
//! - [`chart`] - Fixed-height ASCII charts sharing one Y-axis
//! - [`table`] - Overall stats and the per-model table
//! - [`units`] - K/M/B scaling and compact number formatting
//! - [`tray`] - The one-line "today" label for a tray indicator
//! - [`subscription`] - Parses a captured subscription usage screen
//! - [`monitor`] - Periodic refresh loop
//! - [`time`] - Timestamp parsing, display time zones and clocks
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging with pretty or JSON output
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use claude_usage_chart::{render_report, Config, ReportOptions, UsageAnalyzer};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let options = ReportOptions::from_config(&config, true)?;
//! let analyzer = UsageAnalyzer::from_config(&config);
//!
//! let report = analyzer.build_report(&options, chrono::Utc::now())?;
//! println!("{}", render_report(&report, &options));
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod chart;
pub mod config;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod normalizer;
pub mod parser;
pub mod subscription;
pub mod table;
pub mod time;
pub mod tray;
pub mod units;

pub use analyzer::{render_report, report_json, DataStatus, ReportOptions, UsageAnalyzer, UsageReport};
pub use config::Config;
pub use models::*;
