//! Usage Analysis Engine
//!
//! Orchestrates one full pass: discover log files, normalize every record,
//! aggregate the window, then render. The same engine backs the one-shot
//! report, each monitor cycle and the tray label.
//!
//! ## Pipeline
//!
//! 1. **Discovery**: [`FileParser`] finds roots and JSONL files, skipping files
//!    last modified before the window
//! 2. **Normalization**: [`EventCollector`] keeps usage-bearing records
//! 3. **Aggregation**: [`aggregate`] builds totals, model totals and buckets
//! 4. **Rendering**: overall stats, model table, token chart, cache chart
//!
//! Renderers are independent: a chart that cannot be drawn is replaced by a
//! one-line notice and everything else still prints.

use crate::aggregator::{aggregate, reset_boundary, totals_since_reset, AggregationWindow};
use crate::chart::{cache_series, render_chart, token_series, ChartFrame, ChartOptions, Series};
use crate::config::Config;
use crate::models::{TokenCounts, UsageSummary};
use crate::parser::{CollectedEvents, EventCollector, FileParser, RejectionCounts, ScanStats};
use crate::table::{render_model_table, render_overall_stats};
use crate::time::DisplayTz;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const NO_DATA_MESSAGE: &str = "No usage data found.";

/// What the scan turned up, from nothing at all to a usable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    /// No Claude root with a `projects` directory.
    MissingSource,
    /// Logs exist but none carry usage.
    NoRecords,
    /// Usage exists, all of it before the window.
    NoneInWindow,
    Available,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub days: u32,
    pub tz: DisplayTz,
    pub interval_hours: u32,
    pub chart: ChartOptions,
}

impl ReportOptions {
    pub fn from_config(config: &Config, color: bool) -> Result<Self> {
        let report = &config.report;
        Ok(Self {
            days: report.days,
            tz: config.display_tz()?,
            interval_hours: report.interval_hours,
            chart: ChartOptions {
                title: String::new(),
                height: report.chart_height,
                column_width: report.column_width,
                tick_hours: report.tick_hours,
                max_columns: report.max_columns,
                color,
            },
        })
    }

    pub fn window(&self, now: DateTime<Utc>) -> AggregationWindow {
        AggregationWindow::new(now, self.days, self.tz, self.interval_hours)
    }
}

#[derive(Debug, Clone)]
pub struct UsageReport {
    pub window: AggregationWindow,
    pub summary: UsageSummary,
    pub status: DataStatus,
    pub stats: ScanStats,
    pub rejected: RejectionCounts,
}

/// Tray reading: either the since-reset sums or a note that there is no log root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodayReading {
    NoSource,
    Counts(TokenCounts),
}

pub struct UsageAnalyzer {
    parser: FileParser,
}

impl UsageAnalyzer {
    pub fn new(parser: FileParser) -> Self {
        Self { parser }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(FileParser::from_config(&config.paths))
    }

    /// Normalize every record in files touched since `since`.
    pub fn collect(&self, since: Option<DateTime<Utc>>) -> Result<(CollectedEvents, ScanStats)> {
        let (collected, stats) = self.parser.scan(since.as_ref(), EventCollector::new())?;
        if collected.rejected.total() > 0 {
            debug!(rejected = ?collected.rejected, "Records without usage skipped");
        }
        Ok((collected, stats))
    }

    pub fn build_report(&self, options: &ReportOptions, now: DateTime<Utc>) -> Result<UsageReport> {
        let window = options.window(now);
        let (collected, stats) = self.collect(Some(window.earliest_utc()))?;
        let summary = aggregate(&collected.events, window);

        let status = if stats.roots == 0 {
            warn!(claude_home = %self.parser.claude_home().display(), "No Claude projects directory found");
            DataStatus::MissingSource
        } else if collected.events.is_empty() {
            DataStatus::NoRecords
        } else if summary.is_empty() {
            DataStatus::NoneInWindow
        } else {
            DataStatus::Available
        };

        debug!(
            events = collected.events.len(),
            in_window = summary.totals.messages,
            models = summary.models.len(),
            buckets = summary.series.len(),
            ?status,
            "Report built"
        );

        Ok(UsageReport {
            window,
            summary,
            status,
            stats,
            rejected: collected.rejected,
        })
    }

    /// Sums since the most recent reset hour.
    pub fn today(&self, now: DateTime<Utc>, tz: DisplayTz, reset_hour: u32) -> Result<TodayReading> {
        if !self.parser.has_sources() {
            return Ok(TodayReading::NoSource);
        }
        // a day of slack covers any offset between file mtimes and local time
        let boundary = reset_boundary(now, tz, reset_hour);
        let since = now - (tz.to_local(now) - boundary) - Duration::days(1);
        let (collected, _) = self.collect(Some(since))?;
        Ok(TodayReading::Counts(totals_since_reset(
            &collected.events,
            now,
            tz,
            reset_hour,
        )))
    }
}

fn chart_section(report: &UsageReport, options: &ReportOptions, title: &str, lines: &[Series]) -> String {
    let chart_options = ChartOptions {
        title: format!(
            "{} ({}-hour intervals, {})",
            title,
            report.window.interval_hours,
            report.window.tz.name()
        ),
        ..options.chart.clone()
    };
    let frame = ChartFrame::from_window(&report.window);

    match render_chart(&report.summary.series, lines, &frame, &chart_options) {
        Ok(chart) => chart,
        Err(e) => {
            warn!(error = %e, chart = title, "Chart skipped");
            format!("{}: chart unavailable ({})", title, e)
        }
    }
}

/// Full text report.
pub fn render_report(report: &UsageReport, options: &ReportOptions) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "Claude usage for the last {} day(s), since {} ({})",
        report.window.days,
        report.window.start().format("%Y-%m-%d %H:%M"),
        report.window.tz.name()
    ));
    if report.status != DataStatus::Available {
        sections.push(NO_DATA_MESSAGE.to_string());
    }

    sections.push(render_overall_stats(&report.summary.totals));
    sections.push(render_model_table(&report.summary));
    sections.push(chart_section(report, options, "Token Usage Over Time", &token_series()));
    sections.push(chart_section(report, options, "Cache Token Usage Over Time", &cache_series()));

    sections.join("\n\n")
}

/// Machine-readable report.
pub fn report_json(report: &UsageReport) -> Value {
    let models: Vec<Value> = report
        .summary
        .models_by_usage()
        .into_iter()
        .map(|(model, counts)| {
            json!({
                "model": model,
                "counts": counts,
                "total_tokens": counts.total_tokens(),
            })
        })
        .collect();

    let buckets: Vec<Value> = report
        .summary
        .series
        .values()
        .map(|bucket| {
            json!({
                "start": bucket.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "counts": bucket.counts,
                "by_model": bucket.by_model,
            })
        })
        .collect();

    json!({
        "status": report.status,
        "window": {
            "start": report.window.start().format("%Y-%m-%dT%H:%M:%S").to_string(),
            "days": report.window.days,
            "interval_hours": report.window.interval_hours,
            "timezone": report.window.tz.name(),
        },
        "totals": report.summary.totals,
        "total_tokens": report.summary.totals.total_tokens(),
        "models": models,
        "buckets": buckets,
        "scan": report.stats,
        "rejected": report.rejected,
    })
}
