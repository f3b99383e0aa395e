//! ASCII Time-Series Charts
//!
//! Renders a bucketed [`UsageSummary`] series as a fixed-height text grid:
//!
//! ```text
//! Token Usage Over Time (1-hour intervals, Local Time)
//!         Sun 03/09                Mon 03/10
//!           45.9K                     12K
//!  46K │          ▓█                │  █
//!  ... │          ▓▓                │  ▓
//!    0 └────────────────────────────┴────────────────────────
//!             06    12    18              06    12    18
//! ```
//!
//! Every sub-series shares one Y-axis and one [`Unit`]. When several series
//! reach the same row in a column, the shortest one is drawn so that smaller
//! values stay visible in front of larger ones; equal heights go to the series
//! listed first.

use crate::aggregator::AggregationWindow;
use crate::models::{Bucket, Metric};
use crate::units::{format_compact, Unit};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use colored::{Color, Colorize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

pub const DEFAULT_HEIGHT: usize = 38;
pub const DEFAULT_COLUMN_WIDTH: usize = 1;
pub const DEFAULT_TICK_HOURS: u32 = 6;
pub const DEFAULT_MAX_COLUMNS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("no buckets to chart")]
    NoBuckets,

    #[error(
        "chart would be {width} columns wide (maximum is {max}); \
         use a longer interval or a shorter time range"
    )]
    TooWide { width: usize, max: usize },

    #[error("chart height must be at least 2 rows, got {0}")]
    TooShort(usize),
}

/// One line of the chart: which metric, drawn with which glyph.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: &'static str,
    pub metric: Metric,
    pub glyph: char,
    pub color: Color,
}

/// Input and output tokens.
pub fn token_series() -> Vec<Series> {
    vec![
        Series {
            name: "Input",
            metric: Metric::Input,
            glyph: '█',
            color: Color::BrightCyan,
        },
        Series {
            name: "Output",
            metric: Metric::Output,
            glyph: '▓',
            color: Color::BrightGreen,
        },
    ]
}

/// Cache creation and cache read tokens.
pub fn cache_series() -> Vec<Series> {
    vec![
        Series {
            name: "Cache creation",
            metric: Metric::CacheCreation,
            glyph: '▒',
            color: Color::Yellow,
        },
        Series {
            name: "Cache read",
            metric: Metric::CacheRead,
            glyph: '░',
            color: Color::Magenta,
        },
    ]
}

/// The run of buckets the chart spans, whether or not they hold data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartFrame {
    pub start: NaiveDateTime,
    pub buckets: usize,
    pub interval_hours: u32,
}

impl ChartFrame {
    /// Every bucket from the window start through the end of today.
    pub fn from_window(window: &AggregationWindow) -> Self {
        Self {
            start: window.start(),
            buckets: window.bucket_count(),
            interval_hours: window.interval_hours,
        }
    }

    pub fn bucket_start(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::hours(index as i64 * i64::from(self.interval_hours))
    }

    pub fn end(&self) -> NaiveDateTime {
        self.bucket_start(self.buckets.saturating_sub(1))
    }
}

#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub title: String,
    pub height: usize,
    pub column_width: usize,
    pub tick_hours: u32,
    pub max_columns: usize,
    pub color: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            height: DEFAULT_HEIGHT,
            column_width: DEFAULT_COLUMN_WIDTH,
            tick_hours: DEFAULT_TICK_HOURS,
            max_columns: DEFAULT_MAX_COLUMNS,
            color: true,
        }
    }
}

/// Consecutive buckets that share a local calendar day.
struct DaySegment {
    date: NaiveDate,
    first: usize,
    len: usize,
}

impl DaySegment {
    fn range(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.len
    }
}

fn day_segments(frame: &ChartFrame) -> Vec<DaySegment> {
    let mut segments: Vec<DaySegment> = Vec::new();
    for index in 0..frame.buckets {
        let date = frame.bucket_start(index).date();
        match segments.last_mut() {
            Some(segment) if segment.date == date => segment.len += 1,
            _ => segments.push(DaySegment {
                date,
                first: index,
                len: 1,
            }),
        }
    }
    segments
}

/// Round up to two significant digits: 45_900 -> 46_000, 99 -> 99.
fn round_up_two_significant(value: u64) -> u64 {
    let mut magnitude = 1u64;
    while value / magnitude >= 100 {
        magnitude *= 10;
    }
    value.div_ceil(magnitude).saturating_mul(magnitude)
}

/// Rows reached by `value` on a `rows`-high axis topping out at `scale_max`.
fn bar_height(value: u64, rows: usize, scale_max: u64) -> usize {
    if value == 0 || scale_max == 0 {
        return 0;
    }
    let scaled = (u128::from(value) * rows as u128).div_ceil(u128::from(scale_max));
    scaled.min(rows as u128) as usize
}

/// Series drawn at `row`: among those reaching it, the lowest bar, first-listed on ties.
fn cell_owner(heights: &[usize], row: usize) -> Option<usize> {
    heights
        .iter()
        .enumerate()
        .filter(|(_, height)| **height > row)
        .min_by_key(|(index, height)| (**height, *index))
        .map(|(index, _)| index)
}

fn center(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{:^width$}", truncated, width = width)
}

fn paint(text: String, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).to_string()
    } else {
        text
    }
}

/// Render `lines` over `series` for every bucket in `frame`.
pub fn render_chart(
    series: &BTreeMap<NaiveDateTime, Bucket>,
    lines: &[Series],
    frame: &ChartFrame,
    options: &ChartOptions,
) -> Result<String, ChartError> {
    if frame.buckets == 0 {
        return Err(ChartError::NoBuckets);
    }
    if options.height < 2 {
        return Err(ChartError::TooShort(options.height));
    }

    let column_width = options.column_width.max(1);
    let segments = day_segments(frame);
    let width = frame.buckets * column_width + segments.len().saturating_sub(1);
    if width > options.max_columns {
        return Err(ChartError::TooWide {
            width,
            max: options.max_columns,
        });
    }

    // values[bucket][series]
    let values: Vec<Vec<u64>> = (0..frame.buckets)
        .map(|index| {
            let bucket = series.get(&frame.bucket_start(index));
            lines
                .iter()
                .map(|line| bucket.map_or(0, |b| line.metric.of(&b.counts)))
                .collect()
        })
        .collect();

    let rows = options.height;
    let max = values.iter().flatten().copied().max().unwrap_or(0);
    let unit = Unit::for_value(max);
    let mut scale_max = round_up_two_significant(max);
    if unit == Unit::One {
        // whole tokens per row at minimum
        scale_max = scale_max.max(rows as u64);
    }

    let heights: Vec<Vec<usize>> = values
        .iter()
        .map(|column| {
            column
                .iter()
                .map(|value| bar_height(*value, rows, scale_max))
                .collect()
        })
        .collect();

    let labels: Vec<String> = (0..rows)
        .map(|row| unit.format(scale_max as f64 * (row + 1) as f64 / rows as f64))
        .collect();
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(1);
    let gutter = " ".repeat(label_width + 2);

    let mut out = String::new();
    if !options.title.is_empty() {
        let _ = writeln!(out, "{}", options.title);
        let _ = writeln!(out, "{}", "=".repeat(width + label_width + 2));
    }

    // Day headers: weekday and date, then the day's total across all lines.
    let mut dates = Vec::with_capacity(segments.len());
    let mut totals = Vec::with_capacity(segments.len());
    for segment in &segments {
        let segment_width = segment.len * column_width;
        let total = values[segment.range()]
            .iter()
            .flatten()
            .fold(0u64, |acc, value| acc.saturating_add(*value));
        dates.push(center(&segment.date.format("%a %m/%d").to_string(), segment_width));
        totals.push(center(&format_compact(total), segment_width));
    }
    let _ = writeln!(out, "{}{}", gutter, dates.join(" "));
    let _ = writeln!(out, "{}{}", gutter, totals.join(" "));

    for row in (0..rows).rev() {
        let mut line = format!("{:>w$} │", labels[row], w = label_width);
        for (position, segment) in segments.iter().enumerate() {
            if position > 0 {
                line.push('│');
            }
            for index in segment.range() {
                let cell = match cell_owner(&heights[index], row) {
                    Some(owner) => paint(
                        lines[owner].glyph.to_string().repeat(column_width),
                        lines[owner].color,
                        options.color,
                    ),
                    None => " ".repeat(column_width),
                };
                line.push_str(&cell);
            }
        }
        let _ = writeln!(out, "{}", line);
    }

    let axis: Vec<String> = segments
        .iter()
        .map(|segment| "─".repeat(segment.len * column_width))
        .collect();
    let _ = writeln!(out, "{}└{}", " ".repeat(label_width + 1), axis.join("┴"));

    let ticks: Vec<String> = segments
        .iter()
        .map(|segment| tick_labels(frame, segment, column_width, options.tick_hours))
        .collect();
    let _ = writeln!(out, "{}{}", gutter, ticks.join(" ").trim_end());

    let legend: Vec<String> = lines
        .iter()
        .map(|line| {
            format!(
                "{} {}",
                paint(line.glyph.to_string(), line.color, options.color),
                line.name
            )
        })
        .collect();
    let _ = writeln!(out);
    let _ = writeln!(out, "Legend: {}", legend.join("  "));
    let _ = writeln!(
        out,
        "Time span: {} to {}",
        frame.start.format("%Y-%m-%d %H:%M"),
        frame.end().format("%Y-%m-%d %H:%M")
    );
    let _ = write!(out, "Buckets: {}", frame.buckets);

    Ok(out)
}

/// Two-digit hour marks every `tick_hours`, skipping midnight and any mark
/// that would collide with the previous one.
fn tick_labels(
    frame: &ChartFrame,
    segment: &DaySegment,
    column_width: usize,
    tick_hours: u32,
) -> String {
    let width = segment.len * column_width;
    let mut cells = vec![' '; width];
    let mut next_free = 0;
    let tick_hours = tick_hours.max(1);

    for (offset, index) in segment.range().enumerate() {
        let hour = frame.bucket_start(index).hour();
        if hour == 0 || hour % tick_hours != 0 {
            continue;
        }
        let position = offset * column_width;
        let label = format!("{:02}", hour);
        if position < next_free || position + label.len() > width {
            continue;
        }
        for (i, ch) in label.chars().enumerate() {
            cells[position + i] = ch;
        }
        next_free = position + label.len() + 1;
    }

    cells.into_iter().collect()
}
