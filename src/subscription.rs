//! Subscription quota screen
//!
//! The interactive CLI prints a quota screen (`/usage`) that looks like:
//!
//! ```text
//! Current session
//! ██████▌                                            13% used
//! Resets 4pm (America/Los_Angeles)
//!
//! Current week (all models)
//! ████████████                                       24% used
//! Resets Nov 18, 3pm (America/Los_Angeles)
//!
//! Current week (Sonnet only)
//! █▌                                                  3% used
//! ```
//!
//! Capturing the screen is someone else's job; this module takes the captured
//! text, strips terminal escapes, extracts the three percentages and two reset
//! times, and turns a reset time into a countdown with a usage projection.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Length of the rolling session window.
pub const SESSION_MINUTES: i64 = 300;
/// Length of the weekly window.
pub const WEEK_MINUTES: i64 = 10_080;

const TABLE_WIDTH: usize = 90;
const BAR_WIDTH: usize = 47;
const LABEL_WIDTH: usize = 30;
const CATEGORY_PREFIXES: [&str; 3] = ["Current ", "Daily ", "Monthly "];
const FALLBACK_MODEL_LABEL: &str = "Opus";

/// `4pm (America/Los_Angeles)` split into its two halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSpec {
    pub time: String,
    pub timezone: String,
}

impl fmt::Display for ResetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.time, self.timezone)
    }
}

/// One category block from the structured pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaEntry {
    pub name: String,
    pub percentage: u32,
    pub reset: Option<ResetSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionUsage {
    pub session_pct: u32,
    pub week_all_pct: u32,
    pub week_model_pct: u32,
    /// Model named by the third quota line, e.g. `Sonnet` or `Opus`.
    pub week_model_label: String,
    pub session_reset: Option<ResetSpec>,
    pub week_reset: Option<ResetSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetCountdown {
    pub remaining_minutes: i64,
    /// `2 day(s) 3 hr(s) 15 min(s)`
    pub remaining: String,
    /// Share of the current period already gone, 0 to 100.
    pub elapsed_pct: f64,
    /// End-of-period usage if consumption keeps its current pace.
    pub predicted_pct: f64,
}

/// Compiled patterns for cleaning and reading the quota screen.
pub struct ScreenParser {
    ansi: Regex,
    control: Regex,
    percent: Regex,
    reset: Regex,
    clock: Regex,
    parenthesized: Regex,
}

impl ScreenParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            ansi: Regex::new(
                r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[PX^_][^\x1b]*\x1b\\|\x1b[@-Z\\-_=><]",
            )
            .context("Invalid ANSI pattern")?,
            control: Regex::new(r"[\x00-\x09\x0b-\x1f\x7f]").context("Invalid control pattern")?,
            percent: Regex::new(r"(\d+)%\s*used").context("Invalid percentage pattern")?,
            reset: Regex::new(r"Resets\s+(.+?)\s*\(([^)]+)\)").context("Invalid reset pattern")?,
            clock: Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*([ap]m)$")
                .context("Invalid clock pattern")?,
            parenthesized: Regex::new(r"\(([^)]+)\)").context("Invalid label pattern")?,
        })
    }

    /// Strip escape sequences, carriage returns and other control characters.
    pub fn clean(&self, raw: &str) -> String {
        let without_escapes = self.ansi.replace_all(raw, "");
        self.control.replace_all(&without_escapes, "").into_owned()
    }

    /// Category blocks: a header line, a `NN% used` line, an optional `Resets` line.
    pub fn entries(&self, text: &str) -> Vec<QuotaEntry> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut entries = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let is_header = CATEGORY_PREFIXES.iter().any(|prefix| line.starts_with(prefix));
            let percentage = lines
                .get(i + 1)
                .and_then(|next| self.percent.captures(next))
                .and_then(|caps| caps[1].parse::<u32>().ok());

            match (is_header, percentage) {
                (true, Some(percentage)) => {
                    let reset = lines
                        .get(i + 2)
                        .filter(|next| next.starts_with("Resets "))
                        .and_then(|next| self.reset_spec(next));
                    entries.push(QuotaEntry {
                        name: line.to_string(),
                        percentage,
                        reset,
                    });
                    i += 3;
                }
                _ => i += 1,
            }
        }

        entries
    }

    fn reset_spec(&self, text: &str) -> Option<ResetSpec> {
        self.reset.captures(text).map(|caps| ResetSpec {
            time: caps[1].trim().to_string(),
            timezone: caps[2].trim().to_string(),
        })
    }

    /// Parse a captured screen. Tries the structured layout first, then falls
    /// back to the first three percentages and first two reset lines in order.
    pub fn parse(&self, raw: &str) -> Option<SubscriptionUsage> {
        let text = self.clean(raw);
        let entries = self.entries(&text);
        if entries.is_empty() {
            return self.parse_positional(&text);
        }

        let mut usage = SubscriptionUsage {
            session_pct: 0,
            week_all_pct: 0,
            week_model_pct: 0,
            week_model_label: FALLBACK_MODEL_LABEL.to_string(),
            session_reset: None,
            week_reset: None,
        };

        for entry in entries {
            let name = entry.name.to_lowercase();
            if name.contains("session") {
                usage.session_pct = entry.percentage;
                usage.session_reset = entry.reset;
            } else if name.contains("week") && name.contains("all") {
                usage.week_all_pct = entry.percentage;
                usage.week_reset = entry.reset;
            } else if name.contains("week") {
                usage.week_model_pct = entry.percentage;
                if let Some(label) = self.model_label(&entry.name) {
                    usage.week_model_label = label;
                }
                if usage.week_reset.is_none() {
                    usage.week_reset = entry.reset;
                }
            }
        }

        Some(usage)
    }

    fn parse_positional(&self, text: &str) -> Option<SubscriptionUsage> {
        let percentages: Vec<u32> = self
            .percent
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse().ok())
            .collect();
        if percentages.len() < 3 {
            return None;
        }
        let mut resets = text.lines().filter_map(|line| self.reset_spec(line));

        Some(SubscriptionUsage {
            session_pct: percentages[0],
            week_all_pct: percentages[1],
            week_model_pct: percentages[2],
            week_model_label: FALLBACK_MODEL_LABEL.to_string(),
            session_reset: resets.next(),
            week_reset: resets.next(),
        })
    }

    /// `Current week (Sonnet only)` -> `Sonnet`
    fn model_label(&self, name: &str) -> Option<String> {
        self.parenthesized.captures(name).map(|caps| {
            caps[1]
                .trim()
                .trim_end_matches(" only")
                .trim()
                .to_string()
        })
    }

    /// Time until `reset` and how far through its period we are.
    ///
    /// Returns `None` when the reset string or its timezone cannot be read.
    pub fn countdown(
        &self,
        reset: &ResetSpec,
        period_minutes: i64,
        used_pct: u32,
        now: DateTime<Utc>,
    ) -> Option<ResetCountdown> {
        let tz: Tz = reset.timezone.parse().ok()?;
        let reset_at = self.next_reset(&reset.time, tz, now)?;

        let total_seconds = (reset_at - now).num_seconds().max(0);
        let remaining_minutes = total_seconds / 60;

        let period = period_minutes.max(1) as f64;
        let remaining_in_period = (total_seconds as f64 / 60.0) % period;
        let elapsed_pct = ((period - remaining_in_period) / period * 100.0).clamp(0.0, 100.0);
        let predicted_pct = if elapsed_pct > 0.0 {
            f64::from(used_pct) / elapsed_pct * 100.0
        } else {
            0.0
        };

        Some(ResetCountdown {
            remaining_minutes,
            remaining: format_remaining(total_seconds),
            elapsed_pct,
            predicted_pct,
        })
    }

    /// Resolve `4pm`, `4:30pm` or `Nov 18, 3pm` to the next such instant in `tz`.
    fn next_reset(&self, text: &str, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&tz).naive_local();
        let text = text.trim().trim_end_matches(',');

        let (date_part, time_part) = match text.rsplit_once(',') {
            Some((date, time)) => (Some(date.trim()), time.trim()),
            None => (None, text),
        };
        let time = self.parse_clock(time_part)?;

        let target = match date_part {
            Some(date) => {
                let day =
                    NaiveDate::parse_from_str(&format!("{} {}", date, local_now.year()), "%b %d %Y")
                        .ok()?;
                let candidate = day.and_time(time);
                if candidate < local_now {
                    candidate.with_year(local_now.year() + 1)?
                } else {
                    candidate
                }
            }
            None => {
                let candidate = local_now.date().and_time(time);
                if candidate < local_now {
                    candidate + Duration::days(1)
                } else {
                    candidate
                }
            }
        };

        resolve_local(tz, target)
    }

    fn parse_clock(&self, text: &str) -> Option<NaiveTime> {
        let caps = self.clock.captures(text.trim())?;
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = caps[3].eq_ignore_ascii_case("pm");
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        NaiveTime::from_hms_opt(hour, minute, 0)
    }
}

fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `X day(s) Y hr(s) Z min(s)`, leading zero units omitted.
fn format_remaining(total_seconds: i64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{} day(s)", days));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{} hr(s)", hours));
    }
    parts.push(format!("{} min(s)", minutes));
    parts.join(" ")
}

fn quota_row(label: &str, pct: u32) -> String {
    let filled = (pct.min(100) as usize * BAR_WIDTH) / 100;
    format!(
        "{:<lw$}: {:<bw$}| {:>2}% used|",
        label,
        "█".repeat(filled),
        pct,
        lw = LABEL_WIDTH,
        bw = BAR_WIDTH
    )
}

fn unavailable_row(label: &str) -> String {
    format!(
        "{:<lw$}: {:<bw$}| N/A    |",
        label,
        "",
        lw = LABEL_WIDTH,
        bw = BAR_WIDTH
    )
}

fn week_model_title(label: &str) -> String {
    format!("Current week ({})", label)
}

/// Quota table plus reset countdowns. `None` renders the `N/A` table.
pub fn render_subscription(
    parser: &ScreenParser,
    usage: Option<&SubscriptionUsage>,
    now: DateTime<Utc>,
) -> String {
    let rule = "=".repeat(TABLE_WIDTH);

    let Some(usage) = usage else {
        return [
            rule.clone(),
            unavailable_row("Current session"),
            unavailable_row("Current week (all models)"),
            unavailable_row(&week_model_title(FALLBACK_MODEL_LABEL)),
            rule,
            "Session resets: N/A".to_string(),
            "Weekly resets:  N/A".to_string(),
        ]
        .join("\n");
    };

    let mut lines = vec![
        rule.clone(),
        quota_row("Current session", usage.session_pct),
        quota_row("Current week (all models)", usage.week_all_pct),
        quota_row(&week_model_title(&usage.week_model_label), usage.week_model_pct),
        rule,
        String::new(),
    ];

    let periods = [
        ("Session resets at: ", &usage.session_reset, SESSION_MINUTES, usage.session_pct),
        ("Weekly resets at:  ", &usage.week_reset, WEEK_MINUTES, usage.week_all_pct),
    ];
    for (index, (title, reset, period, used)) in periods.into_iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        match reset {
            Some(reset) => {
                lines.push(format!("{}{}", title, reset));
                if let Some(countdown) = parser.countdown(reset, period, used, now) {
                    lines.push(format!(
                        "{}└─ Resets in {}, {:.1}% time passed, {:.1}% token usage predicted",
                        " ".repeat(title.len()),
                        countdown.remaining,
                        countdown.elapsed_pct,
                        countdown.predicted_pct
                    ));
                }
            }
            None => lines.push(format!("{}Unknown", title)),
        }
    }

    lines.join("\n")
}

/// Everything `subscription --json` prints.
#[derive(Debug, Serialize)]
pub struct SubscriptionReport {
    pub usage: Option<SubscriptionUsage>,
    pub session_countdown: Option<ResetCountdown>,
    pub week_countdown: Option<ResetCountdown>,
}

impl SubscriptionReport {
    pub fn new(parser: &ScreenParser, usage: Option<SubscriptionUsage>, now: DateTime<Utc>) -> Self {
        let countdown = |reset: &Option<ResetSpec>, period: i64, used: u32| {
            reset
                .as_ref()
                .and_then(|reset| parser.countdown(reset, period, used, now))
        };
        let session_countdown = usage
            .as_ref()
            .and_then(|u| countdown(&u.session_reset, SESSION_MINUTES, u.session_pct));
        let week_countdown = usage
            .as_ref()
            .and_then(|u| countdown(&u.week_reset, WEEK_MINUTES, u.week_all_pct));

        Self {
            usage,
            session_countdown,
            week_countdown,
        }
    }
}
