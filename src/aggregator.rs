//! Usage aggregation
//!
//! Folds [`UsageEvent`]s into a [`UsageSummary`]: overall totals, a per-model
//! breakdown and an hourly (or wider) time series. All three come out of the
//! same pass over the same filtered events, so they always agree.
//!
//! Bucketing happens on local wall-clock time: an event is converted to the
//! display timezone first and then truncated to the interval boundary, so
//! buckets line up with the hour marks the reader sees.

use crate::models::{Bucket, TokenCounts, UsageEvent, UsageSummary};
use crate::time::DisplayTz;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use tracing::debug;

/// Parameters of one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub now: DateTime<Utc>,
    pub days: u32,
    pub tz: DisplayTz,
    pub interval_hours: u32,
}

impl AggregationWindow {
    pub fn new(now: DateTime<Utc>, days: u32, tz: DisplayTz, interval_hours: u32) -> Self {
        Self {
            now,
            days,
            tz,
            interval_hours: snap_interval(interval_hours),
        }
    }

    /// Local midnight `days` days before today. Events at or after it count.
    pub fn start(&self) -> NaiveDateTime {
        let today = self.tz.to_local(self.now).date();
        (today - Duration::days(i64::from(self.days))).and_time(NaiveTime::MIN)
    }

    pub fn contains(&self, event: &UsageEvent) -> bool {
        self.tz.to_local(event.timestamp) >= self.start()
    }

    /// Start of the bucket `ts` falls into.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        truncate_to_interval(self.tz.to_local(ts), self.interval_hours)
    }

    pub fn buckets_per_day(&self) -> usize {
        (24 / self.interval_hours) as usize
    }

    /// Buckets covering every day from [`Self::start`] through the end of today.
    pub fn bucket_count(&self) -> usize {
        (self.days as usize + 1) * self.buckets_per_day()
    }

    /// Earliest UTC instant that can still be inside the window, with a day of
    /// slack for timezone offsets. Used to skip old files cheaply.
    pub fn earliest_utc(&self) -> DateTime<Utc> {
        self.now - Duration::days(i64::from(self.days) + 2)
    }
}

/// Largest divisor of 24 not above `hours`, so every day holds a whole
/// number of buckets: 5 becomes 4, 0 becomes 1, 30 becomes 24.
pub fn snap_interval(hours: u32) -> u32 {
    let hours = hours.clamp(1, 24);
    (1..=hours).rev().find(|h| 24 % h == 0).unwrap_or(1)
}

/// Floor a local time to a multiple of `interval_hours` within its day.
pub fn truncate_to_interval(local: NaiveDateTime, interval_hours: u32) -> NaiveDateTime {
    let interval = snap_interval(interval_hours);
    let hour = (local.hour() / interval) * interval;
    local
        .date()
        .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

/// Single-pass accumulator behind [`aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    window: AggregationWindow,
    summary: UsageSummary,
    excluded: u64,
    synthetic: u64,
}

impl Aggregator {
    pub fn new(window: AggregationWindow) -> Self {
        Self {
            window,
            summary: UsageSummary::default(),
            excluded: 0,
            synthetic: 0,
        }
    }

    /// Add one event. Returns `false` when it falls before the window.
    pub fn add(&mut self, event: &UsageEvent) -> bool {
        if !self.window.contains(event) {
            self.excluded += 1;
            return false;
        }
        if event.is_synthetic() {
            self.synthetic += 1;
        }

        self.summary.totals.record(event);
        self.summary
            .models
            .entry(event.model_id.clone())
            .or_default()
            .record(event);

        let start = self.window.bucket_start(event.timestamp);
        self.summary
            .series
            .entry(start)
            .or_insert_with(|| Bucket::new(start))
            .record(event);

        true
    }

    /// Events dropped by the lookback filter so far.
    pub fn excluded(&self) -> u64 {
        self.excluded
    }

    pub fn finish(self) -> UsageSummary {
        debug!(
            kept = self.summary.totals.messages,
            excluded = self.excluded(),
            synthetic = self.synthetic,
            window_start = %self.window.start(),
            "Aggregation finished"
        );
        self.summary
    }
}

/// Aggregate a sequence of events in one pass.
pub fn aggregate<'a, I>(events: I, window: AggregationWindow) -> UsageSummary
where
    I: IntoIterator<Item = &'a UsageEvent>,
{
    let mut aggregator = Aggregator::new(window);
    for event in events {
        aggregator.add(event);
    }
    aggregator.finish()
}

/// Local instant that starts "today" for the tray: today's `reset_hour`, or
/// yesterday's when the local clock has not reached it yet.
pub fn reset_boundary(now: DateTime<Utc>, tz: DisplayTz, reset_hour: u32) -> NaiveDateTime {
    let local_now = tz.to_local(now);
    let reset_time = NaiveTime::from_hms_opt(reset_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let boundary = local_now.date().and_time(reset_time);
    if local_now < boundary {
        boundary - Duration::days(1)
    } else {
        boundary
    }
}

/// Sum of every event at or after the reset boundary. One bucket, no series.
pub fn totals_since_reset<'a, I>(
    events: I,
    now: DateTime<Utc>,
    tz: DisplayTz,
    reset_hour: u32,
) -> TokenCounts
where
    I: IntoIterator<Item = &'a UsageEvent>,
{
    let boundary = reset_boundary(now, tz, reset_hour);
    let mut counts = TokenCounts::default();
    for event in events {
        if tz.to_local(event.timestamp) >= boundary {
            counts.record(event);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;

    const UTC: DisplayTz = DisplayTz::Named(Tz::UTC);

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn event(ts: DateTime<Utc>, model: &str, input: u64) -> UsageEvent {
        UsageEvent {
            timestamp: ts,
            model_id: model.to_string(),
            input_tokens: input,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    #[test]
    fn test_bucket_truncation() {
        let window = AggregationWindow::new(at(2025, 3, 10, 20, 0, 0), 7, UTC, 1);
        assert_eq!(window.bucket_start(at(2025, 3, 10, 14, 37, 12)), local(2025, 3, 10, 14));
        assert_eq!(window.bucket_start(at(2025, 3, 10, 15, 0, 0)), local(2025, 3, 10, 15));
        assert_eq!(window.bucket_start(at(2025, 3, 10, 14, 59, 59)), local(2025, 3, 10, 14));
    }

    #[test]
    fn test_truncation_happens_in_display_timezone() {
        let tz: DisplayTz = "Asia/Kolkata".parse().unwrap();
        let window = AggregationWindow::new(at(2025, 3, 10, 20, 0, 0), 7, tz, 1);
        // 09:10 UTC is 14:40 in UTC+05:30
        assert_eq!(window.bucket_start(at(2025, 3, 10, 9, 10, 0)), local(2025, 3, 10, 14));
    }

    #[test]
    fn test_wider_intervals() {
        let window = AggregationWindow::new(at(2025, 3, 10, 20, 0, 0), 7, UTC, 3);
        assert_eq!(window.bucket_start(at(2025, 3, 10, 17, 59, 0)), local(2025, 3, 10, 15));
        assert_eq!(window.buckets_per_day(), 8);
        assert_eq!(window.bucket_count(), 64);
    }

    #[test]
    fn test_interval_snaps_to_divisor_of_24() {
        assert_eq!(snap_interval(5), 4);
        assert_eq!(snap_interval(0), 1);
        assert_eq!(snap_interval(7), 6);
        assert_eq!(snap_interval(24), 24);
        assert_eq!(snap_interval(30), 24);

        let window = AggregationWindow::new(at(2025, 3, 10, 20, 0, 0), 0, UTC, 5);
        assert_eq!(window.interval_hours, 4);
        assert_eq!(window.buckets_per_day(), 6);
        // the last bucket of the day still belongs to the frame
        let last = window.bucket_start(at(2025, 3, 10, 22, 30, 0));
        assert_eq!(last, local(2025, 3, 10, 20));
        assert_eq!(truncate_to_interval(local(2025, 3, 10, 22), 5), last);
    }

    #[test]
    fn test_window_start_is_inclusive_midnight() {
        let now = at(2025, 3, 10, 12, 0, 0);
        let window = AggregationWindow::new(now, 7, UTC, 1);
        assert_eq!(window.start(), local(2025, 3, 3, 0));

        let exactly_seven_days = event(now - Duration::hours(7 * 24), "m", 1);
        let at_start = event(at(2025, 3, 3, 0, 0, 0), "m", 1);
        let just_before = event(at(2025, 3, 2, 23, 59, 59), "m", 1);
        assert!(window.contains(&exactly_seven_days));
        assert!(window.contains(&at_start));
        assert!(!window.contains(&just_before));
    }

    #[test]
    fn test_aggregate_filters_and_counts_exclusions() {
        let now = at(2025, 3, 10, 12, 0, 0);
        let mut aggregator = Aggregator::new(AggregationWindow::new(now, 1, UTC, 1));
        assert!(aggregator.add(&event(at(2025, 3, 10, 1, 0, 0), "m", 5)));
        assert!(!aggregator.add(&event(at(2025, 3, 1, 1, 0, 0), "m", 5)));
        assert_eq!(aggregator.excluded(), 1);
        let summary = aggregator.finish();
        assert_eq!(summary.totals.messages, 1);
        assert_eq!(summary.series.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let window = AggregationWindow::new(at(2025, 3, 10, 12, 0, 0), 7, UTC, 1);
        let summary = aggregate(&Vec::<UsageEvent>::new(), window);
        assert!(summary.is_empty());
        assert!(summary.models.is_empty());
        assert!(summary.series.is_empty());
        assert_eq!(summary.totals, TokenCounts::default());
    }

    #[test]
    fn test_two_models_in_one_hour() {
        let now = at(2025, 3, 10, 20, 0, 0);
        let mut events = vec![
            event(at(2025, 3, 10, 14, 5, 0), "sonnet", 500),
            event(at(2025, 3, 10, 14, 20, 0), "sonnet", 300),
            event(at(2025, 3, 10, 14, 50, 0), "haiku", 50),
        ];
        events[0].output_tokens = 100;
        events[1].output_tokens = 80;
        events[2].output_tokens = 10;

        let summary = aggregate(&events, AggregationWindow::new(now, 7, UTC, 1));
        assert_eq!(summary.totals.messages, 3);
        assert_eq!(summary.totals.input_tokens, 850);
        assert_eq!(summary.totals.output_tokens, 190);

        let sonnet = summary.models["sonnet"];
        assert_eq!((sonnet.messages, sonnet.input_tokens, sonnet.output_tokens), (2, 800, 180));
        let haiku = summary.models["haiku"];
        assert_eq!((haiku.messages, haiku.input_tokens, haiku.output_tokens), (1, 50, 10));

        assert_eq!(summary.series.len(), 1);
        let bucket = &summary.series[&local(2025, 3, 10, 14)];
        assert_eq!(bucket.counts.input_tokens, 850);
        assert_eq!(bucket.counts.output_tokens, 190);
        assert_eq!(bucket.by_model.len(), 2);
    }

    #[test]
    fn test_sonnet_haiku_scenario() {
        let now = at(2025, 3, 10, 20, 0, 0);
        let mut a = event(at(2025, 3, 10, 10, 5, 0), "sonnet", 500);
        a.output_tokens = 100;
        let mut b = event(at(2025, 3, 10, 10, 40, 0), "sonnet", 500);
        b.cache_read_tokens = 1000;
        let mut c = event(at(2025, 3, 10, 14, 15, 0), "haiku", 0);
        c.output_tokens = 50;

        let summary = aggregate(&[a, b, c], AggregationWindow::new(now, 7, UTC, 1));

        let counts = |messages, input, output, cache_read| TokenCounts {
            messages,
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: 0,
            cache_read_tokens: cache_read,
        };
        assert_eq!(summary.models.len(), 2);
        assert_eq!(summary.models["sonnet"], counts(2, 1000, 100, 1000));
        assert_eq!(summary.models["haiku"], counts(1, 0, 50, 0));
        assert_eq!(summary.totals, counts(3, 1000, 150, 1000));

        let starts: Vec<NaiveDateTime> = summary.series.keys().copied().collect();
        assert_eq!(starts, vec![local(2025, 3, 10, 10), local(2025, 3, 10, 14)]);

        let ten = &summary.series[&local(2025, 3, 10, 10)];
        assert_eq!(ten.counts, counts(2, 1000, 100, 1000));
        assert_eq!(ten.by_model["sonnet"], counts(2, 1000, 100, 1000));
        let fourteen = &summary.series[&local(2025, 3, 10, 14)];
        assert_eq!(fourteen.counts, counts(1, 0, 50, 0));
        assert_eq!(fourteen.by_model["haiku"], counts(1, 0, 50, 0));
    }

    #[test]
    fn test_oversized_counts_do_not_abort() {
        let now = at(2025, 3, 10, 20, 0, 0);
        let records = [
            serde_json::json!({"timestamp": "2025-03-10T10:00:00Z", "usage": {"input_tokens": 1e30, "output_tokens": 1}}),
            serde_json::json!({"timestamp": "2025-03-10T10:10:00Z", "usage": {"input_tokens": 1e30, "output_tokens": 2}}),
            serde_json::json!({"timestamp": "2025-03-10T10:20:00Z", "usage": {"input_tokens": u64::MAX}}),
            serde_json::json!({"timestamp": "2025-03-10T10:30:00Z", "usage": {"input_tokens": u64::MAX}}),
        ];
        let events: Vec<UsageEvent> = records
            .iter()
            .filter_map(crate::normalizer::normalize)
            .collect();
        assert_eq!(events.len(), 4);

        let summary = aggregate(&events, AggregationWindow::new(now, 7, UTC, 1));
        assert_eq!(summary.totals.messages, 4);
        assert_eq!(summary.totals.input_tokens, u64::MAX);
        assert_eq!(summary.totals.output_tokens, 3);
        assert_eq!(summary.totals.total_tokens(), u64::MAX);
    }

    #[test]
    fn test_totals_models_and_series_agree() {
        let now = at(2025, 3, 10, 20, 0, 0);
        let mut events = Vec::new();
        for i in 0..40u32 {
            let model = ["opus", "sonnet", "haiku"][(i % 3) as usize];
            let mut e = event(now - Duration::minutes(i64::from(i) * 97), model, u64::from(i) * 11);
            e.output_tokens = u64::from(i);
            e.cache_creation_tokens = u64::from(i % 5);
            e.cache_read_tokens = u64::from(i) * 3;
            events.push(e);
        }

        let summary = aggregate(&events, AggregationWindow::new(now, 1, UTC, 1));
        let from_models: TokenCounts = summary.models.values().sum();
        let from_series: TokenCounts = summary.series.values().map(|b| &b.counts).sum();
        assert_eq!(from_models, summary.totals);
        assert_eq!(from_series, summary.totals);
        assert!(summary.totals.messages < 40);
    }

    #[test]
    fn test_reset_boundary() {
        // after 03:00: today's 03:00
        assert_eq!(reset_boundary(at(2025, 3, 10, 9, 0, 0), UTC, 3), local(2025, 3, 10, 3));
        // before 03:00: yesterday's 03:00
        assert_eq!(reset_boundary(at(2025, 3, 10, 2, 59, 0), UTC, 3), local(2025, 3, 9, 3));
        // exactly 03:00 starts a new day
        assert_eq!(reset_boundary(at(2025, 3, 10, 3, 0, 0), UTC, 3), local(2025, 3, 10, 3));
    }

    #[test]
    fn test_totals_since_reset() {
        let now = at(2025, 3, 10, 9, 0, 0);
        let events = vec![
            event(at(2025, 3, 10, 2, 0, 0), "m", 100),
            event(at(2025, 3, 10, 3, 0, 0), "m", 20),
            event(at(2025, 3, 10, 8, 30, 0), "m", 3),
        ];
        let counts = totals_since_reset(&events, now, UTC, 3);
        assert_eq!(counts.messages, 2);
        assert_eq!(counts.input_tokens, 23);
    }
}
