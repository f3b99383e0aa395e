//! Core Data Models
//!
//! The data flows through these types in one direction:
//!
//! 1. **Raw Data**: an untyped JSON object read from a JSONL line
//! 2. **Normalized**: [`UsageEvent`] - one canonical usage record
//! 3. **Aggregated**: [`UsageSummary`] - overall [`TokenCounts`], per-model totals and
//!    a time series of [`Bucket`]s
//!
//! Aggregates are built once per run (or per refresh cycle) and are read-only
//! afterwards. Nothing here is persisted.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Model id used for records that carry usage but no real model attribution.
pub const SYNTHETIC_MODEL: &str = "synthetic";

/// One usage record extracted from a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl UsageEvent {
    pub fn is_synthetic(&self) -> bool {
        self.model_id == SYNTHETIC_MODEL
    }
}

/// The five accumulated sums: message count plus four token categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub messages: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    /// Sums saturate at `u64::MAX` instead of wrapping.
    pub fn record(&mut self, event: &UsageEvent) {
        self.messages = self.messages.saturating_add(1);
        self.input_tokens = self.input_tokens.saturating_add(event.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(event.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(event.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(event.cache_read_tokens);
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    pub fn is_empty(&self) -> bool {
        *self == TokenCounts::default()
    }
}

impl AddAssign<&TokenCounts> for TokenCounts {
    fn add_assign(&mut self, other: &TokenCounts) {
        self.messages = self.messages.saturating_add(other.messages);
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
    }
}

impl<'a> std::iter::Sum<&'a TokenCounts> for TokenCounts {
    fn sum<I: Iterator<Item = &'a TokenCounts>>(iter: I) -> Self {
        iter.fold(TokenCounts::default(), |mut acc, counts| {
            acc += counts;
            acc
        })
    }
}

/// Selects one of the numeric series held in [`TokenCounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Messages,
    Input,
    Output,
    CacheCreation,
    CacheRead,
}

impl Metric {
    pub fn of(self, counts: &TokenCounts) -> u64 {
        match self {
            Metric::Messages => counts.messages,
            Metric::Input => counts.input_tokens,
            Metric::Output => counts.output_tokens,
            Metric::CacheCreation => counts.cache_creation_tokens,
            Metric::CacheRead => counts.cache_read_tokens,
        }
    }
}

/// Per-model aggregate. `TOTAL` is never stored here; renderers compute it.
pub type ModelTotals = BTreeMap<String, TokenCounts>;

/// One time-series cell, keyed by its local wall-clock start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub start: NaiveDateTime,
    pub counts: TokenCounts,
    pub by_model: ModelTotals,
}

impl Bucket {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            start,
            counts: TokenCounts::default(),
            by_model: ModelTotals::new(),
        }
    }

    pub fn record(&mut self, event: &UsageEvent) {
        self.counts.record(event);
        self.by_model
            .entry(event.model_id.clone())
            .or_default()
            .record(event);
    }
}

/// Output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSummary {
    pub totals: TokenCounts,
    pub models: ModelTotals,
    pub series: BTreeMap<NaiveDateTime, Bucket>,
}

impl UsageSummary {
    pub fn is_empty(&self) -> bool {
        self.totals.messages == 0
    }

    /// Models ordered by descending message count, then by id.
    pub fn models_by_usage(&self) -> Vec<(&str, &TokenCounts)> {
        let mut rows: Vec<(&str, &TokenCounts)> = self
            .models
            .iter()
            .map(|(model, counts)| (model.as_str(), counts))
            .collect();
        rows.sort_by(|a, b| b.1.messages.cmp(&a.1.messages).then_with(|| a.0.cmp(b.0)));
        rows
    }
}
