//! Record normalization
//!
//! Turns one raw log object into a [`UsageEvent`], or rejects it. Log lines are
//! heterogeneous: user turns, tool results and summaries share the files with
//! assistant turns that carry token usage. Nothing about the schema is assumed
//! beyond a small set of field aliases, and every lookup checks presence
//! explicitly. Rejection is a normal outcome, not an error.
//!
//! Two usage shapes are recognized:
//!
//! - Claude Code: `message.usage` (or top-level `usage`) with
//!   `input_tokens`, `output_tokens`, `cache_creation_input_tokens`,
//!   `cache_read_input_tokens`
//! - Gemini CLI session messages: a top-level `tokens` object with `input`,
//!   `output`, `cached`, `thoughts` and `tool`. Cached tokens are part of
//!   `input` there, so they are moved to cache read; thoughts count as output
//!   and tool prompts as input, which keeps the total equal to Gemini's own.

use crate::models::{UsageEvent, SYNTHETIC_MODEL};
use crate::time::parse_timestamp;
use serde_json::{Map, Value};

const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "created_at", "createdAt"];
const MODEL_FIELDS: &[&str] = &["model"];

const INPUT_FIELDS: &[&str] = &["input_tokens"];
const OUTPUT_FIELDS: &[&str] = &["output_tokens"];
const CACHE_CREATION_FIELDS: &[&str] = &["cache_creation_input_tokens", "cache_creation_tokens"];
const CACHE_READ_FIELDS: &[&str] = &["cache_read_input_tokens", "cache_read_tokens"];

const GEMINI_TOKENS: &str = "tokens";
const GEMINI_MESSAGE_TYPE: &str = "gemini";

/// Model value the CLI writes for locally generated messages.
const CLI_SYNTHETIC_MARKER: &str = "<synthetic>";

/// Why a record produced no event. Only used for debug accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
    MissingTimestamp,
    BadTimestamp,
    NoUsage,
}

/// Token fields found in one usage object.
#[derive(Debug, Default)]
struct Counts {
    input: u64,
    output: u64,
    cache_creation: u64,
    cache_read: u64,
}

/// Normalize a raw record, dropping the rejection reason.
pub fn normalize(record: &Value) -> Option<UsageEvent> {
    classify(record).ok()
}

/// Normalize a raw record, reporting why it was rejected.
pub fn classify(record: &Value) -> Result<UsageEvent, Rejection> {
    let object = record.as_object().ok_or(Rejection::NotAnObject)?;
    let message = object.get("message").and_then(Value::as_object);

    let raw_timestamp = first_str(object, TIMESTAMP_FIELDS).ok_or(Rejection::MissingTimestamp)?;
    let timestamp = parse_timestamp(raw_timestamp).map_err(|_| Rejection::BadTimestamp)?;

    let claude_usage = message
        .and_then(|m| m.get("usage"))
        .and_then(Value::as_object)
        .or_else(|| object.get("usage").and_then(Value::as_object));

    let counts = match claude_usage {
        Some(usage) => claude_counts(usage),
        None => gemini_usage(object).and_then(gemini_counts),
    }
    .ok_or(Rejection::NoUsage)?;

    let model_id = message
        .and_then(|m| first_str(m, MODEL_FIELDS))
        .or_else(|| first_str(object, MODEL_FIELDS))
        .map(str::trim)
        .filter(|model| !model.is_empty() && *model != CLI_SYNTHETIC_MARKER)
        .unwrap_or(SYNTHETIC_MODEL)
        .to_string();

    Ok(UsageEvent {
        timestamp,
        model_id,
        input_tokens: counts.input,
        output_tokens: counts.output,
        cache_creation_tokens: counts.cache_creation,
        cache_read_tokens: counts.cache_read,
    })
}

fn claude_counts(usage: &Map<String, Value>) -> Option<Counts> {
    let input = first_count(usage, INPUT_FIELDS);
    let output = first_count(usage, OUTPUT_FIELDS);
    let cache_creation = first_count(usage, CACHE_CREATION_FIELDS);
    let cache_read = first_count(usage, CACHE_READ_FIELDS);

    if input.is_none() && output.is_none() && cache_creation.is_none() && cache_read.is_none() {
        return None;
    }
    Some(Counts {
        input: input.unwrap_or(0),
        output: output.unwrap_or(0),
        cache_creation: cache_creation.unwrap_or(0),
        cache_read: cache_read.unwrap_or(0),
    })
}

/// The `tokens` object of a Gemini reply; other message types never count.
fn gemini_usage(object: &Map<String, Value>) -> Option<&Map<String, Value>> {
    let is_reply = object
        .get("type")
        .and_then(Value::as_str)
        .map_or(true, |kind| kind == GEMINI_MESSAGE_TYPE);
    if !is_reply {
        return None;
    }
    object.get(GEMINI_TOKENS).and_then(Value::as_object)
}

fn gemini_counts(tokens: &Map<String, Value>) -> Option<Counts> {
    let field = |key: &str| tokens.get(key).and_then(as_count);
    let input = field("input");
    let output = field("output");
    let cached = field("cached");
    let thoughts = field("thoughts");
    let tool = field("tool");

    if [input, output, cached, thoughts, tool].iter().all(Option::is_none) {
        return None;
    }
    let cached = cached.unwrap_or(0);
    Some(Counts {
        input: input
            .unwrap_or(0)
            .saturating_sub(cached)
            .saturating_add(tool.unwrap_or(0)),
        output: output.unwrap_or(0).saturating_add(thoughts.unwrap_or(0)),
        cache_creation: 0,
        cache_read: cached,
    })
}

fn first_str<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| object.get(*key).and_then(Value::as_str))
}

fn first_count(object: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| object.get(*key).and_then(as_count))
}

/// Non-negative integers, or non-negative floats below 2^64 truncated toward
/// zero. Anything else counts as absent.
fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && *f < u64::MAX as f64)
        .map(|f| f as u64)
}
