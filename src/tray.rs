//! Single-line label for a desktop tray indicator.
//!
//! The indicator itself lives outside this crate; it runs the `today` command
//! on a timer and shows whatever line comes back.

use crate::models::TokenCounts;
use crate::units::format_short;

/// Shown when there is no log root to read from.
pub const NO_DATA_LABEL: &str = "Error: No data";

/// `I: 32K  O: 5K  CI: 123M  CO: 5M`
///
/// `CI` is cache read ("cache in") and `CO` is cache creation.
pub fn format_tray_label(counts: &TokenCounts) -> String {
    format!(
        "I: {}  O: {}  CI: {}  CO: {}",
        format_short(counts.input_tokens),
        format_short(counts.output_tokens),
        format_short(counts.cache_read_tokens),
        format_short(counts.cache_creation_tokens),
    )
}
