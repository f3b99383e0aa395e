//! Number formatting for token counts.
//!
//! Three styles are used. Charts use compact magnitudes (`45.9K`, `1.2M`)
//! with at most three significant digits. The tray label uses the same
//! magnitudes without a trailing `.0` (`32K`, `5M`). Tables use full precision
//! with comma grouping (`45,900`).

use serde::Serialize;

/// Magnitude suffix for compact display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Unit {
    One,
    Thousand,
    Million,
    Billion,
}

impl Unit {
    /// Unit a value would pick on its own.
    pub fn for_value(value: u64) -> Self {
        match value {
            0..=999 => Unit::One,
            1_000..=999_999 => Unit::Thousand,
            1_000_000..=999_999_999 => Unit::Million,
            _ => Unit::Billion,
        }
    }

    pub fn divisor(self) -> u64 {
        match self {
            Unit::One => 1,
            Unit::Thousand => 1_000,
            Unit::Million => 1_000_000,
            Unit::Billion => 1_000_000_000,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Unit::One => "",
            Unit::Thousand => "K",
            Unit::Million => "M",
            Unit::Billion => "B",
        }
    }

    fn next(self) -> Option<Unit> {
        match self {
            Unit::One => Some(Unit::Thousand),
            Unit::Thousand => Some(Unit::Million),
            Unit::Million => Some(Unit::Billion),
            Unit::Billion => None,
        }
    }

    /// Format `value` in this unit, whatever its own magnitude.
    ///
    /// Quotients below 100 keep one decimal, larger ones none. Plain counts
    /// are rounded to an integer.
    pub fn format(self, value: f64) -> String {
        if self == Unit::One {
            return format!("{:.0}", value);
        }
        let quotient = value / self.divisor() as f64;
        if (quotient * 10.0).round() < 1000.0 {
            format!("{:.1}{}", quotient, self.suffix())
        } else {
            format!("{:.0}{}", quotient, self.suffix())
        }
    }
}

/// Compact display of a single count: `999`, `1.0K`, `45.9K`, `115K`, `1.2M`.
pub fn format_compact(value: u64) -> String {
    let mut unit = Unit::for_value(value);
    if unit != Unit::One {
        // 999_950 would print as "1000K"
        let quotient = value as f64 / unit.divisor() as f64;
        if quotient.round() >= 1000.0 {
            if let Some(next) = unit.next() {
                unit = next;
            }
        }
    }
    unit.format(value as f64)
}

/// Compact display without a zero decimal: `32K`, `5M`, `1.2M`, `45.9K`.
pub fn format_short(value: u64) -> String {
    // at most one decimal digit, so ".0" can only sit before the suffix
    format_compact(value).replacen(".0", "", 1)
}

/// Full-precision count with thousands separators.
pub fn format_with_commas(value: u64) -> String {
    let digits = value.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result
}
