//! Human-readable duration parsing and formatting.
//!
//! The grammar is whitespace-separated `<int><unit>` tokens with units
//! `y` (365 days), `d`, `h`, `m`, `s` — e.g. `"8h"` or `"1d 12h 30m"`.
//! Used for soft-lock expiries and for rendering how long a hard lock has
//! been held.

use chrono::TimeDelta;

use crate::error::ErrorCode;

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3600;
const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_YEAR: i64 = 365 * SECS_PER_DAY;

/// Errors from duration parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// The input contained no tokens.
    #[error("duration string is empty")]
    Empty,

    /// A token did not match `<int><unit>` with a known unit.
    #[error("invalid duration token {token:?}")]
    BadToken { token: String },

    /// The total duration does not fit the supported range.
    #[error("duration value out of range")]
    Overflow,
}

impl DurationError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::DurationParseError
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Parse a duration string like `"8h"` or `"1d 12h"`.
///
/// # Errors
///
/// [`DurationError::Empty`] for a blank input, [`DurationError::BadToken`]
/// for any token that is not `<int><unit>`, [`DurationError::Overflow`]
/// when the total does not fit the supported range.
pub fn parse_duration(input: &str) -> Result<TimeDelta, DurationError> {
    let mut seconds: i64 = 0;
    let mut tokens = 0;
    for token in input.split_whitespace() {
        tokens += 1;
        // split_whitespace never yields empty tokens
        let unit_len = token.chars().last().map_or(0, char::len_utf8);
        let (amount, unit) = token.split_at(token.len() - unit_len);
        let amount: i64 = amount.parse().map_err(|_| DurationError::BadToken {
            token: token.to_string(),
        })?;
        let per_unit = match unit {
            "y" => SECS_PER_YEAR,
            "d" => SECS_PER_DAY,
            "h" => SECS_PER_HOUR,
            "m" => SECS_PER_MINUTE,
            "s" => 1,
            _ => {
                return Err(DurationError::BadToken {
                    token: token.to_string(),
                });
            }
        };
        seconds = amount
            .checked_mul(per_unit)
            .and_then(|part| seconds.checked_add(part))
            .ok_or(DurationError::Overflow)?;
    }
    if tokens == 0 {
        return Err(DurationError::Empty);
    }
    TimeDelta::try_seconds(seconds).ok_or(DurationError::Overflow)
}

/// Format a duration as its largest-units-first components, e.g. `"1d 2h"`.
///
/// Sub-second and negative durations render as `"0s"`.
#[must_use]
pub fn format_duration(delta: TimeDelta) -> String {
    let mut remaining = delta.num_seconds().max(0);
    let mut parts = Vec::new();
    for (per_unit, suffix) in [
        (SECS_PER_YEAR, "y"),
        (SECS_PER_DAY, "d"),
        (SECS_PER_HOUR, "h"),
        (SECS_PER_MINUTE, "m"),
        (1, "s"),
    ] {
        let amount = remaining / per_unit;
        if amount > 0 {
            parts.push(format!("{amount}{suffix}"));
            remaining -= amount * per_unit;
        }
    }
    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}
