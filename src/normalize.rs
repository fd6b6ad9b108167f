//! Conversions from human-formatted money strings to values.
//!
//! Both functions are total: malformed input never panics or errors, it
//! falls back to [`Fee::NotAvailable`] or `None`.
//!
//! # Fee strings
//!
//! [`parse_fee`] is a string substitution pipeline, not arithmetic. The
//! multiplier markers are replaced by literal zeros *before* the decimal
//! point is removed, so `"€1.5m"` becomes `"1.5000000"` and then
//! `"15000000"`. Existing datasets were produced with exactly this
//! transformation, so the order below is the contract:
//!
//! 1. lowercase; any `"loan"` substring wins, then any `"free"` substring
//! 2. drop `€`
//! 3. `m` → `000000`
//! 4. `k` → `000`
//! 5. drop `.`
//! 6. drop `,`
//! 7. trim whitespace and parse as an integer

use std::fmt;

/// A normalized transfer fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fee {
    Loan,
    Free,
    Amount(i64),
    /// The fee text could not be read as a number.
    NotAvailable,
}

impl fmt::Display for Fee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fee::Loan => f.write_str("Loan"),
            Fee::Free => f.write_str("Free"),
            Fee::Amount(n) => write!(f, "{n}"),
            Fee::NotAvailable => f.write_str("N/A"),
        }
    }
}

/// Parse a transfer fee such as `"€5,000"`, `"€12m"`, `"Loan"` or `"Free transfer"`.
pub fn parse_fee(raw: &str) -> Fee {
    let fee_raw = raw.to_lowercase();
    if fee_raw.contains("loan") {
        return Fee::Loan;
    }
    if fee_raw.contains("free") {
        return Fee::Free;
    }

    let digits = fee_raw
        .replace('€', "")
        .replace('m', "000000")
        .replace('k', "000")
        .replace('.', "")
        .replace(',', "");

    match digits.trim().parse::<i64>() {
        Ok(n) => Fee::Amount(n),
        Err(_) => Fee::NotAvailable,
    }
}

/// Parse a listing market value such as `"€12M"` or `"€500K"` into euros.
///
/// Markers are case-sensitive. A value without `M` or `K` has no scale and
/// yields `None`, as does a non-numeric remainder.
pub fn parse_market_value(raw: &str) -> Option<f64> {
    let value = raw.replace('€', "");
    let (number, scale) = if value.contains('M') {
        (value.replace('M', ""), 1_000_000.0)
    } else if value.contains('K') {
        (value.replace('K', ""), 1_000.0)
    } else {
        return None;
    };
    number.trim().parse::<f64>().ok().map(|n| n * scale)
}

/// Parse a loose decimal such as a skill rating; blank or malformed input is `None`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
