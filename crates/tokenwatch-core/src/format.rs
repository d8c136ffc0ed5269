//! Display formatting for numbers, money and timestamps
//!
//! Dates are rendered in UTC.

use chrono::{TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// `1234567` -> `1,234,567`
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// USD with two to four decimals: `$1,234.50`, `$0.0003`, `-$2.00`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let abs = rounded.abs();

    let text = abs.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let mut frac = frac_part.to_string();
    while frac.len() < 2 {
        frac.push('0');
    }
    let int_value: u64 = int_part.parse().unwrap_or(0);
    format!("{sign}${}.{frac}", format_number(int_value))
}

/// `Jan 2, 2024`
pub fn format_date(timestamp_ms: i64) -> String {
    format_millis(timestamp_ms, "%b %-d, %Y")
}

/// `Jan 2, 2024, 03:04:05 PM`
pub fn format_date_time(timestamp_ms: i64) -> String {
    format_millis(timestamp_ms, "%b %-d, %Y, %I:%M:%S %p")
}

fn format_millis(timestamp_ms: i64, pattern: &str) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt.format(pattern).to_string(),
        None => timestamp_ms.to_string(),
    }
}

/// Keep `length` characters at each end: `abcdef12...7890abcd`.
pub fn truncate_hash(hash: &str, length: usize) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() <= length * 2 {
        return hash.to_string();
    }
    let head: String = chars[..length].iter().collect();
    let tail: String = chars[chars.len() - length..].iter().collect();
    format!("{head}...{tail}")
}
