//! Display formatting shared by the list, the popups and the modal.

use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::models::Price;

/// Shown when a timestamp is missing or unparsable.
pub const UNKNOWN_TIME: &str = "Neznámo";

fn area_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d+)\s*(?:m\s*[2²]|metr[ůu]\s+čtverečn\p{L}*|čtverečn\p{L}*\s+metr\p{L}*|m\s+čtverečn\p{L}*|m\b)",
        )
        .expect("Invalid regex")
    })
}

/// Normalise the many ways listings spell square metres to "N m²".
pub fn format_area(text: &str) -> String {
    area_regex().replace_all(text, "$1 m²").into_owned()
}

/// Group digits in threes: "12000 Kč" becomes "12 000".
pub fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

pub fn format_price(price: &Price) -> String {
    group_digits(price.amount())
}

/// "12 000 Kč/měsíc"
pub fn monthly_price(price: &Price) -> String {
    format!("{} Kč/měsíc", format_price(price))
}

/// Parse the timestamp formats the backend emits. Values without a zone are
/// local time.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%d_%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// "DD.MM.YYYY HH:MM" in local time, [`UNKNOWN_TIME`] when unparsable.
pub fn format_datetime(value: Option<&str>) -> String {
    value
        .and_then(parse_timestamp)
        .map(|time| time.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| UNKNOWN_TIME.to_string())
}

/// Text of the active-count badge.
pub fn active_count_label(total: u64, displayed: u64) -> String {
    if total > displayed && displayed > 0 {
        format!("{} z {}", group_digits(displayed), group_digits(total))
    } else if total > 0 {
        group_digits(total)
    } else {
        group_digits(displayed)
    }
}

/// Cut `text` to `max` characters, ending in "..." when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
