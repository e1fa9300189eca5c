// Timestamp parsing utilities
// Author: Gabriel Demetrios Lafis

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Format used when a timestamp is rendered as text
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
];

const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S%.f", "%m/%d/%Y %H:%M"];
const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];

const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S%.f",
];
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"];

/// Order used to read ambiguous numeric dates such as `03/04/2024`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    MonthFirst,
    DayFirst,
}

impl DateOrder {
    /// Resolve the date order from a culture name.
    ///
    /// The invariant culture and US English read month first; every other
    /// culture reads day first.
    pub fn from_culture(culture: Option<&str>) -> Self {
        match culture.map(|c| c.trim().to_ascii_lowercase()) {
            None => DateOrder::MonthFirst,
            Some(c) if c.is_empty() || c == "invariant" || c == "en-us" || c == "en_us" => {
                DateOrder::MonthFirst
            }
            Some(_) => DateOrder::DayFirst,
        }
    }
}

impl Default for DateOrder {
    fn default() -> Self {
        DateOrder::MonthFirst
    }
}

/// Parse a timestamp from free-form text
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    parse_free(text, DateOrder::MonthFirst)
}

/// Parse a timestamp, trying an explicit format before free parsing
pub fn parse_timestamp_with(
    text: &str,
    format: Option<&str>,
    order: DateOrder,
) -> Option<NaiveDateTime> {
    if let Some(format) = format.filter(|f| !f.is_empty()) {
        if is_valid_format(format) {
            let trimmed = text.trim();

            if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Some(ts);
            }
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return date.and_hms_opt(0, 0, 0);
            }
            if let Ok(ts) = DateTime::parse_from_str(trimmed, format) {
                return Some(ts.naive_utc());
            }
        } else {
            log::warn!("Ignoring invalid input format '{}'", format);
        }
    }

    parse_free(text, order)
}

/// Check that a strftime-style format string contains no invalid specifiers
pub fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

fn parse_free(text: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(text) {
        return Some(ts.naive_utc());
    }

    let (ordered_datetime, ordered_date) = match order {
        DateOrder::MonthFirst => (MONTH_FIRST_DATETIME_FORMATS, MONTH_FIRST_DATE_FORMATS),
        DateOrder::DayFirst => (DAY_FIRST_DATETIME_FORMATS, DAY_FIRST_DATE_FORMATS),
    };

    for format in DATETIME_FORMATS.iter().chain(ordered_datetime) {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }

    for format in DATE_FORMATS.iter().chain(ordered_date) {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
