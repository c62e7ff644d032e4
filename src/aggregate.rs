//! Dashboard aggregates derived from the expense list.
//!
//! Pure functions: same input and reference time, same output. Nothing here
//! is stored; callers recompute after every change to the list.
//!
//! Percentages are rounded per entry, so a summary's `value`s can add up to
//! 99 or 101. That drift is accepted and left visible.

#[cfg(test)]
#[path = "aggregate_test.rs"]
mod aggregate_test;

use std::collections::HashMap;
use std::num::FpCategory;

use serde::Serialize;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::state::expenses::Expense;

/// Category name used when an expense has none.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Trend buckets, in output order.
pub const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const DAY_MS: i128 = 86_400_000;
const TREND_DAYS: i128 = 7;

/// Share of spending for one category.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategorySummaryEntry {
    pub name: String,
    /// Summed amount.
    pub raw: f64,
    /// `raw` as a whole-number percentage of the total.
    pub value: i64,
}

/// Spending on one weekday within the trailing week.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeeklyTrendEntry {
    pub day: &'static str,
    pub spend: f64,
}

/// Group by category (first-encounter order) and compute percentage shares.
#[must_use]
pub fn summarize(expenses: &[Expense]) -> Vec<CategorySummaryEntry> {
    let mut groups: Vec<(&str, f64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for expense in expenses {
        let name = expense.category_name();
        if let Some(&slot) = index.get(name) {
            groups[slot].1 += expense.amount;
        } else {
            index.insert(name, groups.len());
            groups.push((name, expense.amount));
        }
    }

    let total: f64 = groups.iter().map(|(_, raw)| raw).sum();
    let total = if total.classify() == FpCategory::Zero { 1.0 } else { total };

    groups
        .into_iter()
        .map(|(name, raw)| CategorySummaryEntry {
            name: name.to_owned(),
            raw,
            value: round_half_up(raw / total * 100.0),
        })
        .collect()
}

/// Per-weekday spending for expenses dated within the seven days ending at `now`.
///
/// An expense counts when `floor((now - date) / 1 day)` is in `0..7`; future
/// dates and undated or unparseable entries are skipped.
#[must_use]
pub fn weekly_trend(expenses: &[Expense], now: OffsetDateTime) -> [WeeklyTrendEntry; 7] {
    let mut weekly = WEEKDAYS.map(|day| WeeklyTrendEntry { day, spend: 0.0 });

    for expense in expenses {
        let Some(date) = expense.date.as_deref().and_then(parse_expense_date) else {
            continue;
        };
        let diff_days = (now - date).whole_milliseconds().div_euclid(DAY_MS);
        if (0..TREND_DAYS).contains(&diff_days) {
            let slot = usize::from(date.weekday().number_days_from_sunday());
            weekly[slot].spend += expense.amount;
        }
    }

    weekly
}

/// Parse an expense date.
///
/// Accepts `YYYY-MM-DD` (midnight UTC), RFC 3339 timestamps, and
/// `YYYY-MM-DDTHH:MM[:SS]` without offset.
///
/// Offset-less date-times are read as UTC, not the host's local time. This
/// keeps bucketing independent of the machine's zone; browsers would read
/// that form as local time, so such entries can land one weekday apart.
#[must_use]
pub fn parse_expense_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339) {
        return Some(dt);
    }
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight().assume_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")) {
        return Some(dt.assume_utc());
    }
    match PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]")) {
        Ok(dt) => Some(dt.assume_utc()),
        Err(_) => None,
    }
}

/// Round halves toward positive infinity.
#[allow(clippy::cast_possible_truncation)]
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}
