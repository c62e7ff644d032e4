//! Expense list owned by the dashboard.
//!
//! DESIGN
//! ======
//! `ExpenseBook` holds the ordered expense list and writes it back through an
//! `ExpenseStore` after every mutation. Each mutation builds the next list
//! and swaps it in whole, so a reader never sees a half-applied edit.
//! Order is user-controlled (drag-and-drop) and persisted as-is.

#[cfg(test)]
#[path = "expenses_test.rs"]
mod expenses_test;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, UtcOffset};

use crate::aggregate::{self, CategorySummaryEntry, FALLBACK_CATEGORY, WeeklyTrendEntry};

/// Local storage key the expense list is kept under.
pub const EXPENSES_KEY: &str = "expenses";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// MODEL
// =============================================================================

/// A single expense record.
///
/// Fields the dashboard does not interpret (title, payer, notes, ...) are
/// carried in `extra` so they survive a load/save cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Expense {
    /// Category used for grouping; absent or empty falls back to `Other`.
    #[must_use]
    pub fn category_name(&self) -> &str {
        match self.category.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => FALLBACK_CATEGORY,
        }
    }
}

/// An expense as entered in the add/split forms, before it has an id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Coerce an amount the way the form data arrives: numbers pass through,
/// numeric strings are parsed, everything else counts as zero.
fn lenient_amount<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(coerce_amount(&Value::deserialize(de)?))
}

fn coerce_amount(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if parsed.is_finite() { parsed } else { 0.0 }
}

/// Ids are timestamps; older entries may have stored them as strings.
fn lenient_id<'de, D>(de: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    let id = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => None,
        },
        _ => None,
    };
    id.ok_or_else(|| serde::de::Error::custom(format!("invalid expense id {value}")))
}

/// Free-text fields: strings pass through, other scalars are stringified,
/// anything else is treated as absent.
fn lenient_text<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

// =============================================================================
// STORE
// =============================================================================

/// Persistence seam for the expense list.
pub trait ExpenseStore {
    /// Read the stored list. `None` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing storage is unreadable or corrupt.
    fn load(&self) -> Result<Option<Vec<Expense>>, StoreError>;

    /// Replace the stored list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the list cannot be written.
    fn save(&self, expenses: &[Expense]) -> Result<(), StoreError>;
}

/// File-backed key/value store, the desktop stand-in for browser local storage.
///
/// The file holds one JSON object; the expense list lives under
/// [`EXPENSES_KEY`] and other keys are preserved on write.
#[derive(Clone, Debug)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Option<Map<String, Value>>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path: self.path.clone(), source }),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io { path: self.path.clone(), source }
    }
}

impl ExpenseStore for LocalStore {
    fn load(&self) -> Result<Option<Vec<Expense>>, StoreError> {
        let Some(mut entries) = self.read_entries()? else {
            return Ok(None);
        };
        match entries.remove(EXPENSES_KEY) {
            Some(Value::Array(records)) => Ok(Some(decode_records(records))),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, expenses: &[Expense]) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?.unwrap_or_default();
        entries.insert(EXPENSES_KEY.to_owned(), serde_json::to_value(expenses)?);
        let text = serde_json::to_string_pretty(&entries)?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

/// Decode stored records one by one; a record that cannot be read is
/// skipped rather than failing the whole list.
fn decode_records(records: Vec<Value>) -> Vec<Expense> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(expense) => Some(expense),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping unreadable stored expense");
                None
            }
        })
        .collect()
}

// =============================================================================
// EXPENSE BOOK
// =============================================================================

pub struct ExpenseBook<S> {
    expenses: Vec<Expense>,
    store: S,
}

impl<S: ExpenseStore> ExpenseBook<S> {
    /// Read the persisted list once. A store with nothing in it yields an empty book.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the store.
    pub fn load(store: S) -> Result<Self, StoreError> {
        let expenses = store.load()?.unwrap_or_default();
        tracing::debug!(count = expenses.len(), "expenses loaded");
        Ok(Self { expenses, store })
    }

    #[must_use]
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    /// Add one expense at the top of the list and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the updated list cannot be persisted.
    pub fn add(&mut self, expense: NewExpense, now: OffsetDateTime) -> Result<i64, StoreError> {
        let mut ids = self.add_batch(vec![expense], now)?;
        Ok(ids.pop().unwrap_or_default())
    }

    /// Add several expenses at once (split bill), keeping their given order
    /// ahead of the existing entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the updated list cannot be persisted.
    pub fn add_batch(&mut self, batch: Vec<NewExpense>, now: OffsetDateTime) -> Result<Vec<i64>, StoreError> {
        let today = iso_date(now);
        let mut next_id = unix_millis(now);
        let mut ids = Vec::with_capacity(batch.len());
        let mut added = Vec::with_capacity(batch.len());

        for new in batch {
            while self.expenses.iter().chain(&added).any(|e: &Expense| e.id == next_id) {
                next_id += 1;
            }
            ids.push(next_id);
            added.push(Expense {
                id: next_id,
                amount: new.amount,
                category: new.category,
                date: Some(new.date.filter(|d| !d.is_empty()).unwrap_or_else(|| today.clone())),
                extra: new.extra,
            });
        }

        added.extend(self.expenses.iter().cloned());
        self.commit(added)?;
        Ok(ids)
    }

    /// Replace the expense with the same id. Returns `false` for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the updated list cannot be persisted.
    pub fn edit(&mut self, updated: Expense) -> Result<bool, StoreError> {
        if self.get(updated.id).is_none() {
            return Ok(false);
        }
        let next = self
            .expenses
            .iter()
            .map(|e| if e.id == updated.id { updated.clone() } else { e.clone() })
            .collect();
        self.commit(next)?;
        Ok(true)
    }

    /// Remove the expense with the given id. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the updated list cannot be persisted.
    pub fn delete(&mut self, id: i64) -> Result<bool, StoreError> {
        let next: Vec<Expense> = self.expenses.iter().filter(|e| e.id != id).cloned().collect();
        if next.len() == self.expenses.len() {
            return Ok(false);
        }
        self.commit(next)?;
        Ok(true)
    }

    /// Move the entry at `from` so it ends up at index `to`.
    /// Out-of-range indices leave the list untouched and return `false`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the updated list cannot be persisted.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<bool, StoreError> {
        let len = self.expenses.len();
        if from >= len || to >= len {
            return Ok(false);
        }
        let mut next = self.expenses.clone();
        let moved = next.remove(from);
        next.insert(to, moved);
        self.commit(next)?;
        Ok(true)
    }

    #[must_use]
    pub fn summary(&self) -> Vec<CategorySummaryEntry> {
        aggregate::summarize(&self.expenses)
    }

    #[must_use]
    pub fn weekly_trend(&self, now: OffsetDateTime) -> [WeeklyTrendEntry; 7] {
        aggregate::weekly_trend(&self.expenses, now)
    }

    fn commit(&mut self, next: Vec<Expense>) -> Result<(), StoreError> {
        self.expenses = next;
        self.store.save(&self.expenses).inspect_err(|e| {
            tracing::warn!(error = %e, "failed to persist expenses");
        })
    }
}

fn unix_millis(now: OffsetDateTime) -> i64 {
    i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// `YYYY-MM-DD` of `now` in UTC.
fn iso_date(now: OffsetDateTime) -> String {
    let date = now.to_offset(UtcOffset::UTC).date();
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}
