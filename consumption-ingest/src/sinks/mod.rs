pub mod json_file;
pub mod memory;
pub mod postgres;

pub use json_file::JsonFileSink;
pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

use energy_client::domain::DailyBatch;
use time::Date;

use crate::transform::parse_source_date;

/// Minimum increase for a stored reading to be overwritten.
pub const OVERWRITE_EPSILON: f64 = 0.001;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store is closed")]
    Closed,
}

/// Row counts of one applied batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: u64,
    pub updated: u64,
    pub skipped_days: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Insert,
    Overwrite,
    Keep,
}

/// Monotonic overwrite: a stored reading only ever grows.
///
/// Repeated scrapes of a slot are expected to report equal or larger
/// consumption, so anything not exceeding the stored value by more than
/// [`OVERWRITE_EPSILON`] is stale.
pub fn resolve_conflict(existing: Option<f64>, incoming: f64) -> UpsertAction {
    match existing {
        None => UpsertAction::Insert,
        Some(current) if incoming - current > OVERWRITE_EPSILON => UpsertAction::Overwrite,
        Some(_) => UpsertAction::Keep,
    }
}

/// A single `(day, hour)` value ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRow {
    pub timestamp: Date,
    pub hour: i16,
    pub kwh: f64,
    pub month_name: Option<String>,
    pub source_date: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPlan {
    pub rows: Vec<PlannedRow>,
    pub skipped_days: u64,
}

/// Flattens a batch into rows, dropping empty slots and days whose date
/// cannot be read.
pub fn plan_rows(batch: &DailyBatch) -> RowPlan {
    let mut plan = RowPlan::default();

    for day in &batch.days {
        let timestamp = match parse_source_date(&day.date) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "skipping day with unparsable date");
                plan.skipped_days += 1;
                continue;
            }
        };

        for (hour, value) in day.slots() {
            let Some(kwh) = value else {
                continue;
            };
            plan.rows.push(PlannedRow {
                timestamp,
                hour: i16::from(hour),
                kwh,
                month_name: batch.month.clone(),
                source_date: day.date.clone(),
            });
        }
    }

    plan
}

/// Destination of scraped batches.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Creates the readings table and its supporting objects when absent.
    async fn initialize_schema(&self) -> Result<(), StoreError>;

    /// Applies a batch atomically under the monotonic-overwrite rule.
    async fn upsert_batch(&self, batch: DailyBatch) -> Result<UpsertSummary, StoreError>;

    /// Releases held connections. Safe to call more than once.
    async fn close(&self);
}

pub(crate) fn record_summary(summary: &UpsertSummary) {
    metrics::counter!("readings_inserted_total").increment(summary.inserted);
    metrics::counter!("readings_updated_total").increment(summary.updated);
    metrics::counter!("readings_skipped_days_total").increment(summary.skipped_days);
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::{DayReading, HOURS_PER_DAY};
    use time::macros::date;

    #[test]
    fn conflict_resolution_is_monotonic() {
        assert_eq!(resolve_conflict(None, 0.0), UpsertAction::Insert);
        assert_eq!(resolve_conflict(Some(5.0), 5.0005), UpsertAction::Keep);
        assert_eq!(resolve_conflict(Some(5.0), 5.0), UpsertAction::Keep);
        assert_eq!(resolve_conflict(Some(5.0), 6.0), UpsertAction::Overwrite);
        assert_eq!(resolve_conflict(Some(5.0), 4.0), UpsertAction::Keep);
    }

    #[test]
    fn plan_skips_null_slots_and_bad_dates() {
        let mut values = [None; HOURS_PER_DAY];
        values[0] = Some(1.0);
        values[13] = Some(0.0);

        let batch = DailyBatch {
            year: 2025,
            month: Some("Gennaio".to_string()),
            days: vec![
                DayReading::from_hourly("not-a-date", [Some(1.0); HOURS_PER_DAY]),
                DayReading::from_hourly("02/01/2025", values),
            ],
        };

        let plan = plan_rows(&batch);
        assert_eq!(plan.skipped_days, 1);
        assert_eq!(plan.rows.len(), 2);
        assert_eq!(
            plan.rows[1],
            PlannedRow {
                timestamp: date!(2025 - 01 - 02),
                hour: 13,
                kwh: 0.0,
                month_name: Some("Gennaio".to_string()),
                source_date: "02/01/2025".to_string(),
            }
        );
    }
}
