use std::collections::BTreeMap;

use energy_client::domain::{DailyBatch, PersistedReading};
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;

use super::{plan_rows, record_summary, resolve_conflict, ReadingStore, StoreError, UpsertAction, UpsertSummary};

#[derive(Default)]
struct State {
    rows: BTreeMap<(Date, i16), PersistedReading>,
    closed: bool,
}

/// In-process store with the same conflict semantics as the database.
///
/// Batches are staged on a copy and swapped in at the end, which gives the
/// same all-or-nothing behaviour as a transaction.
#[derive(Default)]
pub struct MemoryReadingStore {
    state: Mutex<State>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<PersistedReading> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    pub async fn get(&self, day: Date, hour: i16) -> Option<PersistedReading> {
        self.state.lock().await.rows.get(&(day, hour)).cloned()
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        if self.state.lock().await.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn upsert_batch(&self, batch: DailyBatch) -> Result<UpsertSummary, StoreError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }

        let plan = plan_rows(&batch);
        let mut staged = state.rows.clone();
        let mut summary = UpsertSummary {
            skipped_days: plan.skipped_days,
            ..UpsertSummary::default()
        };
        let now = OffsetDateTime::now_utc();

        for row in plan.rows {
            let key = (row.timestamp, row.hour);
            match resolve_conflict(staged.get(&key).map(|r| r.kwh), row.kwh) {
                UpsertAction::Insert => {
                    staged.insert(
                        key,
                        PersistedReading {
                            timestamp: row.timestamp,
                            hour: row.hour,
                            kwh: row.kwh,
                            month_name: row.month_name,
                            source_date: row.source_date,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    summary.inserted += 1;
                }
                UpsertAction::Overwrite => {
                    if let Some(existing) = staged.get_mut(&key) {
                        existing.kwh = row.kwh;
                        existing.month_name = row.month_name;
                        existing.source_date = row.source_date;
                        existing.updated_at = now;
                        summary.updated += 1;
                    }
                }
                UpsertAction::Keep => {}
            }
        }

        state.rows = staged;
        record_summary(&summary);
        Ok(summary)
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
    }
}
