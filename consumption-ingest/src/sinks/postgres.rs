use energy_client::domain::DailyBatch;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{plan_rows, record_summary, ReadingStore, StoreError, UpsertSummary, OVERWRITE_EPSILON};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS energy_readings (
    "timestamp"  DATE             NOT NULL,
    hour         SMALLINT         NOT NULL CHECK (hour BETWEEN 0 AND 23),
    kwh          DOUBLE PRECISION NOT NULL,
    month_name   TEXT,
    source_date  TEXT             NOT NULL,
    created_at   TIMESTAMPTZ      NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ      NOT NULL DEFAULT now(),
    PRIMARY KEY ("timestamp", hour)
)
"#;

const CREATE_INDEX: &str =
    r#"CREATE INDEX IF NOT EXISTS energy_readings_timestamp_idx ON energy_readings ("timestamp" DESC)"#;

const CREATE_HYPERTABLE: &str =
    "SELECT create_hypertable('energy_readings', 'timestamp', if_not_exists => TRUE, migrate_data => TRUE)";

/// Monotonic overwrite as a single statement: insert when absent, otherwise
/// replace only when the incoming value exceeds the stored one by more than
/// the epsilon. Returns no row when the stored value is kept.
const UPSERT_READING: &str = r#"
INSERT INTO energy_readings ("timestamp", hour, kwh, month_name, source_date)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT ("timestamp", hour) DO UPDATE
SET kwh = EXCLUDED.kwh,
    month_name = EXCLUDED.month_name,
    source_date = EXCLUDED.source_date,
    updated_at = now()
WHERE EXCLUDED.kwh - energy_readings.kwh > $6
RETURNING (xmax = 0) AS inserted
"#;

/// PostgreSQL (optionally TimescaleDB) backed reading store.
///
/// The pool connects lazily, so constructing the store never touches the
/// network; the first query opens the first connection.
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn connect_lazy(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(uri)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;

        // Time partitioning only exists with the TimescaleDB extension.
        if let Err(e) = sqlx::query(CREATE_HYPERTABLE).execute(&self.pool).await {
            tracing::warn!(error = %e, "hypertable not created; continuing with a plain table");
        }

        tracing::info!("energy_readings schema ready");
        Ok(())
    }

    async fn upsert_batch(&self, batch: DailyBatch) -> Result<UpsertSummary, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }

        let plan = plan_rows(&batch);
        let mut summary = UpsertSummary {
            skipped_days: plan.skipped_days,
            ..UpsertSummary::default()
        };

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        for row in &plan.rows {
            // Insert-or-grow in one statement so concurrent batches serialize
            // on the row itself; `xmax = 0` only holds for a freshly inserted row.
            let applied: Option<bool> = sqlx::query_scalar(UPSERT_READING)
                .bind(row.timestamp)
                .bind(row.hour)
                .bind(row.kwh)
                .bind(&row.month_name)
                .bind(&row.source_date)
                .bind(OVERWRITE_EPSILON)
                .fetch_optional(&mut *tx)
                .await?;

            match applied {
                Some(true) => summary.inserted += 1,
                Some(false) => {
                    tracing::debug!(date = %row.timestamp, hour = row.hour, kwh = row.kwh, "reading overwritten");
                    summary.updated += 1;
                }
                None => {}
            }
        }

        tx.commit().await?;

        record_summary(&summary);
        tracing::info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped_days = summary.skipped_days,
            "batch committed"
        );
        Ok(summary)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
