use anyhow::Result;
use sqlx::PgPool;
use time::Date;

use crate::domain::PersistedReading;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyTotal {
    pub timestamp: Date,
    pub total_kwh: f64,
    pub hours: i64,
}

/// Fetch the stored hourly readings of a single day, ordered by hour.
pub async fn readings_for_day(pool: &PgPool, day: Date) -> Result<Vec<PersistedReading>> {
    let rows = sqlx::query_as::<_, PersistedReading>(
        r#"
        SELECT
            "timestamp",
            hour,
            kwh,
            month_name,
            source_date,
            created_at,
            updated_at
        FROM energy_readings
        WHERE "timestamp" = $1
        ORDER BY hour
        "#,
    )
    .bind(day)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sum kWh per day over `[start, end]`, both inclusive.
pub async fn daily_totals(pool: &PgPool, start: Date, end: Date) -> Result<Vec<DailyTotal>> {
    let rows = sqlx::query_as::<_, DailyTotal>(
        r#"
        SELECT
            "timestamp",
            SUM(kwh)  AS total_kwh,
            COUNT(*)  AS hours
        FROM energy_readings
        WHERE "timestamp" >= $1
          AND "timestamp" <= $2
        GROUP BY "timestamp"
        ORDER BY "timestamp"
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
