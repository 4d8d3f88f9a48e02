use time::{Date, OffsetDateTime};

/// One stored hourly reading, keyed by `(timestamp, hour)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PersistedReading {
    pub timestamp: Date,
    pub hour: i16,
    pub kwh: f64,
    pub month_name: Option<String>,
    pub source_date: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
