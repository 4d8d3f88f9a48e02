pub mod daily_batch;
pub mod monthly_series;
pub mod persisted_reading;

pub use daily_batch::{hour_label, DailyBatch, DayReading, HOURS_PER_DAY};
pub use monthly_series::{DuplicateMonth, MonthlyEntry, MonthlySeries};
pub use persisted_reading::PersistedReading;
