pub mod reading_queries;

pub use reading_queries::{daily_totals, readings_for_day, DailyTotal};
