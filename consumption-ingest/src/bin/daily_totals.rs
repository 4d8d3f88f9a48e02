use anyhow::{bail, Result};
use consumption_ingest::{
    config::AppConfig,
    observability,
    sinks::{PgReadingStore, ReadingStore},
    transform::parse_source_date,
};
use energy_client::db::reading_queries;
use std::env;
use time::Date;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: daily_totals <start_date> <end_date>");
    }
    let start = parse_source_date(&args[1])?;
    let end = parse_source_date(&args[2])?;
    if end < start {
        bail!("end date {end} is before start date {start}");
    }

    let cfg = AppConfig::load()?;
    let store = PgReadingStore::connect_lazy(&cfg.database.uri, cfg.database.max_connections)?;

    let result = print_report(&store, start, end).await;
    store.close().await;
    result
}

/// A single day is broken down per hour; a range prints one line per day.
async fn print_report(store: &PgReadingStore, start: Date, end: Date) -> Result<()> {
    if start == end {
        for r in reading_queries::readings_for_day(store.pool(), start).await? {
            println!("{}\t{:02}:00\t{:>10.3} kWh", r.timestamp, r.hour, r.kwh);
        }
        return Ok(());
    }

    for day in reading_queries::daily_totals(store.pool(), start, end).await? {
        let partial = if day.hours < 24 { " (partial)" } else { "" };
        println!("{}\t{:>10.3} kWh\t{:>2} h{partial}", day.timestamp, day.total_kwh, day.hours);
    }
    Ok(())
}
