use anyhow::{bail, Result};
use consumption_ingest::{
    config::AppConfig,
    observability,
    sinks::{PgReadingStore, ReadingStore, UpsertSummary},
    sources::BatchFileSource,
};
use futures::StreamExt;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings <batch_json_file>");
    }
    let file_path = &args[1];

    // Point SCRAPER_CONFIG at a backfill-specific file if needed; only the
    // database section is used here.
    let cfg = AppConfig::load()?;

    let store = PgReadingStore::connect_lazy(&cfg.database.uri, cfg.database.max_connections)?;
    store.initialize_schema().await?;

    let mut batches = BatchFileSource::new(file_path).stream();
    let mut totals = UpsertSummary::default();
    let mut applied = 0usize;

    let result: Result<()> = async {
        while let Some(envelope) = batches.next().await {
            let envelope = envelope?;
            if envelope.payload.is_empty() {
                tracing::warn!(year = envelope.payload.year, "skipping batch without days");
                continue;
            }
            tracing::debug!(
                received_at = ?envelope.received_at,
                days = envelope.payload.days.len(),
                "applying batch"
            );
            let summary = store.upsert_batch(envelope.payload).await?;
            totals.inserted += summary.inserted;
            totals.updated += summary.updated;
            totals.skipped_days += summary.skipped_days;
            applied += 1;
        }
        Ok(())
    }
    .await;

    store.close().await;

    tracing::info!(
        batches = applied,
        inserted = totals.inserted,
        updated = totals.updated,
        skipped_days = totals.skipped_days,
        "backfill finished"
    );
    result
}
