use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use energy_client::domain::MonthlySeries;
use futures::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;

use crate::{
    sinks::{JsonFileSink, ReadingStore, StoreError, UpsertSummary},
    sources::{
        browser::Browser,
        portal::{Degradation, PortalScraper, ScrapeError},
    },
    transform::DrillDownMonth,
};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a successful run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub monthly: MonthlySeries,
    pub drill_down: Option<DrillDownMonth>,
    pub daily_days: usize,
    pub summary: Option<UpsertSummary>,
    pub degradations: Vec<Degradation>,
}

impl RunReport {
    /// True when the run finished with less than the full set of data.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty() || self.summary.is_some_and(|s| s.skipped_days > 0)
    }

    /// Monthly value of the month that was drilled into.
    pub fn drill_down_kwh(&self) -> Option<f64> {
        let month = self.drill_down.as_ref()?;
        self.monthly.get(month.index)?.parsed_value
    }

    fn log(&self) {
        let degradations: Vec<_> = self.degradations.iter().map(Degradation::as_str).collect();
        tracing::info!(
            months = self.monthly.len(),
            drill_down = self.drill_down.as_ref().map(|m| m.label.as_str()),
            drill_down_kwh = self.drill_down_kwh(),
            days = self.daily_days,
            inserted = self.summary.map(|s| s.inserted),
            updated = self.summary.map(|s| s.updated),
            degraded = self.is_degraded(),
            ?degradations,
            "run complete"
        );
    }
}

/// Scrape -> optional JSON file -> reading store.
pub struct Pipeline<B: ?Sized> {
    pub scraper: PortalScraper<B>,
    pub store: Arc<dyn ReadingStore>,
    pub output: Option<JsonFileSink>,
}

impl<B> Pipeline<B>
where
    B: Browser + ?Sized,
{
    /// Performs one run. Fatal errors are returned for the caller to act
    /// on; nothing is retried here.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        metrics::counter!("scrape_runs_total").increment(1);
        let started = Instant::now();

        let result = self.run_inner().await;
        metrics::histogram!("scrape_run_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(report) => report.log(),
            Err(e) => {
                metrics::counter!("scrape_run_failures_total").increment(1);
                tracing::error!(error = %e, "run failed");
            }
        }
        result
    }

    async fn run_inner(&self) -> Result<RunReport, PipelineError> {
        let outcome = self.scraper.run().await?;

        let mut report = RunReport {
            monthly: outcome.monthly,
            drill_down: outcome.drill_down,
            degradations: outcome.degradations,
            ..RunReport::default()
        };

        let Some(batch) = outcome.daily else {
            return Ok(report);
        };
        report.daily_days = batch.days.len();

        if let Some(output) = &self.output {
            if let Err(e) = output.write(&batch).await {
                tracing::warn!(error = %e, path = %output.path().display(), "could not write output file");
            }
        }

        report.summary = Some(self.store.upsert_batch(batch).await?);
        Ok(report)
    }

    /// Runs on a fixed interval until `shutdown` fires.
    ///
    /// A run is never interrupted; ticks that elapse while one is in
    /// progress are skipped so runs cannot overlap.
    pub async fn run_scheduled(&self, every: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                    // Failures are already logged; the next tick is the retry.
                    let _ = self.run().await;
                }
            }
        }

        tracing::info!("scheduler stopped");
    }
}
