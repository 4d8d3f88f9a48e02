use anyhow::{Context, Result};
use consumption_ingest::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    sinks::{JsonFileSink, PgReadingStore, ReadingStore},
    sources::{PortalScraper, WebDriverBrowser},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // Reject bad selectors before any session or connection exists.
    cfg.portal.selectors.validate()?;

    // Lazy pool: no connection is opened until the schema is initialized.
    let store = Arc::new(PgReadingStore::connect_lazy(&cfg.database.uri, cfg.database.max_connections)?);
    store.initialize_schema().await.context("failed to initialize schema")?;

    let browser = Arc::new(
        WebDriverBrowser::start(&cfg.webdriver.url, cfg.portal.headless)
            .await
            .context("failed to start browser session")?,
    );

    let scraper = match PortalScraper::new(
        browser.clone(),
        cfg.portal.credentials(),
        cfg.portal.selectors.clone(),
        cfg.portal.timeouts.clone(),
        cfg.portal.screenshots(),
    ) {
        Ok(scraper) => scraper,
        Err(e) => {
            shutdown(&browser, &store).await;
            return Err(e.into());
        }
    };
    let pipeline = Pipeline {
        scraper,
        store: store.clone(),
        output: cfg.output.as_ref().map(|o| JsonFileSink::new(&o.path)),
    };

    let result = match &cfg.schedule {
        None => pipeline.run().await.map(|_| ()).map_err(anyhow::Error::from),
        Some(schedule) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested; stopping after the current run");
                    on_signal.cancel();
                }
            });

            tracing::info!(interval_secs = schedule.interval_secs, "scheduler started");
            pipeline.run_scheduled(schedule.every(), cancel).await;
            Ok(())
        }
    };

    shutdown(&browser, &store).await;
    result
}

/// Ends the browser session and releases pooled connections.
async fn shutdown(browser: &WebDriverBrowser, store: &PgReadingStore) {
    if let Err(e) = browser.quit().await {
        tracing::warn!(error = %e, "failed to end browser session");
    }
    store.close().await;
}
