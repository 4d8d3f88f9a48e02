//! Navigation state machine for the utility portal.
//!
//! Phases run strictly in order and never go back. Hard steps (login page,
//! credentials, navigation entry, monthly grid) abort the run; soft steps
//! (page readiness, curve view, daily table) degrade the outcome instead.

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use energy_client::domain::{DailyBatch, DayReading, MonthlySeries};
use reqwest::Url;
use scraper::Selector;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::time::Instant;

use super::{
    browser::{Browser, BrowserError},
    markup::{self, MonthlyGrid, TableMatcher},
};
use crate::transform::{parse_source_date, select_latest, DrillDownMonth};

#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticate,
    ReachListing,
    ReachCurveView,
    ExtractMonthly,
    SelectDrillDownMonth,
    ExtractDaily,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authenticate => "authenticate",
            Self::ReachListing => "reach-listing",
            Self::ReachCurveView => "reach-curve-view",
            Self::ExtractMonthly => "extract-monthly",
            Self::SelectDrillDownMonth => "select-drill-down-month",
            Self::ExtractDaily => "extract-daily",
        };
        f.write_str(s)
    }
}

/// A soft failure absorbed during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    ListingNotReady,
    CurveViewMissing,
    NoMonthWithData,
    NoDailyData,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListingNotReady => "listing_not_ready",
            Self::CurveViewMissing => "curve_view_missing",
            Self::NoMonthWithData => "no_month_with_data",
            Self::NoDailyData => "no_daily_data",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeOutcome {
    pub monthly: MonthlySeries,
    pub drill_down: Option<DrillDownMonth>,
    pub daily: Option<DailyBatch>,
    pub degradations: Vec<Degradation>,
}

impl ScrapeOutcome {
    fn degrade(&mut self, d: Degradation) {
        metrics::counter!("scrape_degradations_total", "kind" => d.as_str()).increment(1);
        self.degradations.push(d);
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub login_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    pub login_form: String,
    pub username: String,
    pub password: String,
    pub submit: String,
    pub listing_nav: String,
    pub listing_landmarks: Vec<String>,
    pub curve_control: String,
    pub monthly_grid: String,
    pub hourly_table_id: Option<String>,
    pub page_root: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            login_form: "form#loginForm".to_string(),
            username: "input[name='username']".to_string(),
            password: "input[name='password']".to_string(),
            submit: "form#loginForm button[type='submit']".to_string(),
            listing_nav: "a#menu-consumi".to_string(),
            listing_landmarks: vec!["#elencoForniture".to_string(), "#dettaglioFornitura".to_string()],
            curve_control: "#btnCurvaCarico".to_string(),
            monthly_grid: "#tabellaConsumiMensili".to_string(),
            hourly_table_id: Some("tabellaConsumiOrari".to_string()),
            page_root: "body".to_string(),
        }
    }
}

impl PortalSelectors {
    /// Parses the selector that is evaluated locally against page snapshots.
    pub fn login_form_selector(&self) -> Result<Selector, ScrapeError> {
        Selector::parse(&self.login_form).map_err(|_| ScrapeError::InvalidSelector(self.login_form.clone()))
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        self.login_form_selector().map(|_| ())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalTimeouts {
    pub login_field_secs: u64,
    pub navigation_secs: u64,
    pub listing_idle_secs: u64,
    pub landmarks_secs: u64,
    pub curve_control_secs: u64,
    pub monthly_grid_secs: u64,
    pub daily_idle_secs: u64,
}

impl Default for PortalTimeouts {
    fn default() -> Self {
        Self {
            login_field_secs: 30,
            navigation_secs: 30,
            listing_idle_secs: 15,
            landmarks_secs: 20,
            curve_control_secs: 90,
            monthly_grid_secs: 60,
            daily_idle_secs: 30,
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Origin and path without query, fragment or trailing slash.
fn endpoint(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => format!("{}{}", u.origin().ascii_serialization(), u.path().trim_end_matches('/')),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string(),
    }
}

/// Login succeeded when the page navigated, the form is gone and the
/// browser is no longer on the login endpoint.
pub fn login_confirmed(
    before_url: &str,
    after_url: &str,
    dom_snapshot: &str,
    login_url: &str,
    login_form: &Selector,
) -> bool {
    let navigated = before_url != after_url;
    let form_gone = !markup::login_form_present(dom_snapshot, login_form);
    let left_login = endpoint(after_url) != endpoint(login_url);
    navigated && form_gone && left_login
}

pub struct PortalScraper<B: ?Sized> {
    browser: Arc<B>,
    credentials: Credentials,
    selectors: PortalSelectors,
    timeouts: PortalTimeouts,
    login_form: Selector,
    matchers: Vec<Box<dyn TableMatcher>>,
    screenshot_dir: Option<PathBuf>,
}

impl<B> PortalScraper<B>
where
    B: Browser + ?Sized,
{
    pub fn new(
        browser: Arc<B>,
        credentials: Credentials,
        selectors: PortalSelectors,
        timeouts: PortalTimeouts,
        screenshot_dir: Option<PathBuf>,
    ) -> Result<Self, ScrapeError> {
        let login_form = selectors.login_form_selector()?;
        let matchers = markup::hourly_matchers(selectors.hourly_table_id.as_deref());

        Ok(Self {
            browser,
            credentials,
            selectors,
            timeouts,
            login_form,
            matchers,
            screenshot_dir,
        })
    }

    /// Drives one full pass over the portal.
    pub async fn run(&self) -> Result<ScrapeOutcome, ScrapeError> {
        let mut outcome = ScrapeOutcome::default();
        let mut phase = Phase::Authenticate;

        match self.drive(&mut phase, &mut outcome).await {
            Ok(()) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, %phase, "scrape aborted");
                self.capture(&format!("failed-{phase}")).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, phase: &mut Phase, outcome: &mut ScrapeOutcome) -> Result<(), ScrapeError> {
        *phase = Phase::Authenticate;
        self.authenticate().await?;
        self.checkpoint(*phase).await;

        *phase = Phase::ReachListing;
        if !self.reach_listing().await? {
            outcome.degrade(Degradation::ListingNotReady);
        }
        self.checkpoint(*phase).await;

        *phase = Phase::ReachCurveView;
        let grid = if self.reach_curve_view().await? {
            self.checkpoint(*phase).await;
            *phase = Phase::ExtractMonthly;
            let grid = self.extract_monthly().await?;
            self.checkpoint(*phase).await;
            grid
        } else {
            outcome.degrade(Degradation::CurveViewMissing);
            MonthlyGrid::default()
        };
        outcome.monthly = grid.series.clone();

        *phase = Phase::SelectDrillDownMonth;
        let Some(month) = select_latest(&grid.series) else {
            tracing::info!("no month carries data; skipping daily extraction");
            outcome.degrade(Degradation::NoMonthWithData);
            return Ok(());
        };
        tracing::info!(month = %month.label, index = month.index, "drill-down month selected");
        outcome.drill_down = Some(month.clone());

        *phase = Phase::ExtractDaily;
        match self.extract_daily(&grid, &month).await {
            Some(days) if !days.is_empty() => {
                outcome.daily = Some(build_batch(days, &month));
                self.checkpoint(*phase).await;
            }
            _ => outcome.degrade(Degradation::NoDailyData),
        }

        Ok(())
    }

    async fn authenticate(&self) -> Result<(), ScrapeError> {
        let s = &self.selectors;
        self.browser.navigate(&self.credentials.login_url).await?;

        if !self
            .browser
            .wait_for_element(&s.username, secs(self.timeouts.login_field_secs))
            .await?
        {
            return Err(ScrapeError::AuthenticationFailed("login form did not appear".to_string()));
        }

        self.browser.fill(&s.username, &self.credentials.username).await?;
        self.browser.fill(&s.password, &self.credentials.password).await?;

        let before = self.browser.current_url().await?;
        self.browser.click(&s.submit).await?;
        if !self.browser.wait_for_idle(secs(self.timeouts.navigation_secs)).await? {
            tracing::warn!("page did not settle after submitting credentials");
        }

        let after = self.browser.current_url().await?;
        let dom = self.browser.read_subtree(&s.page_root).await?.unwrap_or_default();

        if login_confirmed(&before, &after, &dom, &self.credentials.login_url, &self.login_form) {
            tracing::info!(url = %after, "login confirmed");
            Ok(())
        } else {
            Err(ScrapeError::AuthenticationFailed(format!("still on login page ({after})")))
        }
    }

    /// `Ok(false)` when readiness could not be confirmed within the budget.
    async fn reach_listing(&self) -> Result<bool, ScrapeError> {
        let nav = &self.selectors.listing_nav;
        let wait = secs(self.timeouts.navigation_secs);
        if !self.browser.wait_for_element(nav, wait).await? {
            return Err(ScrapeError::ExtractionFailed(format!(
                "navigation entry '{nav}' absent after {}s",
                wait.as_secs()
            )));
        }
        self.browser.click(nav).await?;

        let idle = self
            .browser
            .wait_for_idle(secs(self.timeouts.listing_idle_secs))
            .await?;

        let budget = secs(self.timeouts.landmarks_secs);
        let started = Instant::now();
        let mut landmarks = true;
        for landmark in &self.selectors.listing_landmarks {
            let remaining = budget.saturating_sub(started.elapsed());
            if !self.browser.wait_for_element(landmark, remaining).await? {
                landmarks = false;
                break;
            }
        }

        if idle && landmarks {
            Ok(true)
        } else {
            tracing::warn!(idle, landmarks, "listing readiness not confirmed; proceeding with degraded confidence");
            Ok(false)
        }
    }

    async fn reach_curve_view(&self) -> Result<bool, ScrapeError> {
        let control = &self.selectors.curve_control;
        if !self
            .browser
            .wait_for_element(control, secs(self.timeouts.curve_control_secs))
            .await?
        {
            tracing::warn!(selector = %control, "curve view control never appeared; skipping monthly detail");
            return Ok(false);
        }

        self.browser.click(control).await?;
        if !self.browser.wait_for_idle(secs(self.timeouts.listing_idle_secs)).await? {
            tracing::warn!("curve view still loading after idle budget");
        }
        Ok(true)
    }

    async fn extract_monthly(&self) -> Result<MonthlyGrid, ScrapeError> {
        let grid_sel = &self.selectors.monthly_grid;
        let wait = secs(self.timeouts.monthly_grid_secs);
        if !self.browser.wait_for_element(grid_sel, wait).await? {
            return Err(ScrapeError::ExtractionFailed(format!(
                "monthly grid '{grid_sel}' absent after {}s",
                wait.as_secs()
            )));
        }

        let html = self
            .browser
            .read_subtree(grid_sel)
            .await?
            .ok_or_else(|| ScrapeError::ExtractionFailed(format!("monthly grid '{grid_sel}' vanished")))?;

        let grid = markup::parse_monthly_grid(&html);
        for e in grid.series.entries() {
            tracing::debug!(month = %e.month_label, raw = %e.raw_value, parsed = ?e.parsed_value, "monthly cell");
        }
        tracing::info!(
            months = grid.series.len(),
            populated = grid.series.populated(),
            "monthly series extracted"
        );
        Ok(grid)
    }

    /// Every failure here is soft and reported as `None`.
    async fn extract_daily(&self, grid: &MonthlyGrid, month: &DrillDownMonth) -> Option<Vec<DayReading>> {
        let Some(position) = grid.link_position(month.index) else {
            tracing::warn!(month = %month.label, "selected month has no link");
            return None;
        };

        let links = format!("{} td a", self.selectors.monthly_grid);
        match self
            .browser
            .wait_for_element(&links, secs(self.timeouts.navigation_secs))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(selector = %links, month = %month.label, "month links never became clickable");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, month = %month.label, "could not wait for month links");
                return None;
            }
        }
        if let Err(e) = self.browser.click_nth(&links, position).await {
            tracing::warn!(error = %e, month = %month.label, "could not open month detail");
            return None;
        }

        match self.browser.wait_for_idle(secs(self.timeouts.daily_idle_secs)).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("daily view still loading after idle budget"),
            Err(e) => tracing::warn!(error = %e, "idle wait failed on daily view"),
        }

        let html = match self.browser.read_subtree(&self.selectors.page_root).await {
            Ok(Some(html)) => html,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read daily view");
                return None;
            }
        };

        match markup::extract_hourly_days(&html, &self.matchers) {
            Some(days) => {
                tracing::info!(days = days.len(), month = %month.label, "hourly table extracted");
                Some(days)
            }
            None => {
                tracing::warn!(month = %month.label, "no hourly table found; no daily data");
                None
            }
        }
    }

    async fn checkpoint(&self, phase: Phase) {
        tracing::debug!(%phase, "phase complete");
        self.capture(&phase.to_string()).await;
    }

    async fn capture(&self, label: &str) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let path = dir.join(format!("{label}.png"));
        if let Err(e) = self.browser.screenshot(&path).await {
            tracing::warn!(error = %e, path = %path.display(), "debug screenshot failed");
        }
    }
}

/// Year comes from the first parsable day, falling back to the current year.
fn build_batch(days: Vec<DayReading>, month: &DrillDownMonth) -> DailyBatch {
    let year = days
        .iter()
        .find_map(|d| parse_source_date(&d.date).ok())
        .map(|d| d.year())
        .unwrap_or_else(|| OffsetDateTime::now_utc().year());

    DailyBatch {
        year,
        month: Some(month.label.clone()),
        days,
    }
}
