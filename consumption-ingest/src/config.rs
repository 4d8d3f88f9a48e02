use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

use crate::sources::{Credentials, PortalSelectors, PortalTimeouts};

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub login_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub debug_screenshots: bool,
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default)]
    pub selectors: PortalSelectors,
    #[serde(default)]
    pub timeouts: PortalTimeouts,
}

impl PortalConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            login_url: self.login_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Where phase screenshots go, when enabled.
    pub fn screenshots(&self) -> Option<PathBuf> {
        self.debug_screenshots.then(|| self.screenshot_dir.clone())
    }
}

fn default_headless() -> bool {
    true
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebDriverConfig {
    #[serde(default = "default_webdriver_url")]
    pub url: String,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:9515".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

impl ScheduleConfig {
    pub fn every(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub portal: PortalConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
    pub database: DatabaseConfig,
    pub output: Option<OutputConfig>,
    pub schedule: Option<ScheduleConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("SCRAPER_CONFIG").unwrap_or_else(|_| "scraper-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;

        let mut cfg = Self::parse(&contents)?;
        cfg.apply_env_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Credentials from the environment win over the file.
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("PORTAL_USERNAME").filter(|v| !v.is_empty()) {
            self.portal.username = user;
        }
        if let Some(pass) = lookup("PORTAL_PASSWORD").filter(|v| !v.is_empty()) {
            self.portal.password = pass;
        }
    }
}
