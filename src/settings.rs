use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::extractor::ExtractOptions;
use crate::pipeline;

const DEFAULT_CONFIG_FILE: &str = "reviews";
const ENV_PREFIX: &str = "REVIEWS";

/// Run settings: defaults, then `reviews.toml` (or an explicit file), then `REVIEWS_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub domain: String,
    pub max_pages: u32,
    pub max_duration_secs: Option<u64>,
    pub page_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub user_agent: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://www.trustpilot.com/review".to_string(),
            domain: "finelo.com".to_string(),
            max_pages: 10,
            max_duration_secs: None,
            page_delay_ms: 2000,
            fetch_timeout_secs: 10,
            max_retries: 3,
            base_backoff_ms: 2000,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("data/reviews.db"),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    pub fn listing_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.domain)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            max_pages: self.max_pages,
            max_duration: self.max_duration_secs.map(Duration::from_secs),
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }

    pub fn raw_artifact_path(&self) -> PathBuf {
        self.data_dir.join(pipeline::RAW_ARTIFACT)
    }

    pub fn cleaned_artifact_path(&self) -> PathBuf {
        self.data_dir.join(pipeline::CLEANED_ARTIFACT)
    }
}
