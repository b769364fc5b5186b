use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::FetchError;

/// Supplies the HTML of one listing page at a time.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// HTML of listing page `page` (1-based), or `None` when the page does not exist.
    async fn fetch_page(&self, page: u32) -> Result<Option<String>, FetchError>;
}

/// Fetches server-rendered listing pages over HTTP.
pub struct HttpPageSource {
    client: reqwest::Client,
    listing_url: String,
}

impl HttpPageSource {
    pub fn new(listing_url: &str, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(HttpPageSource {
            client,
            listing_url: listing_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        page_url(&self.listing_url, page)
    }
}

pub fn page_url(listing_url: &str, page: u32) -> String {
    if page <= 1 {
        listing_url.to_string()
    } else {
        format!("{}?page={}", listing_url, page)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, page: u32) -> Result<Option<String>, FetchError> {
        let url = self.page_url(page);
        debug!(page, %url, "fetching listing page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|e| FetchError::Body {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(html))
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
