use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{FetchError, PartialExtractionError};
use crate::fetch::PageSource;
use crate::models::RawReview;
use crate::parser;

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub max_pages: u32,
    pub max_duration: Option<Duration>,
    /// Retries after the first attempt of a page.
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// Pause between successive page fetches.
    pub page_delay: Duration,
}

/// Everything collected before traversal ended.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Extraction {
    pub reviews: Vec<RawReview>,
    /// Cards that could not be read into any review shape.
    pub skipped: usize,
    pub pages: u32,
}

/// Records read from one listing page.
#[derive(Debug)]
pub struct PageBatch {
    pub page: u32,
    pub reviews: Vec<RawReview>,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct PageFailure {
    pub page: u32,
    pub attempts: u32,
    pub cause: FetchError,
}

/// Outcome of the bounded retry loop around one page fetch.
#[derive(Debug)]
pub enum Attempt<T> {
    Fetched(T),
    Exhausted { attempts: u32, last_error: FetchError },
}

/// Sequential traversal of one listing. Pages come out one at a time from
/// `next_page`; once it returns `None` the extractor is spent.
pub struct Extractor<S> {
    source: S,
    opts: ExtractOptions,
    next: u32,
    started: Option<Instant>,
    finished: bool,
}

impl<S: PageSource> Extractor<S> {
    pub fn new(source: S, opts: ExtractOptions) -> Self {
        Extractor {
            source,
            opts,
            next: 1,
            started: None,
            finished: false,
        }
    }

    pub async fn next_page(&mut self) -> Option<Result<PageBatch, PageFailure>> {
        if self.finished {
            return None;
        }
        if self.next > self.opts.max_pages {
            info!(max_pages = self.opts.max_pages, "Page limit reached");
            self.finished = true;
            return None;
        }
        let started = *self.started.get_or_insert_with(Instant::now);
        if let Some(limit) = self.opts.max_duration {
            if started.elapsed() >= limit {
                info!(limit_secs = limit.as_secs_f64(), "Time limit reached");
                self.finished = true;
                return None;
            }
        }

        let page = self.next;
        if page > 1 && !self.opts.page_delay.is_zero() {
            debug!(page, delay_ms = self.opts.page_delay.as_millis() as u64, "Waiting before next page");
            tokio::time::sleep(self.opts.page_delay).await;
        }

        let html = match fetch_with_retry(&self.source, page, &self.opts).await {
            Attempt::Fetched(Some(html)) => html,
            Attempt::Fetched(None) => {
                info!(page, "Page does not exist, end of listing");
                self.finished = true;
                return None;
            }
            Attempt::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(page, attempts, error = %last_error, "Giving up on page");
                self.finished = true;
                return Some(Err(PageFailure {
                    page,
                    attempts,
                    cause: last_error,
                }));
            }
        };

        let parsed = parser::parse_page(&html);
        info!(
            page,
            reviews = parsed.reviews.len(),
            skipped = parsed.skipped,
            has_next = parsed.has_next,
            "Parsed listing page"
        );
        if parsed.skipped > 0 {
            warn!(page, skipped = parsed.skipped, "Cards without any readable field");
        }
        if parsed.reviews.is_empty() || !parsed.has_next {
            self.finished = true;
        }
        self.next += 1;

        Some(Ok(PageBatch {
            page,
            reviews: parsed.reviews,
            skipped: parsed.skipped,
        }))
    }

    /// Drain the traversal. A page that fails after its retries ends the run
    /// with everything gathered so far attached to the error.
    pub async fn run(mut self) -> Result<Extraction, PartialExtractionError> {
        let mut extraction = Extraction::default();
        while let Some(step) = self.next_page().await {
            match step {
                Ok(batch) => {
                    debug!(page = batch.page, reviews = batch.reviews.len(), "Collected page");
                    extraction.pages = batch.page;
                    extraction.skipped += batch.skipped;
                    extraction.reviews.extend(batch.reviews);
                }
                Err(failure) => {
                    return Err(PartialExtractionError {
                        page: failure.page,
                        attempts: failure.attempts,
                        cause: failure.cause,
                        extraction,
                    });
                }
            }
        }
        info!(
            pages = extraction.pages,
            reviews = extraction.reviews.len(),
            skipped = extraction.skipped,
            "Extraction complete"
        );
        Ok(extraction)
    }
}

/// Fetch one page, retrying transient failures with exponential backoff.
pub async fn fetch_with_retry<S: PageSource + ?Sized>(
    source: &S,
    page: u32,
    opts: &ExtractOptions,
) -> Attempt<Option<String>> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match source.fetch_page(page).await {
            Ok(html) => return Attempt::Fetched(html),
            Err(e) if e.is_transient() && attempt <= opts.max_retries => {
                let backoff = opts
                    .base_backoff
                    .saturating_mul(1u32 << (attempt - 1).min(16));
                warn!(
                    page,
                    attempt,
                    max_retries = opts.max_retries,
                    backoff_secs = backoff.as_secs_f64(),
                    error = %e,
                    "Page fetch failed, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return Attempt::Exhausted {
                    attempts: attempt,
                    last_error: e,
                }
            }
        }
    }
}
