//! One scheduled run: extract, clean, load, and a single outcome for the scheduler.
//!
//! Stages run strictly in sequence and hand their output forward. The store is
//! opened only for the load stage and closed when the run returns.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::artifact;
use crate::cleaner;
use crate::db;
use crate::error::{ErrorKind, PartialExtractionError, StoreError};
use crate::extractor::{ExtractOptions, Extraction, Extractor};
use crate::fetch::PageSource;
use crate::loader::{self, LoadReport};
use crate::models::CleanedReview;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    /// Raw records handed to the cleaner.
    pub extracted: usize,
    /// Dropped before the store: unreadable cards, malformed and invalid records.
    pub rejected: usize,
    pub loaded: usize,
    /// Refused by the store.
    pub failed: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum RunOutcome {
    Success {
        counts: RunCounts,
    },
    PartialSuccess {
        counts: RunCounts,
        errors: Vec<ErrorKind>,
    },
    Failure {
        kind: ErrorKind,
        reason: String,
        counts: RunCounts,
    },
}

impl RunOutcome {
    pub fn counts(&self) -> &RunCounts {
        match self {
            RunOutcome::Success { counts }
            | RunOutcome::PartialSuccess { counts, .. }
            | RunOutcome::Failure { counts, .. } => counts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success { .. } => "Success",
            RunOutcome::PartialSuccess { .. } => "PartialSuccess",
            RunOutcome::Failure { .. } => "Failure",
        }
    }

    /// 0 success, 2 partial, 1 failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success { .. } => 0,
            RunOutcome::PartialSuccess { .. } => 2,
            RunOutcome::Failure { .. } => 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Page at which extraction gave up, if it did.
    pub stopped_at_page: Option<u32>,
    pub quality_warnings: usize,
    pub elapsed_secs: f64,
}

/// Where a run reads and writes. Without `data_dir` no artifacts are written.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub db_path: PathBuf,
    pub data_dir: Option<PathBuf>,
}

impl RunPaths {
    fn artifact(&self, name: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(name))
    }
}

pub const RAW_ARTIFACT: &str = "raw_reviews.json";
pub const CLEANED_ARTIFACT: &str = "cleaned_reviews.json";

pub fn new_run_id() -> String {
    Utc::now().format("run-%Y%m%dT%H%M%S%.3fZ").to_string()
}

/// Run every stage once and fold the results into a single outcome.
pub async fn run<S: PageSource>(
    source: S,
    opts: ExtractOptions,
    paths: &RunPaths,
    pb: &ProgressBar,
) -> RunReport {
    let run_id = new_run_id();
    let started = Instant::now();
    info!(%run_id, db = %paths.db_path.display(), "Starting run");

    let mut report = RunReport {
        run_id,
        outcome: RunOutcome::Success {
            counts: RunCounts::default(),
        },
        stopped_at_page: None,
        quality_warnings: 0,
        elapsed_secs: 0.0,
    };
    let outcome = run_stages(source, opts, paths, pb, &mut report).await;
    report.outcome = outcome;
    report.elapsed_secs = started.elapsed().as_secs_f64();

    match &report.outcome {
        RunOutcome::Failure { kind, reason, .. } => {
            warn!(run_id = %report.run_id, %kind, %reason, "Run failed")
        }
        outcome => info!(
            run_id = %report.run_id,
            outcome = outcome.label(),
            counts = ?outcome.counts(),
            "Run finished"
        ),
    }
    report
}

async fn run_stages<S: PageSource>(
    source: S,
    opts: ExtractOptions,
    paths: &RunPaths,
    pb: &ProgressBar,
    report: &mut RunReport,
) -> RunOutcome {
    let mut counts = RunCounts::default();
    let mut errors = Vec::new();

    // Extract
    let extraction = match extract(source, opts, pb).await {
        Ok(extraction) => extraction,
        Err(partial) if partial.extraction.reviews.is_empty() => {
            return RunOutcome::Failure {
                kind: ErrorKind::TransientFetchError,
                reason: partial.to_string(),
                counts,
            };
        }
        Err(partial) => {
            warn!(
                page = partial.page,
                kept = partial.extraction.reviews.len(),
                error = %partial.cause,
                "Continuing with partial extraction"
            );
            report.stopped_at_page = Some(partial.page);
            errors.push(ErrorKind::TransientFetchError);
            partial.extraction
        }
    };
    counts.extracted = extraction.reviews.len();
    counts.rejected += extraction.skipped;
    if extraction.skipped > 0 {
        errors.push(ErrorKind::MalformedRecord);
    }
    if let Some(path) = paths.artifact(RAW_ARTIFACT) {
        if let Err(e) = artifact::write_raw(&path, &extraction.reviews) {
            warn!(error = %e, "Could not write raw artifact");
        }
    }

    // Clean
    let cleaned = cleaner::clean(extraction.reviews);
    counts.rejected += cleaned.rejections.len();
    for kind in [ErrorKind::MalformedRecord, ErrorKind::ValidationRejected] {
        if cleaned.count(kind) > 0 && !errors.contains(&kind) {
            errors.push(kind);
        }
    }
    report.quality_warnings = cleaned.warnings.len();
    if let Some(path) = paths.artifact(CLEANED_ARTIFACT) {
        if let Err(e) = artifact::write_cleaned(&path, &cleaned.reviews) {
            warn!(error = %e, "Could not write cleaned artifact");
        }
    }

    // Load
    let loaded = match load(&paths.db_path, &cleaned.reviews) {
        Ok(loaded) => loaded,
        Err(e) => {
            return RunOutcome::Failure {
                kind: ErrorKind::StoreUnavailable,
                reason: e.to_string(),
                counts,
            };
        }
    };
    counts.inserted = loaded.inserted;
    counts.updated = loaded.updated;
    counts.loaded = loaded.loaded();
    counts.failed = loaded.rejected.len();
    if counts.failed > 0 {
        errors.push(ErrorKind::LoadRejected);
    }

    if errors.is_empty() {
        RunOutcome::Success { counts }
    } else {
        RunOutcome::PartialSuccess { counts, errors }
    }
}

/// Traverse the listing behind a spinner.
#[instrument(skip_all, fields(max_pages = opts.max_pages))]
pub async fn extract<S: PageSource>(
    source: S,
    opts: ExtractOptions,
    pb: &ProgressBar,
) -> Result<Extraction, PartialExtractionError> {
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Extracting reviews...");
    pb.enable_steady_tick(Duration::from_millis(120));

    let result = Extractor::new(source, opts).run().await;
    pb.finish_and_clear();
    result
}

/// Open the store for this batch only; the connection closes on return.
#[instrument(skip_all, fields(records = reviews.len()))]
pub fn load(db_path: &Path, reviews: &[CleanedReview]) -> Result<LoadReport, StoreError> {
    let conn = db::connect(db_path)?;
    loader::load(&conn, reviews)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, quick_options, timeout, Card, ScriptedSource};

    fn paths(dir: &tempfile::TempDir) -> RunPaths {
        RunPaths {
            db_path: dir.path().join("reviews.db"),
            data_dir: Some(dir.path().join("data")),
        }
    }

    fn two_pages() -> ScriptedSource {
        ScriptedSource::new()
            .page(
                1,
                listing(&[Card::new("r1", "5", "Great"), Card::new("r2", "4", "Good")], true),
            )
            .page(2, listing(&[Card::new("r3", "3", "Okay")], false))
    }

    fn row_count(path: &Path) -> usize {
        let conn = db::connect(path).unwrap();
        db::get_stats(&conn).unwrap().total
    }

    #[tokio::test]
    async fn all_valid_records_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        let report = run(two_pages(), quick_options(10), &paths, &ProgressBar::hidden()).await;

        let counts = RunCounts {
            extracted: 3,
            rejected: 0,
            loaded: 3,
            failed: 0,
            inserted: 3,
            updated: 0,
        };
        assert_eq!(report.outcome, RunOutcome::Success { counts });
        assert_eq!(report.outcome.exit_code(), 0);
        assert_eq!(row_count(&paths.db_path), 3);

        let data = paths.data_dir.as_ref().unwrap();
        assert_eq!(artifact::read_raw(&data.join(RAW_ARTIFACT)).unwrap().len(), 3);
        assert_eq!(artifact::read_cleaned(&data.join(CLEANED_ARTIFACT)).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected_rest_loads() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        let source = ScriptedSource::new().page(
            1,
            listing(
                &[
                    Card::new("r1", "5", "Great"),
                    Card::new("r2", "6", "Too good"),
                    Card::new("r3", "2", "Poor"),
                ],
                false,
            ),
        );
        let report = run(source, quick_options(10), &paths, &ProgressBar::hidden()).await;

        match &report.outcome {
            RunOutcome::PartialSuccess { counts, errors } => {
                assert_eq!(counts.rejected, 1);
                assert_eq!(counts.loaded, 2);
                assert_eq!(errors, &[ErrorKind::ValidationRejected]);
            }
            other => panic!("expected partial success, got {other:?}"),
        }
        assert_eq!(report.outcome.exit_code(), 2);

        let conn = db::connect(&paths.db_path).unwrap();
        assert!(db::fetch_review(&conn, "r2").unwrap().is_none());
        assert!(db::fetch_review(&conn, "r3").unwrap().is_some());
    }

    #[tokio::test]
    async fn partial_extraction_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        let cards: Vec<Card> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|id| Card::new(id, "4", "Fine"))
            .collect();
        let source = ScriptedSource::new()
            .page(1, listing(&cards, true))
            .respond(2, timeout(2));

        let report = run(source, quick_options(10), &paths, &ProgressBar::hidden()).await;
        match &report.outcome {
            RunOutcome::PartialSuccess { counts, errors } => {
                assert_eq!(counts.extracted, 5);
                assert_eq!(counts.loaded, 5);
                assert_eq!(errors, &[ErrorKind::TransientFetchError]);
            }
            other => panic!("expected partial success, got {other:?}"),
        }
        assert_eq!(report.stopped_at_page, Some(2));
        assert_eq!(row_count(&paths.db_path), 5);
    }

    #[tokio::test]
    async fn rerun_only_updates() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        let first = run(two_pages(), quick_options(10), &paths, &ProgressBar::hidden()).await;
        let conn = db::connect(&paths.db_path).unwrap();
        let before = db::fetch_all(&conn).unwrap();

        let second = run(two_pages(), quick_options(10), &paths, &ProgressBar::hidden()).await;
        assert_eq!(first.outcome.counts().inserted, 3);
        assert_eq!(second.outcome.counts().inserted, 0);
        assert_eq!(second.outcome.counts().updated, 3);

        let after = db::fetch_all(&conn).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unreachable_store_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let paths = RunPaths {
            db_path: blocker.join("reviews.db"),
            data_dir: None,
        };

        let report = run(two_pages(), quick_options(10), &paths, &ProgressBar::hidden()).await;
        match &report.outcome {
            RunOutcome::Failure { kind, counts, .. } => {
                assert_eq!(*kind, ErrorKind::StoreUnavailable);
                assert_eq!(counts.extracted, 3);
                assert_eq!(counts.loaded, 0);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.outcome.exit_code(), 1);
        assert!(!paths.db_path.exists());
    }

    #[tokio::test]
    async fn first_page_failure_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        let source = ScriptedSource::new().respond(1, timeout(1));

        let report = run(source, quick_options(10), &paths, &ProgressBar::hidden()).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Failure { kind: ErrorKind::TransientFetchError, .. }
        ));
        assert!(!paths.db_path.exists());
    }

    #[tokio::test]
    async fn empty_listing_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        let report = run(ScriptedSource::new(), quick_options(10), &paths, &ProgressBar::hidden()).await;
        assert_eq!(
            report.outcome,
            RunOutcome::Success { counts: RunCounts::default() }
        );
    }

    #[test]
    fn report_serializes_with_status_tag() {
        let outcome = RunOutcome::PartialSuccess {
            counts: RunCounts::default(),
            errors: vec![ErrorKind::LoadRejected],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "PartialSuccess");
        assert_eq!(json["errors"][0], "LoadRejected");
    }
}
