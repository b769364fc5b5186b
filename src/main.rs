mod artifact;
mod cleaner;
mod db;
mod error;
mod extractor;
mod fetch;
mod loader;
mod models;
mod parser;
mod pipeline;
mod settings;
mod utils;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use serde::Serialize;

use crate::fetch::HttpPageSource;
use crate::models::format_timestamp;
use crate::pipeline::{RunOutcome, RunPaths};
use crate::settings::Settings;
use crate::utils::truncate;

#[derive(Parser)]
#[command(name = "review_etl", about = "Scrape, clean and store product reviews")]
struct Cli {
    /// Config file (default: ./reviews.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory for the intermediate JSON artifacts
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, clean and load in one run
    Run {
        /// Max listing pages to visit
        #[arg(short = 'n', long)]
        pages: Option<u32>,
        /// Company domain whose reviews to fetch
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Fetch listing pages into the raw artifact
    Extract {
        #[arg(short = 'n', long)]
        pages: Option<u32>,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Validate and deduplicate the raw artifact into the cleaned artifact
    Clean,
    /// Upsert the cleaned artifact into the database
    Load,
    /// Database summary
    Stats,
    /// Latest reviews by date
    Recent {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Reviews filtered by rating and date range
    Query {
        #[arg(long)]
        min_rating: Option<u8>,
        #[arg(long)]
        max_rating: Option<u8>,
        /// Earliest review date (e.g. 2024-01-31)
        #[arg(long)]
        since: Option<String>,
        /// Latest review date, inclusive
        #[arg(long)]
        until: Option<String>,
        /// Only verified reviews
        #[arg(long)]
        verified: bool,
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    let json = cli.json;

    let code = match cli.command {
        Commands::Run { pages, domain } => {
            apply_source_overrides(&mut settings, pages, domain);
            let source = http_source(&settings)?;
            let paths = RunPaths {
                db_path: settings.db_path.clone(),
                data_dir: Some(settings.data_dir.clone()),
            };
            let report =
                pipeline::run(source, settings.extract_options(), &paths, &ProgressBar::new_spinner())
                    .await;
            if json {
                print_json(&report)?;
            } else {
                print_outcome(&report.outcome);
                if let Some(page) = report.stopped_at_page {
                    println!("Extraction stopped at page {}", page);
                }
                if report.quality_warnings > 0 {
                    println!("Quality warnings: {}", report.quality_warnings);
                }
                println!("Run id: {}", report.run_id);
            }
            report.outcome.exit_code()
        }
        Commands::Extract { pages, domain } => {
            apply_source_overrides(&mut settings, pages, domain);
            let source = http_source(&settings)?;
            let (extraction, partial) = match pipeline::extract(
                source,
                settings.extract_options(),
                &ProgressBar::new_spinner(),
            )
            .await
            {
                Ok(extraction) => (extraction, None),
                Err(e) => {
                    let message = e.to_string();
                    (e.extraction, Some(message))
                }
            };
            let path = settings.raw_artifact_path();
            artifact::write_raw(&path, &extraction.reviews)?;
            if json {
                print_json(&extraction)?;
            } else {
                println!(
                    "Extracted {} reviews from {} pages ({} unreadable cards) -> {}",
                    extraction.reviews.len(),
                    extraction.pages,
                    extraction.skipped,
                    path.display()
                );
            }
            match partial {
                Some(message) if extraction.reviews.is_empty() => {
                    eprintln!("{}", message);
                    1
                }
                Some(message) => {
                    eprintln!("{}", message);
                    2
                }
                None => 0,
            }
        }
        Commands::Clean => {
            let raws = artifact::read_raw(&settings.raw_artifact_path())
                .context("Run 'extract' first")?;
            let out = cleaner::clean(raws);
            let path = settings.cleaned_artifact_path();
            artifact::write_cleaned(&path, &out.reviews)?;
            let summary = cleaner::summarize(&out.reviews);
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Kept {} reviews, dropped {} ({} quality warnings) -> {}",
                    out.reviews.len(),
                    out.rejections.len(),
                    out.warnings.len(),
                    path.display()
                );
                for r in &out.rejections {
                    println!("  dropped [{}]: {}", r.kind, r.reason);
                }
                println!("Verified:       {}", summary.verified_count);
                println!(
                    "Date range:     {} .. {}",
                    summary.date_min.as_deref().unwrap_or("-"),
                    summary.date_max.as_deref().unwrap_or("-")
                );
                println!("Avg title len:  {:.1}", summary.avg_title_length);
                println!("Avg body len:   {:.1}", summary.avg_body_length);
                for (rating, count) in summary.rating_distribution.iter().rev() {
                    println!("  {} stars: {}", rating, count);
                }
            }
            if out.rejections.is_empty() {
                0
            } else {
                2
            }
        }
        Commands::Load => {
            let reviews = artifact::read_cleaned(&settings.cleaned_artifact_path())
                .context("Run 'clean' first")?;
            let report = pipeline::load(&settings.db_path, &reviews)?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "Loaded {} reviews ({} new, {} updated) into {}",
                    report.loaded(),
                    report.inserted,
                    report.updated,
                    settings.db_path.display()
                );
                for r in &report.rejected {
                    println!("  rejected {}: {}", r.review_id, r.reason);
                }
            }
            if report.rejected.is_empty() {
                0
            } else {
                2
            }
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            let s = db::get_stats(&conn)?;
            if json {
                print_json(&s)?;
            } else {
                println!("Total:     {}", s.total);
                println!("Verified:  {}", s.verified);
                match s.average_rating {
                    Some(avg) => println!("Average:   {:.2}", avg),
                    None => println!("Average:   -"),
                }
                println!(
                    "Dates:     {} .. {}",
                    s.date_min.as_deref().unwrap_or("-"),
                    s.date_max.as_deref().unwrap_or("-")
                );
                for (rating, count) in &s.rating_distribution {
                    println!("  {} stars: {}", rating, count);
                }
            }
            0
        }
        Commands::Recent { limit } => {
            let conn = db::connect(&settings.db_path)?;
            let rows = db::fetch_recent(&conn, limit)?;
            print_reviews(&rows, json)?;
            0
        }
        Commands::Query {
            min_rating,
            max_rating,
            since,
            until,
            verified,
            limit,
        } => {
            let filter = db::ReviewFilter {
                min_rating,
                max_rating,
                since: since.as_deref().map(date_bound).transpose()?,
                until: until.as_deref().map(end_of_day_bound).transpose()?,
                verified_only: verified,
                limit,
            };
            let conn = db::connect(&settings.db_path)?;
            let rows = db::fetch_filtered(&conn, &filter)?;
            print_reviews(&rows, json)?;
            0
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 && !json {
        println!("\nDone in {}", format_duration(elapsed));
    }

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn apply_source_overrides(settings: &mut Settings, pages: Option<u32>, domain: Option<String>) {
    if let Some(n) = pages {
        settings.max_pages = n;
    }
    if let Some(d) = domain {
        settings.domain = d;
    }
}

fn http_source(settings: &Settings) -> anyhow::Result<HttpPageSource> {
    HttpPageSource::new(
        &settings.listing_url(),
        &settings.user_agent,
        Duration::from_secs(settings.fetch_timeout_secs),
    )
}

/// Any date form the cleaner accepts, as a canonical lower bound.
fn date_bound(s: &str) -> anyhow::Result<String> {
    let ts = cleaner::normalize::date(s)?;
    Ok(format_timestamp(&ts))
}

/// A bare date as an upper bound covers that whole day.
fn end_of_day_bound(s: &str) -> anyhow::Result<String> {
    let bound = date_bound(s)?;
    match bound.strip_suffix(" 00:00:00") {
        Some(day) if s.trim().len() <= 10 => Ok(format!("{} 23:59:59", day)),
        _ => Ok(bound),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    let c = outcome.counts();
    match outcome {
        RunOutcome::Success { .. } => println!("Success"),
        RunOutcome::PartialSuccess { errors, .. } => {
            let kinds: Vec<String> = errors.iter().map(|k| k.to_string()).collect();
            println!("PartialSuccess ({})", kinds.join(", "));
        }
        RunOutcome::Failure { kind, reason, .. } => println!("Failure [{}]: {}", kind, reason),
    }
    println!(
        "Extracted {} | rejected {} | loaded {} ({} new, {} updated) | failed {}",
        c.extracted, c.rejected, c.loaded, c.inserted, c.updated, c.failed
    );
}

fn print_reviews(rows: &[models::StoredReview], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No reviews found.");
        return Ok(());
    }

    println!(
        "{:>3} | {:<19} | {:>1} | {:<20} | {:<40} | {:<3}",
        "#", "Date", "R", "Reviewer", "Title", "Ver"
    );
    println!("{}", "-".repeat(100));
    for (i, r) in rows.iter().enumerate() {
        println!(
            "{:>3} | {:<19} | {:>1} | {:<20} | {:<40} | {:<3}",
            i + 1,
            r.date,
            r.rating,
            truncate(&r.reviewer_name, 20),
            truncate(&r.title, 40),
            if r.is_verified { "yes" } else { "" }
        );
    }
    println!("\n{} reviews", rows.len());
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
