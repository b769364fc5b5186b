use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::StoreError;
use crate::models::StoredReview;

pub fn connect(path: &Path) -> Result<Connection, StoreError> {
    let unavailable = |message: String| StoreError::Unavailable {
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
    }
    let conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| unavailable(e.to_string()))?;
    init_schema(&conn).map_err(|e| unavailable(e.to_string()))?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reviews (
            id            INTEGER PRIMARY KEY,
            review_id     TEXT UNIQUE NOT NULL CHECK(length(trim(review_id)) > 0),
            rating        INTEGER NOT NULL CHECK(rating BETWEEN 1 AND 5),
            title         TEXT NOT NULL CHECK(length(trim(title)) > 0),
            body          TEXT,
            reviewer_name TEXT NOT NULL CHECK(length(trim(reviewer_name)) > 0),
            date          TEXT NOT NULL CHECK(length(date) > 0),
            is_verified   BOOLEAN NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_rating ON reviews(rating);
        CREATE INDEX IF NOT EXISTS idx_reviews_date ON reviews(date);
        CREATE INDEX IF NOT EXISTS idx_reviews_verified ON reviews(is_verified);
        ",
    )?;
    Ok(())
}

// ── Writes ──

/// Insert or overwrite by `review_id`. `id` and `created_at` survive updates.
pub const UPSERT_REVIEW_SQL: &str = "
    INSERT INTO reviews (review_id, rating, title, body, reviewer_name, date, is_verified)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(review_id) DO UPDATE SET
        rating        = excluded.rating,
        title         = excluded.title,
        body          = excluded.body,
        reviewer_name = excluded.reviewer_name,
        date          = excluded.date,
        is_verified   = excluded.is_verified";

pub const REVIEW_EXISTS_SQL: &str = "SELECT 1 FROM reviews WHERE review_id = ?1";

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ── Reads ──

const REVIEW_COLUMNS: &str =
    "id, review_id, rating, title, body, reviewer_name, date, is_verified, created_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReview> {
    Ok(StoredReview {
        id: row.get(0)?,
        review_id: row.get(1)?,
        rating: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        reviewer_name: row.get(5)?,
        date: row.get(6)?,
        is_verified: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn fetch_review(conn: &Connection, review_id: &str) -> Result<Option<StoredReview>, StoreError> {
    let sql = format!("SELECT {} FROM reviews WHERE review_id = ?1", REVIEW_COLUMNS);
    let row = conn
        .query_row(&sql, [review_id], review_from_row)
        .optional()?;
    Ok(row)
}

pub fn fetch_all(conn: &Connection) -> Result<Vec<StoredReview>, StoreError> {
    let sql = format!("SELECT {} FROM reviews ORDER BY id", REVIEW_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], review_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_recent(conn: &Connection, limit: usize) -> Result<Vec<StoredReview>, StoreError> {
    fetch_filtered(
        conn,
        &ReviewFilter {
            limit,
            ..Default::default()
        },
    )
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub min_rating: Option<u8>,
    pub max_rating: Option<u8>,
    /// Canonical timestamps, inclusive.
    pub since: Option<String>,
    pub until: Option<String>,
    pub verified_only: bool,
    pub limit: usize,
}

/// Newest first. Rating and date bounds go through their indexes.
pub fn fetch_filtered(conn: &Connection, filter: &ReviewFilter) -> Result<Vec<StoredReview>, StoreError> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(min) = filter.min_rating {
        conditions.push(format!("rating >= ?{}", params.len() + 1));
        params.push(Box::new(min));
    }
    if let Some(max) = filter.max_rating {
        conditions.push(format!("rating <= ?{}", params.len() + 1));
        params.push(Box::new(max));
    }
    if let Some(since) = &filter.since {
        conditions.push(format!("date >= ?{}", params.len() + 1));
        params.push(Box::new(since.clone()));
    }
    if let Some(until) = &filter.until {
        conditions.push(format!("date <= ?{}", params.len() + 1));
        params.push(Box::new(until.clone()));
    }
    if filter.verified_only {
        conditions.push("is_verified = 1".to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM reviews{} ORDER BY date DESC, id DESC LIMIT {}",
        REVIEW_COLUMNS, where_clause, filter.limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), review_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total: usize,
    pub verified: usize,
    pub average_rating: Option<f64>,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    /// (rating, count), highest rating first.
    pub rating_distribution: Vec<(u8, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats, StoreError> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM reviews", [], |r| r.get(0))?;
    let verified: usize = conn.query_row(
        "SELECT COUNT(*) FROM reviews WHERE is_verified = 1",
        [],
        |r| r.get(0),
    )?;
    let average_rating: Option<f64> =
        conn.query_row("SELECT ROUND(AVG(rating), 2) FROM reviews", [], |r| r.get(0))?;
    let (date_min, date_max): (Option<String>, Option<String>) =
        conn.query_row("SELECT MIN(date), MAX(date) FROM reviews", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })?;

    let mut stmt = conn.prepare(
        "SELECT rating, COUNT(*) FROM reviews GROUP BY rating ORDER BY rating DESC",
    )?;
    let rating_distribution = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        verified,
        average_rating,
        date_min,
        date_max,
        rating_distribution,
    })
}
