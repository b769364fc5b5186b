use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db;
use crate::error::StoreError;
use crate::models::{format_timestamp, CleanedReview};

#[derive(Debug, Clone, Serialize)]
pub struct LoadRejection {
    pub review_id: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    pub inserted: usize,
    pub updated: usize,
    pub rejected: Vec<LoadRejection>,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Upsert a batch in one transaction.
///
/// A record that breaks a store invariant is rejected on its own and the rest
/// of the batch still commits. Any other database error rolls the whole batch
/// back and is returned.
pub fn load(conn: &Connection, reviews: &[CleanedReview]) -> Result<LoadReport, StoreError> {
    let tx = conn.unchecked_transaction()?;
    let mut report = LoadReport::default();
    {
        let mut exists = tx.prepare(db::REVIEW_EXISTS_SQL)?;
        let mut upsert = tx.prepare(db::UPSERT_REVIEW_SQL)?;

        for review in reviews {
            if let Err(reason) = check(review) {
                warn!(review_id = %review.review_id, %reason, "load rejected");
                report.rejected.push(LoadRejection {
                    review_id: review.review_id.clone(),
                    reason,
                });
                continue;
            }

            let existed = exists.exists(params![review.review_id])?;
            let result = upsert.execute(params![
                review.review_id,
                review.rating,
                review.title,
                review.body,
                review.reviewer_name,
                format_timestamp(&review.date),
                review.is_verified,
            ]);
            match result {
                Ok(_) if existed => report.updated += 1,
                Ok(_) => report.inserted += 1,
                Err(e) if db::is_constraint_violation(&e) => {
                    warn!(review_id = %review.review_id, error = %e, "load rejected by store");
                    report.rejected.push(LoadRejection {
                        review_id: review.review_id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    tx.commit()?;

    info!(
        inserted = report.inserted,
        updated = report.updated,
        rejected = report.rejected.len(),
        "batch committed"
    );
    Ok(report)
}

/// Store invariants, checked before the statement runs. The schema enforces
/// the same rules.
fn check(review: &CleanedReview) -> Result<(), String> {
    if review.review_id.trim().is_empty() {
        return Err("review_id is empty".into());
    }
    if !(1..=5).contains(&review.rating) {
        return Err(format!("rating {} outside 1..=5", review.rating));
    }
    if review.title.trim().is_empty() {
        return Err("title is empty".into());
    }
    if review.reviewer_name.trim().is_empty() {
        return Err("reviewer_name is empty".into());
    }
    debug!(review_id = %review.review_id, "record passes store checks");
    Ok(())
}
