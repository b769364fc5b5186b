pub mod identity;
pub mod normalize;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ErrorKind, ValidationError};
use crate::models::{format_timestamp, CleanedReview, RawReview, RawValue};

/// A raw record the cleaner dropped, and why.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub kind: ErrorKind,
    pub reason: String,
    pub raw: RawReview,
}

/// Two occurrences of one review disagreed; the first value was kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityWarning {
    pub review_id: String,
    pub field: &'static str,
    pub kept: String,
    pub ignored: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CleanOutput {
    pub reviews: Vec<CleanedReview>,
    pub rejections: Vec<Rejection>,
    pub warnings: Vec<QualityWarning>,
}

impl CleanOutput {
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.rejections.iter().filter(|r| r.kind == kind).count()
    }
}

/// Resolve identity, merge duplicates, then validate. Output keeps first-seen order.
pub fn clean(raws: Vec<RawReview>) -> CleanOutput {
    let total = raws.len();
    let mut out = CleanOutput::default();
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, RawReview> = HashMap::new();
    let mut duplicates = 0usize;

    for raw in raws {
        let Some(id) = identity::resolve(&raw) else {
            out.rejections.push(Rejection {
                kind: ErrorKind::MalformedRecord,
                reason: "no field to identify the review by".to_string(),
                raw,
            });
            continue;
        };
        match merged.get_mut(&id) {
            Some(first) => {
                duplicates += 1;
                merge_into(first, raw, &id, &mut out.warnings);
            }
            None => {
                order.push(id.clone());
                merged.insert(id, raw);
            }
        }
    }

    for id in order {
        let Some(raw) = merged.remove(&id) else {
            continue;
        };
        match validate(&id, &raw) {
            Ok(review) => out.reviews.push(review),
            Err(e) => out.rejections.push(Rejection {
                kind: ErrorKind::ValidationRejected,
                reason: e.to_string(),
                raw,
            }),
        }
    }

    for w in &out.warnings {
        warn!(review_id = %w.review_id, field = w.field, kept = %w.kept, ignored = %w.ignored, "Conflicting duplicate");
    }
    for r in &out.rejections {
        warn!(kind = %r.kind, reason = %r.reason, "Rejected record");
    }
    info!(
        input = total,
        cleaned = out.reviews.len(),
        duplicates,
        rejected = out.rejections.len(),
        warnings = out.warnings.len(),
        "Cleaning complete"
    );
    out
}

/// Check one (merged) raw record against the schema.
pub fn validate(review_id: &str, raw: &RawReview) -> Result<CleanedReview, ValidationError> {
    let rating = match &raw.rating {
        Some(v) => normalize::rating(v)?,
        None => return Err(ValidationError::MissingRating),
    };
    let title = raw.title.as_deref().map(normalize::text).unwrap_or_default();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let reviewer_name = raw
        .reviewer_name
        .as_deref()
        .map(normalize::text)
        .unwrap_or_default();
    if reviewer_name.is_empty() {
        return Err(ValidationError::EmptyReviewerName);
    }
    let date = match raw.date.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => normalize::date(d)?,
        _ => return Err(ValidationError::MissingDate),
    };

    Ok(CleanedReview {
        review_id: review_id.to_string(),
        rating,
        title,
        body: raw.body.as_deref().map(normalize::text).unwrap_or_default(),
        reviewer_name,
        date,
        is_verified: normalize::verified(raw.is_verified.as_ref()),
    })
}

/// Fill the first occurrence's gaps from a later one. Rating and date keep the
/// first value; a disagreement is reported, not resolved.
fn merge_into(first: &mut RawReview, later: RawReview, id: &str, warnings: &mut Vec<QualityWarning>) {
    fill_text(&mut first.title, later.title);
    fill_text(&mut first.body, later.body);
    fill_text(&mut first.reviewer_name, later.reviewer_name);
    if first.is_verified.is_none() {
        first.is_verified = later.is_verified;
    }

    if let Some(other) = later.rating {
        if let Some(kept) = &first.rating {
            if !same_rating(kept, &other) {
                warnings.push(QualityWarning {
                    review_id: id.to_string(),
                    field: "rating",
                    kept: normalize::display(kept),
                    ignored: normalize::display(&other),
                });
            }
        } else {
            first.rating = Some(other);
        }
    }

    let first_date_blank = first.date.as_deref().map_or(true, |d| d.trim().is_empty());
    match later.date {
        Some(other) if first_date_blank => first.date = Some(other),
        Some(other) if other.trim().is_empty() => {}
        Some(other) => {
            let kept = first.date.as_deref().unwrap_or_default();
            if !same_date(kept, &other) {
                warnings.push(QualityWarning {
                    review_id: id.to_string(),
                    field: "date",
                    kept: kept.to_string(),
                    ignored: other,
                });
            }
        }
        None => {}
    }
}

fn fill_text(slot: &mut Option<String>, other: Option<String>) {
    let blank = slot.as_deref().map_or(true, |s| s.trim().is_empty());
    if blank {
        if let Some(v) = other.filter(|v| !v.trim().is_empty()) {
            *slot = Some(v);
        }
    }
}

fn same_rating(a: &RawValue, b: &RawValue) -> bool {
    match (normalize::rating(a), normalize::rating(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

fn same_date(a: &str, b: &str) -> bool {
    match (normalize::date(a), normalize::date(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}

/// Shape of a cleaned batch, for the CLI report.
#[derive(Debug, Serialize)]
pub struct CleanSummary {
    pub total_records: usize,
    pub rating_distribution: BTreeMap<u8, usize>,
    pub verified_count: usize,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub avg_title_length: f64,
    pub avg_body_length: f64,
}

pub fn summarize(reviews: &[CleanedReview]) -> CleanSummary {
    let mut rating_distribution = BTreeMap::new();
    for r in reviews {
        *rating_distribution.entry(r.rating).or_insert(0) += 1;
    }
    let avg = |f: fn(&CleanedReview) -> usize| {
        if reviews.is_empty() {
            0.0
        } else {
            let total: usize = reviews.iter().map(f).sum();
            (total as f64 / reviews.len() as f64 * 100.0).round() / 100.0
        }
    };
    CleanSummary {
        total_records: reviews.len(),
        rating_distribution,
        verified_count: reviews.iter().filter(|r| r.is_verified).count(),
        date_min: reviews.iter().map(|r| r.date).min().map(|d| format_timestamp(&d)),
        date_max: reviews.iter().map(|r| r.date).max().map(|d| format_timestamp(&d)),
        avg_title_length: avg(|r| r.title.chars().count()),
        avg_body_length: avg(|r| r.body.chars().count()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, rating: &str, title: &str, body: &str) -> RawReview {
        RawReview {
            source_review_id: (!id.is_empty()).then(|| id.to_string()),
            rating: Some(RawValue::text(rating)),
            title: Some(title.to_string()),
            body: (!body.is_empty()).then(|| body.to_string()),
            reviewer_name: Some("Ana".to_string()),
            date: Some("2024-05-01T10:00:00.000Z".to_string()),
            is_verified: None,
        }
    }

    #[test]
    fn all_valid() {
        let out = clean(vec![raw("a", "5", "Great", "x"), raw("b", "3", "Meh", ""), raw("c", "1", "Bad", "")]);
        assert_eq!(out.reviews.len(), 3);
        assert!(out.rejections.is_empty());
        let ids: Vec<_> = out.reviews.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(out.reviews[1].body, "");
        assert!(!out.reviews[0].is_verified);
    }

    #[test]
    fn out_of_range_rating_rejected() {
        let out = clean(vec![raw("a", "6", "Too good", ""), raw("b", "4", "Fine", "")]);
        assert_eq!(out.reviews.len(), 1);
        assert_eq!(out.reviews[0].review_id, "b");
        assert_eq!(out.rejections.len(), 1);
        assert_eq!(out.rejections[0].kind, ErrorKind::ValidationRejected);
        assert_eq!(out.count(ErrorKind::ValidationRejected), 1);
    }

    #[test]
    fn later_duplicate_fills_body() {
        let out = clean(vec![raw("a", "4", "Fine", ""), raw("a", "4", "Fine", "Now with details")]);
        assert_eq!(out.reviews.len(), 1);
        assert_eq!(out.reviews[0].body, "Now with details");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn conflicting_rating_keeps_first() {
        let out = clean(vec![raw("a", "4", "Fine", ""), raw("a", "2", "Fine", "")]);
        assert_eq!(out.reviews[0].rating, 4);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field, "rating");
        assert_eq!(out.warnings[0].ignored, "2");
    }

    #[test]
    fn conflicting_date_keeps_first() {
        let mut later = raw("a", "4", "Fine", "");
        later.date = Some("2023-01-01".into());
        let out = clean(vec![raw("a", "4", "Fine", ""), later]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field, "date");
        assert_eq!(format_timestamp(&out.reviews[0].date), "2024-05-01 10:00:00");
    }

    #[test]
    fn blank_later_date_is_not_a_conflict() {
        let mut later = raw("a", "4", "Fine", "");
        later.date = Some("  ".into());
        let out = clean(vec![raw("a", "4", "Fine", ""), later]);
        assert!(out.warnings.is_empty());
        assert_eq!(format_timestamp(&out.reviews[0].date), "2024-05-01 10:00:00");
    }

    #[test]
    fn same_value_in_other_format_is_not_a_conflict() {
        let mut later = raw("a", "4", "Fine", "");
        later.rating = Some(RawValue::Number(4.into()));
        later.date = Some("2024-05-01 10:00:00".into());
        let out = clean(vec![raw("a", "4", "Fine", ""), later]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn missing_fields() {
        let mut no_title = raw("a", "4", "   ", "");
        no_title.title = Some("   ".into());
        let mut no_name = raw("b", "4", "Ok", "");
        no_name.reviewer_name = None;
        let mut bad_date = raw("c", "4", "Ok", "");
        bad_date.date = Some("last week".into());
        let mut no_rating = raw("d", "4", "Ok", "");
        no_rating.rating = None;

        let out = clean(vec![no_title, no_name, bad_date, no_rating]);
        assert!(out.reviews.is_empty());
        let reasons: Vec<_> = out.rejections.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(
            reasons,
            [
                "title is empty",
                "reviewer name is empty",
                "date \"last week\" could not be parsed",
                "rating is missing",
            ]
        );
    }

    #[test]
    fn unidentifiable_record_is_malformed() {
        let out = clean(vec![RawReview {
            rating: Some(RawValue::text("5")),
            ..Default::default()
        }]);
        assert_eq!(out.count(ErrorKind::MalformedRecord), 1);
    }

    #[test]
    fn fallback_ids_merge_across_duplicates() {
        let out = clean(vec![raw("", "5", "Great", ""), raw("", "5", "Great", "Body arrives later")]);
        assert_eq!(out.reviews.len(), 1);
        assert!(out.reviews[0].review_id.starts_with("gen_"));
        assert_eq!(out.reviews[0].body, "Body arrives later");
    }

    #[test]
    fn summary() {
        let out = clean(vec![raw("a", "5", "Great", "abcd"), raw("b", "5", "Ok", ""), raw("c", "1", "Bad", "")]);
        let s = summarize(&out.reviews);
        assert_eq!(s.total_records, 3);
        assert_eq!(s.rating_distribution.get(&5), Some(&2));
        assert_eq!(s.avg_body_length, 1.33);
        assert_eq!(s.date_min.as_deref(), Some("2024-05-01 10:00:00"));
    }
}
