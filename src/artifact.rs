use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::models::{CleanedReview, RawReview};

pub fn write_raw(path: &Path, reviews: &[RawReview]) -> Result<()> {
    write_json(path, reviews)
}

pub fn read_raw(path: &Path) -> Result<Vec<RawReview>> {
    read_json(path)
}

pub fn write_cleaned(path: &Path, reviews: &[CleanedReview]) -> Result<()> {
    write_json(path, reviews)
}

pub fn read_cleaned(path: &Path) -> Result<Vec<CleanedReview>> {
    read_json(path)
}

fn write_json<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), records = records.len(), "Wrote artifact");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<T> = serde_json::from_str(&text)
        .with_context(|| format!("Malformed artifact {}", path.display()))?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawValue;
    use chrono::{TimeZone, Utc};

    #[test]
    fn raw_artifact_keeps_scalar_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/raw_reviews.json");
        let reviews = vec![
            RawReview {
                source_review_id: Some("a".into()),
                rating: Some(RawValue::text("4")),
                is_verified: Some(RawValue::Bool(true)),
                ..Default::default()
            },
            RawReview {
                rating: Some(RawValue::Number(5.into())),
                title: Some("Fine".into()),
                ..Default::default()
            },
        ];
        write_raw(&path, &reviews).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"rating\": 5,"), "{text}");
        assert_eq!(read_raw(&path).unwrap(), reviews);

        let again = dir.path().join("again.json");
        write_raw(&again, &read_raw(&path).unwrap()).unwrap();
        assert_eq!(std::fs::read_to_string(&again).unwrap(), text);
    }

    #[test]
    fn cleaned_artifact_uses_canonical_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned_reviews.json");
        let review = CleanedReview {
            review_id: "a".into(),
            rating: 4,
            title: "Fine".into(),
            body: String::new(),
            reviewer_name: "Ana".into(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            is_verified: false,
        };
        write_cleaned(&path, std::slice::from_ref(&review)).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"2024-05-01 10:00:00\""));
        let back = read_cleaned(&path).unwrap();
        assert_eq!(back[0].date, review.date);
        assert_eq!(back[0].review_id, "a");
    }

    #[test]
    fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_raw(&dir.path().join("absent.json")).is_err());
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        let err = read_cleaned(&bad).unwrap_err();
        assert!(err.to_string().contains("Malformed artifact"));
    }
}
