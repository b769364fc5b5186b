use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical text form of timestamps in the store and the cleaned artifact.
/// Lexical order equals time order, so the `date` index serves range queries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}

/// A scalar exactly as it was scraped: text, number or boolean. Numbers keep
/// their JSON form, so `4` stays an integer through the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }
}

/// One review card as the extractor saw it. Nothing is guaranteed present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub source_review_id: Option<String>,
    #[serde(default)]
    pub rating: Option<RawValue>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub reviewer_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub is_verified: Option<RawValue>,
}

impl RawReview {
    /// True when not a single field could be read from the card.
    pub fn is_empty(&self) -> bool {
        fn blank(s: &Option<String>) -> bool {
            s.as_deref().map_or(true, |v| v.trim().is_empty())
        }
        blank(&self.source_review_id)
            && self.rating.is_none()
            && blank(&self.title)
            && blank(&self.body)
            && blank(&self.reviewer_name)
            && blank(&self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedReview {
    pub review_id: String,
    pub rating: u8,
    pub title: String,
    pub body: String,
    pub reviewer_name: String,
    #[serde(with = "canonical_ts")]
    pub date: DateTime<Utc>,
    pub is_verified: bool,
}

/// A row of the `reviews` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReview {
    pub id: i64,
    pub review_id: String,
    pub rating: u8,
    pub title: String,
    pub body: Option<String>,
    pub reviewer_name: String,
    pub date: String,
    pub is_verified: bool,
    pub created_at: String,
}

mod canonical_ts {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
