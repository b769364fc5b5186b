use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::models::{RawReview, RawValue};
use crate::utils::non_empty;

static REVIEW_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/reviews/"]"#).unwrap());
static RATING_ATTR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-service-review-rating]").unwrap());
static STAR_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"img[src*="stars-"]"#).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").unwrap());
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-service-review-text-typography="true"]"#).unwrap());
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static NAMES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"[data-consumer-name-typography="true"]"#,
        r#"a[name="consumer-profile"]"#,
        "span[data-consumer-name]",
        r#"a[href*="/users/"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});
static TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time").unwrap());

static STARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"stars-(\d)").unwrap());
static RATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rated\s+(\d+(?:\.\d+)?)\s+out of").unwrap());
static META_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Date of experience|Updated|Replied)").unwrap());
static UNVERIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(unverified|not verified)\b").unwrap());
static VERIFIED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bverified\b").unwrap());

/// Fallback bodies shorter than this are labels, not review text.
const MIN_FALLBACK_BODY: usize = 20;

/// Read one review card. Missing elements leave the field `None`.
pub fn parse_card(card: ElementRef<'_>) -> RawReview {
    RawReview {
        source_review_id: review_id(card),
        rating: rating(card),
        title: card.select(&TITLE).next().and_then(|e| non_empty(&text_of(e))),
        body: body(card),
        reviewer_name: reviewer_name(card),
        date: card
            .select(&TIME)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .and_then(non_empty),
        is_verified: verification(card),
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Permalink segment (`/reviews/<id>`) first, then the card's own `id` attribute.
fn review_id(card: ElementRef<'_>) -> Option<String> {
    card.select(&REVIEW_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| href.split("/reviews/").nth(1))
        .filter_map(|rest| rest.split(['?', '#', '/']).next())
        .find_map(non_empty)
        .or_else(|| card.value().attr("id").and_then(non_empty))
}

fn rating(card: ElementRef<'_>) -> Option<RawValue> {
    if let Some(v) = card
        .select(&RATING_ATTR)
        .next()
        .and_then(|e| e.value().attr("data-service-review-rating"))
        .and_then(non_empty)
    {
        return Some(RawValue::Text(v));
    }

    let img = card.select(&STAR_IMG).next()?;
    let from_src = img
        .value()
        .attr("src")
        .and_then(|src| STARS_RE.captures(src))
        .map(|c| c[1].to_string());
    let from_alt = || {
        img.value()
            .attr("alt")
            .and_then(|alt| RATED_RE.captures(alt))
            .map(|c| c[1].to_string())
    };
    from_src.or_else(from_alt).map(RawValue::Text)
}

fn body(card: ElementRef<'_>) -> Option<String> {
    if let Some(el) = card.select(&BODY).next() {
        return non_empty(&text_of(el));
    }
    card.select(&PARAGRAPH)
        .filter_map(|p| non_empty(&text_of(p)))
        .find(|t| t.chars().count() > MIN_FALLBACK_BODY && !META_LINE_RE.is_match(t))
}

fn reviewer_name(card: ElementRef<'_>) -> Option<String> {
    NAMES
        .iter()
        .find_map(|sel| card.select(sel).next())
        .and_then(|e| non_empty(&text_of(e)))
}

/// `None` when the card carries no verification label at all.
fn verification(card: ElementRef<'_>) -> Option<RawValue> {
    let text = text_of(card);
    if UNVERIFIED_RE.is_match(&text) {
        Some(RawValue::Bool(false))
    } else if VERIFIED_RE.is_match(&text) {
        Some(RawValue::Bool(true))
    } else {
        None
    }
}
