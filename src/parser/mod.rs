pub mod card;

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::models::RawReview;

static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article").unwrap());
static NEXT_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[name="pagination-button-next"]"#).unwrap());
static NEXT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel="next"]"#).unwrap());

/// One listing page, interpreted.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub reviews: Vec<RawReview>,
    /// Cards from which no field at all could be read.
    pub skipped: usize,
    pub has_next: bool,
}

/// HTML page → review cards + has-next signal.
pub fn parse_page(html: &str) -> ParsedPage {
    let doc = Html::parse_document(html);
    let mut page = ParsedPage {
        has_next: has_next_page(&doc),
        ..Default::default()
    };

    for element in doc.select(&CARD) {
        let raw = card::parse_card(element);
        if raw.is_empty() {
            page.skipped += 1;
        } else {
            page.reviews.push(raw);
        }
    }
    page
}

fn has_next_page(doc: &Html) -> bool {
    let button = doc.select(&NEXT_BUTTON).any(|a| {
        let el = a.value();
        el.attr("href").is_some() && el.attr("aria-disabled") != Some("true")
    });
    button || doc.select(&NEXT_LINK).next().is_some()
}
