//! Scripted page sources and HTML builders shared by the async tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::extractor::ExtractOptions;
use crate::fetch::PageSource;

pub type Response = Result<Option<String>, FetchError>;

/// Replays queued responses per page. The last queued response repeats;
/// pages with nothing queued do not exist.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<u32, VecDeque<Response>>>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, page: u32, html: String) -> Self {
        self.respond(page, Ok(Some(html)))
    }

    pub fn respond(self, page: u32, response: Response) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, page: u32) -> Result<Option<String>, FetchError> {
        self.calls.lock().unwrap().push(page);
        let mut pages = self.pages.lock().unwrap();
        match pages.get_mut(&page) {
            None => Ok(None),
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(None)),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(None)),
        }
    }
}

pub fn timeout(page: u32) -> Response {
    Err(FetchError::Timeout {
        url: format!("https://example.com/review/shop.com?page={page}"),
    })
}

pub fn quick_options(max_pages: u32) -> ExtractOptions {
    ExtractOptions {
        max_pages,
        max_duration: None,
        max_retries: 2,
        base_backoff: Duration::ZERO,
        page_delay: Duration::ZERO,
    }
}

/// A review card in the listing's markup.
pub struct Card<'a> {
    pub id: Option<&'a str>,
    pub rating: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub name: &'a str,
    pub date: &'a str,
}

impl<'a> Card<'a> {
    pub fn new(id: &'a str, rating: &'a str, title: &'a str) -> Self {
        Card {
            id: Some(id),
            rating,
            title,
            body: "",
            name: "Sam Reviewer",
            date: "2024-05-01T10:00:00.000Z",
        }
    }

    fn html(&self) -> String {
        let link = match self.id {
            Some(id) => format!(r#"<a href="/reviews/{id}"><h2>{}</h2></a>"#, self.title),
            None => format!("<h2>{}</h2>", self.title),
        };
        let body = if self.body.is_empty() {
            String::new()
        } else {
            format!(r#"<p data-service-review-text-typography="true">{}</p>"#, self.body)
        };
        format!(
            r#"<article>
                 <span data-consumer-name-typography="true">{name}</span>
                 <div data-service-review-rating="{rating}"></div>
                 <time datetime="{date}"></time>
                 {link}
                 {body}
               </article>"#,
            name = self.name,
            rating = self.rating,
            date = self.date,
        )
    }
}

pub fn listing(cards: &[Card<'_>], has_next: bool) -> String {
    let next = if has_next {
        r#"<a name="pagination-button-next" href="?page=next">Next page</a>"#
    } else {
        r#"<a name="pagination-button-next" aria-disabled="true">Next page</a>"#
    };
    let cards: String = cards.iter().map(Card::html).collect();
    format!("<html><body><main>{cards}<nav>{next}</nav></main></body></html>")
}
