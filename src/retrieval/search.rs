use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::retrieval::BROWSER_USER_AGENT;

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Title the search provider uses for its end-of-results marker.
const TERMINATOR_TITLE: &str = "EOF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            snippet: String::new(),
        }
    }

    /// Entries after the terminator are never used.
    pub fn is_terminator(&self) -> bool {
        self.title.trim() == TERMINATOR_TITLE
    }
}

#[derive(Debug)]
pub enum SearchError {
    Request(String),
    Status(u16),
    Parse(String),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::Request(message) => write!(f, "Search request failed: {message}"),
            SearchError::Status(status) => write!(f, "Search provider returned HTTP {status}"),
            SearchError::Parse(message) => write!(f, "Failed to parse search results: {message}"),
        }
    }
}

impl std::error::Error for SearchError {}

/// A web search backend returning ranked hits.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}

/// Scrapes the JavaScript-free DuckDuckGo results page.
#[derive(Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DUCKDUCKGO_HTML_URL.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let start_time = Instant::now();
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| SearchError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|err| SearchError::Request(err.to_string()))?;

        let hits = parse_results(&html)?;

        debug!(
            query = %query,
            results = hits.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Web search completed"
        );
        Ok(hits)
    }
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|err| SearchError::Parse(format!("selector {css}: {err}")))
}

/// Parse a DuckDuckGo HTML results page into ranked hits. Ads are skipped.
pub fn parse_results(html: &str) -> Result<Vec<SearchHit>, SearchError> {
    let document = Html::parse_document(html);
    let result_selector = selector(".result")?;
    let title_selector = selector("a.result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut hits = Vec::new();
    for result in document.select(&result_selector) {
        if result
            .value()
            .classes()
            .any(|class| class == "result--ad")
        {
            continue;
        }

        let Some(anchor) = result.select(&title_selector).next() else {
            continue;
        };
        let title = element_text(anchor);
        let link = anchor
            .value()
            .attr("href")
            .map(decode_redirect)
            .unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            continue;
        }

        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();

        hits.push(SearchHit {
            title,
            link,
            snippet,
        });
    }

    Ok(hits)
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result anchors point at `/l/?uddg=<encoded target>`; unwrap to the target.
fn decode_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    match url::Url::parse(&absolute) {
        Ok(parsed) => parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"<html><body>
      <div class="result result--ad">
        <a class="result__a" href="https://ads.example.com">Sponsored</a>
      </div>
      <div class="result results_links">
        <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpost%3Fid%3D1&amp;rut=abc">Example   <b>Post</b></a></h2>
        <a class="result__snippet">A  short summary</a>
      </div>
      <div class="result">
        <a class="result__a" href="https://arxiv.org/abs/2401.01234">[2401.01234] Paper</a>
      </div>
      <div class="result"><span>no anchor here</span></div>
    </body></html>"#;

    #[test]
    fn parses_hits_in_rank_order_and_skips_ads() {
        let hits = parse_results(RESULTS_PAGE).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Example Post");
        assert_eq!(hits[0].link, "https://example.com/post?id=1");
        assert_eq!(hits[0].snippet, "A short summary");
        assert_eq!(hits[1].link, "https://arxiv.org/abs/2401.01234");
        assert!(hits[1].snippet.is_empty());
    }

    #[test]
    fn empty_page_yields_no_hits() {
        assert!(parse_results("<html></html>").unwrap().is_empty());
    }

    #[test]
    fn terminator_is_recognised_by_title() {
        assert!(SearchHit::new(" EOF ", "").is_terminator());
        assert!(!SearchHit::new("EOF handling in Rust", "https://x").is_terminator());
    }

    #[test]
    fn redirect_links_without_target_are_kept() {
        assert_eq!(
            decode_redirect("/l/?kh=-1"),
            "https://duckduckgo.com/l/?kh=-1"
        );
        assert_eq!(decode_redirect("https://a.example"), "https://a.example");
    }
}
