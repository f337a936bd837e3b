use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::retrieval::arxiv::{self, ArxivClient};
use crate::retrieval::{readability, BROWSER_USER_AGENT};
use crate::utils::url::arxiv_id;

/// How much of a structured document to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractDepth {
    /// Abstract / summary only
    #[default]
    Summary,
    /// The full document body
    FullText,
}

/// Why a source produced no text. Every variant is recoverable: the caller
/// skips the source.
#[derive(Debug)]
pub enum NotExtractable {
    /// Network or transport failure.
    Fetch { url: String, message: String },
    /// Non-success HTTP status.
    Status { url: String, status: u16 },
    /// The per-source time budget ran out.
    Timeout { url: String },
    /// The provider served a verification page instead of content.
    Interstitial { url: String },
    /// The body could not be parsed or decoded.
    Parse { url: String, message: String },
    /// Parsing succeeded but no readable text remained.
    Empty { url: String },
    /// Content type the extractor does not read (images, archives, ...).
    Unsupported { url: String, content_type: String },
}

impl NotExtractable {
    pub(crate) fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotExtractable::Timeout {
                url: url.to_string(),
            }
        } else {
            NotExtractable::Fetch {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Interstitials are expected and are not reported as errors.
    pub fn is_soft(&self) -> bool {
        matches!(self, NotExtractable::Interstitial { .. })
    }
}

impl fmt::Display for NotExtractable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotExtractable::Fetch { url, message } => write!(f, "Failed to fetch {url}: {message}"),
            NotExtractable::Status { url, status } => write!(f, "HTTP {status} fetching {url}"),
            NotExtractable::Timeout { url } => write!(f, "Timed out fetching {url}"),
            NotExtractable::Interstitial { url } => {
                write!(f, "Verification page served for {url}")
            }
            NotExtractable::Parse { url, message } => write!(f, "Failed to parse {url}: {message}"),
            NotExtractable::Empty { url } => write!(f, "No readable text at {url}"),
            NotExtractable::Unsupported { url, content_type } => {
                write!(f, "Unsupported content type '{content_type}' at {url}")
            }
        }
    }
}

impl std::error::Error for NotExtractable {}

/// Turns a link into plain text. Implementations never panic or leak raw
/// transport errors; every failure is a [`NotExtractable`].
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str, depth: ExtractDepth) -> Result<String, NotExtractable>;
}

/// Extractor for the open web: arXiv links go through the export API,
/// PDFs through the PDF text extractor, everything else through
/// [`readability`].
#[derive(Clone)]
pub struct WebExtractor {
    client: reqwest::Client,
    arxiv: ArxivClient,
}

impl WebExtractor {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            arxiv: ArxivClient::new(client.clone()),
            client,
        }
    }

    async fn extract_page(&self, url: &str) -> Result<String, NotExtractable> {
        let start_time = Instant::now();
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/pdf;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|err| NotExtractable::from_transport(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotExtractable::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("application/pdf") {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| NotExtractable::from_transport(url, err))?;
            return arxiv::pdf_text(url, bytes.to_vec()).await;
        }

        let is_html = content_type.is_empty()
            || content_type.contains("html")
            || content_type.contains("xml");
        let is_text = content_type.starts_with("text/");
        if !is_html && !is_text {
            return Err(NotExtractable::Unsupported {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| NotExtractable::from_transport(url, err))?;

        if readability::is_interstitial(&body) {
            return Err(NotExtractable::Interstitial {
                url: url.to_string(),
            });
        }

        let text = if is_html {
            extract_html(url, body).await?
        } else {
            readability::clean_text(&body)
        };

        if text.is_empty() {
            return Err(NotExtractable::Empty {
                url: url.to_string(),
            });
        }

        debug!(
            url = %url,
            chars = text.chars().count(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Page extracted"
        );
        Ok(text)
    }
}

/// HTML parsing is CPU-bound and runs on the blocking pool; a parser panic
/// surfaces as a join error and becomes [`NotExtractable::Parse`].
async fn extract_html(url: &str, html: String) -> Result<String, NotExtractable> {
    match tokio::task::spawn_blocking(move || readability::extract_main_text(&html)).await {
        Ok(Some(text)) => Ok(text),
        Ok(None) => Err(NotExtractable::Empty {
            url: url.to_string(),
        }),
        Err(err) => Err(NotExtractable::Parse {
            url: url.to_string(),
            message: err.to_string(),
        }),
    }
}

#[async_trait]
impl ContentExtractor for WebExtractor {
    async fn extract(&self, url: &str, depth: ExtractDepth) -> Result<String, NotExtractable> {
        match arxiv_id(url) {
            Some(id) => self.arxiv.fetch_text(&id, depth).await,
            None => self.extract_page(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_interstitials_are_soft_failures() {
        let soft = NotExtractable::Interstitial {
            url: "https://example.com".to_string(),
        };
        let hard = NotExtractable::Status {
            url: "https://example.com".to_string(),
            status: 403,
        };
        assert!(soft.is_soft());
        assert!(!hard.is_soft());
        assert_eq!(hard.to_string(), "HTTP 403 fetching https://example.com");
    }

    #[tokio::test]
    async fn unreachable_hosts_become_fetch_failures() {
        let extractor = WebExtractor::new(Duration::from_secs(2)).unwrap();
        let err = extractor
            .extract("http://127.0.0.1:9/article", ExtractDepth::Summary)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotExtractable::Fetch { .. } | NotExtractable::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn invalid_urls_are_not_extractable() {
        let extractor = WebExtractor::new(Duration::from_secs(2)).unwrap();
        let err = extractor
            .extract("not a url", ExtractDepth::Summary)
            .await
            .unwrap_err();
        assert!(matches!(err, NotExtractable::Fetch { .. }));
    }

    #[tokio::test]
    async fn html_extraction_runs_off_the_runtime() {
        let html = "<html><body><p>Hello from the blocking pool</p></body></html>".to_string();
        let text = extract_html("https://example.com", html).await.unwrap();
        assert_eq!(text, "Hello from the blocking pool");
    }
}
