//! Retrieval augmentation: turn a query into cleaned reference text.
//!
//! - [`search`] asks an external provider for ranked candidate links.
//! - [`extractor`] turns one link into plain text, routing arXiv links through
//!   [`arxiv`] and everything else through [`readability`].
//! - [`fetcher`] fans candidates out with bounded concurrency and collects
//!   the survivors as [`Reference`](crate::core::message::Reference)s.
//! - [`keywords`] rewrites a chat prompt into a search query.

pub mod arxiv;
pub mod extractor;
pub mod fetcher;
pub mod keywords;
pub mod readability;
pub mod search;

pub use extractor::{ContentExtractor, ExtractDepth, NotExtractable, WebExtractor};
pub use fetcher::{FetchOptions, ReferenceFetcher};
pub use search::{DuckDuckGoSearch, SearchError, SearchHit, SearchProvider};

/// Desktop browser identity; several sources serve an interstitial to
/// anything that looks like a bot.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
