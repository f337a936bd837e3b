use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::core::message::Reference;
use crate::retrieval::arxiv::clean_title;
use crate::retrieval::extractor::{ContentExtractor, ExtractDepth, NotExtractable};
use crate::retrieval::search::{SearchHit, SearchProvider};
use crate::utils::url::is_arxiv_link;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub max_results: usize,
    /// Upper bound on sources fetched at the same time.
    pub concurrency: usize,
    /// Budget for one source (fetch plus extraction).
    pub timeout: Duration,
    pub depth: ExtractDepth,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            concurrency: 4,
            timeout: Duration::from_secs(15),
            depth: ExtractDepth::Summary,
        }
    }
}

/// Turns a query into references: search, then extract each candidate with
/// bounded parallelism, keeping candidate rank order.
#[derive(Clone)]
pub struct ReferenceFetcher {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ContentExtractor>,
    options: FetchOptions,
}

impl ReferenceFetcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ContentExtractor>,
        options: FetchOptions,
    ) -> Self {
        Self {
            search,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Never fails: provider errors and per-source failures only shrink the
    /// result, down to an empty list.
    pub async fn fetch(&self, query: &str) -> Vec<Reference> {
        let start_time = Instant::now();
        if self.options.max_results == 0 {
            return Vec::new();
        }

        let hits = match self.search.search(query).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(query = %query, error = %err, "Web search failed");
                return Vec::new();
            }
        };

        let candidates = usable_candidates(hits);
        let candidate_count = candidates.len();
        let references = self.extract_all(candidates).await;

        info!(
            query = %query,
            candidates = candidate_count,
            references = references.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "References fetched"
        );
        references
    }

    async fn extract_all(&self, candidates: Vec<SearchHit>) -> Vec<Reference> {
        let extractor = self.extractor.as_ref();
        let depth = self.options.depth;
        let budget = self.options.timeout;

        // `buffered` yields in input order, so rank survives concurrent fetches.
        let mut outcomes = stream::iter(candidates)
            .map(|hit| async move {
                let outcome = match tokio::time::timeout(budget, extractor.extract(&hit.link, depth))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(NotExtractable::Timeout {
                        url: hit.link.clone(),
                    }),
                };
                (hit, outcome)
            })
            .buffered(self.options.concurrency.max(1));

        let mut references = Vec::new();
        while let Some((hit, outcome)) = outcomes.next().await {
            match outcome {
                Ok(content) if !content.trim().is_empty() => {
                    references.push(into_reference(hit, content));
                    if references.len() >= self.options.max_results {
                        // Dropping the stream abandons fetches still in flight.
                        break;
                    }
                }
                Ok(_) => debug!(url = %hit.link, "Source produced no text"),
                Err(err) if err.is_soft() => debug!(error = %err, "Source skipped"),
                Err(err) => warn!(error = %err, "Source skipped"),
            }
        }
        references
    }
}

/// Candidates up to (not including) the terminator, without empty or
/// repeated links.
fn usable_candidates(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .take_while(|hit| !hit.is_terminator())
        .filter(|hit| !hit.link.trim().is_empty())
        .filter(|hit| seen.insert(hit.link.clone()))
        .collect()
}

fn into_reference(hit: SearchHit, content: String) -> Reference {
    let title = if is_arxiv_link(&hit.link) {
        clean_title(&hit.title)
    } else {
        hit.title.trim().to_string()
    };
    Reference {
        title,
        link: hit.link,
        content: content.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::search::SearchError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedSearch(Result<Vec<SearchHit>, u16>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
            self.0.clone().map_err(SearchError::Status)
        }
    }

    /// Succeeds for every link except those listed as failing; records calls.
    #[derive(Default)]
    struct ScriptedExtractor {
        failing: Vec<String>,
        slow: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentExtractor for ScriptedExtractor {
        async fn extract(&self, url: &str, _depth: ExtractDepth) -> Result<String, NotExtractable> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.slow.iter().any(|slow| slow == url) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.failing.iter().any(|failing| failing == url) {
                return Err(NotExtractable::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok(format!("text of {url}"))
        }
    }

    fn hits(links: &[&str]) -> Vec<SearchHit> {
        links
            .iter()
            .map(|link| SearchHit::new(format!("title {link}"), *link))
            .collect()
    }

    fn fetcher(
        search: FixedSearch,
        extractor: Arc<ScriptedExtractor>,
        max_results: usize,
    ) -> ReferenceFetcher {
        ReferenceFetcher::new(
            Arc::new(search),
            extractor,
            FetchOptions {
                max_results,
                concurrency: 2,
                timeout: Duration::from_millis(200),
                depth: ExtractDepth::Summary,
            },
        )
    }

    fn links(references: &[Reference]) -> Vec<&str> {
        references.iter().map(|r| r.link.as_str()).collect()
    }

    #[tokio::test]
    async fn failed_sources_are_skipped_in_rank_order() {
        let extractor = Arc::new(ScriptedExtractor {
            failing: vec!["https://2".into(), "https://4".into()],
            ..Default::default()
        });
        let fetcher = fetcher(
            FixedSearch(Ok(hits(&[
                "https://1",
                "https://2",
                "https://3",
                "https://4",
                "https://5",
            ]))),
            extractor,
            5,
        );

        let references = fetcher.fetch("query").await;
        assert_eq!(links(&references), vec!["https://1", "https://3", "https://5"]);
        assert_eq!(references[0].content, "text of https://1");
        assert_eq!(references[0].title, "title https://1");
    }

    #[tokio::test]
    async fn terminator_stops_before_later_candidates_are_fetched() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let mut candidates = hits(&["https://1", "https://2"]);
        candidates.push(SearchHit::new("EOF", "https://3"));
        candidates.extend(hits(&["https://4", "https://5"]));
        let fetcher = fetcher(FixedSearch(Ok(candidates)), extractor.clone(), 5);

        let references = fetcher.fetch("query").await;
        assert_eq!(links(&references), vec!["https://1", "https://2"]);

        let mut calls = extractor.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["https://1", "https://2"]);
    }

    #[tokio::test]
    async fn duplicate_links_are_fetched_once() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let fetcher = fetcher(
            FixedSearch(Ok(hits(&["https://a", "https://b", "https://a", ""]))),
            extractor.clone(),
            5,
        );

        let references = fetcher.fetch("query").await;
        assert_eq!(links(&references), vec!["https://a", "https://b"]);
        assert_eq!(extractor.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn result_is_capped_at_max_results() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let fetcher = fetcher(
            FixedSearch(Ok(hits(&["https://1", "https://2", "https://3", "https://4"]))),
            extractor,
            2,
        );

        let references = fetcher.fetch("query").await;
        assert_eq!(links(&references), vec!["https://1", "https://2"]);
    }

    #[tokio::test]
    async fn slow_sources_time_out_without_sinking_the_batch() {
        let extractor = Arc::new(ScriptedExtractor {
            slow: vec!["https://slow".into()],
            ..Default::default()
        });
        let fetcher = fetcher(
            FixedSearch(Ok(hits(&["https://slow", "https://fast"]))),
            extractor,
            5,
        );

        let references = fetcher.fetch("query").await;
        assert_eq!(links(&references), vec!["https://fast"]);
    }

    #[tokio::test]
    async fn provider_failure_yields_no_references() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let fetcher = fetcher(FixedSearch(Err(502)), extractor.clone(), 5);

        assert!(fetcher.fetch("query").await.is_empty());
        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_source_failing_is_not_an_error() {
        let extractor = Arc::new(ScriptedExtractor {
            failing: vec!["https://1".into()],
            ..Default::default()
        });
        let fetcher = fetcher(FixedSearch(Ok(hits(&["https://1"]))), extractor, 5);
        assert!(fetcher.fetch("query").await.is_empty());
    }

    #[test]
    fn arxiv_titles_lose_their_identifier() {
        let reference = into_reference(
            SearchHit::new("[2401.01234] Meta Reward Models", "https://arxiv.org/abs/2401.01234"),
            " abstract ".to_string(),
        );
        assert_eq!(reference.title, "Meta Reward Models");
        assert_eq!(reference.content, "abstract");
    }
}
