//! The live chat session: owns the conversation and drives one turn at a
//! time through retrieval, assembly, streaming, aggregation and persistence.

use std::error::Error;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ChatRequest;
use crate::core::aggregator::{aggregate, StreamView, TurnOutcome};
use crate::core::assembler::assemble;
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::completion::{Completer, CompletionClient};
use crate::core::config::env::Credentials;
use crate::core::config::Config;
use crate::core::conversation::{summarize_name, ConversationStore, StoreError};
use crate::core::message::{Message, Reference, UserTurn};
use crate::retrieval::keywords::search_query;
use crate::retrieval::{DuckDuckGoSearch, ReferenceFetcher, WebExtractor};

/// Progress reported while a turn runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    SearchStarted { query: String },
    ReferencesReady(usize),
    /// Answer so far, with the cursor marker.
    Answer(String),
    Reasoning(String),
}

#[derive(Debug)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub references: usize,
    /// The turn is kept in memory even when saving it failed.
    pub persist_error: Option<StoreError>,
}

pub struct ChatSession {
    config: Config,
    credentials: Credentials,
    client: reqwest::Client,
    store: ConversationStore,
    completer: Arc<dyn Completer>,
    fetcher: ReferenceFetcher,
    stream_service: ChatStreamService,
    stream_rx: mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    messages: Vec<Message>,
    name: Option<String>,
    current_stream_id: u64,
}

impl ChatSession {
    pub fn new(config: Config, credentials: Credentials) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::new();
        let options = config.fetch_options();
        let fetcher = ReferenceFetcher::new(
            Arc::new(DuckDuckGoSearch::new(options.timeout)?),
            Arc::new(WebExtractor::new(options.timeout)?),
            options,
        );
        let completer = Arc::new(CompletionClient::new(
            client.clone(),
            credentials.base_url.clone(),
            credentials.api_key.clone(),
        ));
        let store = ConversationStore::new(config.history_dir());
        Ok(Self::with_parts(
            config,
            credentials,
            client,
            store,
            completer,
            fetcher,
        ))
    }

    pub fn with_parts(
        config: Config,
        credentials: Credentials,
        client: reqwest::Client,
        store: ConversationStore,
        completer: Arc<dyn Completer>,
        fetcher: ReferenceFetcher,
    ) -> Self {
        let (stream_service, stream_rx) = ChatStreamService::new();
        Self {
            config,
            credentials,
            client,
            store,
            completer,
            fetcher,
            stream_service,
            stream_rx,
            messages: Vec::new(),
            name: None,
            current_stream_id: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Start a new, unnamed conversation. Output of any stream still in
    /// flight is ignored from here on.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.name = None;
        self.current_stream_id += 1;
    }

    pub fn resume(&mut self, name: &str) -> Result<(), StoreError> {
        let messages = self.store.load(name)?;
        self.reset();
        self.messages = messages;
        self.name = Some(name.to_string());
        info!(name = %name, messages = self.messages.len(), "Conversation resumed");
        Ok(())
    }

    /// Delete a stored conversation; deleting the active one also resets
    /// the session.
    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        self.store.delete(name)?;
        if self.name.as_deref() == Some(name) {
            self.reset();
        }
        Ok(())
    }

    /// Search the web for `prompt` and return the extracted references.
    pub async fn retrieve(
        &self,
        prompt: &str,
        on_event: &mut impl FnMut(TurnEvent),
    ) -> Vec<Reference> {
        let query = if self.config.generate_keywords() {
            search_query(self.completer.as_ref(), self.config.naming_model(), prompt).await
        } else {
            prompt.trim().to_string()
        };
        on_event(TurnEvent::SearchStarted {
            query: query.clone(),
        });

        let references = self.fetcher.fetch(&query).await;
        on_event(TurnEvent::ReferencesReady(references.len()));
        references
    }

    /// Run one turn to its end. Cancelling `cancel` abandons the stream and
    /// leaves the conversation as it was before the turn.
    pub async fn run_turn(
        &mut self,
        turn: UserTurn,
        cancel: CancellationToken,
        mut on_event: impl FnMut(TurnEvent),
    ) -> TurnReport {
        let search = self.config.search_enabled() && !turn.has_images();
        let prompt = turn.text.clone();
        let mut message = turn.into_message();

        let mut references = Vec::new();
        if search {
            references = tokio::select! {
                biased;
                _ = cancel.cancelled() => Vec::new(),
                references = self.retrieve(&prompt, &mut on_event) => references,
            };
            if cancel.is_cancelled() {
                return TurnReport {
                    outcome: TurnOutcome::Cancelled,
                    references: 0,
                    persist_error: None,
                };
            }
        }
        let reference_count = references.len();
        if !references.is_empty() {
            message.set_references(references);
        }

        let (request, stream_id) = self.begin_turn(message);
        self.stream_service.spawn_stream(StreamParams {
            client: self.client.clone(),
            base_url: self.credentials.base_url.clone(),
            api_key: self.credentials.api_key.clone(),
            request,
            cancel_token: cancel.clone(),
            stream_id,
        });

        let outcome = self.await_outcome(stream_id, &cancel, &mut on_event).await;
        let mut report = self.finish_turn(outcome).await;
        report.references = reference_count;
        report
    }

    /// Record the user message and build the request that answers it.
    fn begin_turn(&mut self, message: Message) -> (ChatRequest, u64) {
        let request = assemble(
            &self.messages,
            &message,
            &self.config.context_settings(),
        );
        self.messages.push(message);
        self.current_stream_id += 1;
        debug!(
            stream_id = self.current_stream_id,
            model = %request.model,
            "Turn started"
        );
        (request, self.current_stream_id)
    }

    async fn await_outcome(
        &mut self,
        stream_id: u64,
        cancel: &CancellationToken,
        on_event: &mut impl FnMut(TurnEvent),
    ) -> TurnOutcome {
        aggregate(&mut self.stream_rx, stream_id, cancel, |view| match view {
            StreamView::Answer(text) => on_event(TurnEvent::Answer(text)),
            StreamView::Reasoning(text) => on_event(TurnEvent::Reasoning(text)),
        })
        .await
    }

    /// Append the assistant message (or roll back a cancelled turn), name a
    /// new conversation and save it.
    async fn finish_turn(&mut self, outcome: TurnOutcome) -> TurnReport {
        let Some(message) = outcome.message().cloned() else {
            if self.messages.last().is_some_and(Message::is_user) {
                self.messages.pop();
            }
            debug!("Turn cancelled; conversation left unchanged");
            return TurnReport {
                outcome,
                references: 0,
                persist_error: None,
            };
        };
        self.messages.push(message);

        if self.name.is_none() {
            self.name = Some(self.assign_name().await);
        }

        let persist_error = match &self.name {
            Some(name) => self.store.save(name, &self.messages).err(),
            None => None,
        };
        if let Some(err) = &persist_error {
            warn!(error = %err, "Failed to save conversation");
        }

        TurnReport {
            outcome,
            references: 0,
            persist_error,
        }
    }

    async fn assign_name(&self) -> String {
        let text = self
            .messages
            .iter()
            .find(|message| message.is_user())
            .map(Message::text)
            .unwrap_or_default();
        let base = summarize_name(
            self.completer.as_ref(),
            self.config.naming_model(),
            &text,
            Local::now().naive_local(),
        )
        .await;
        let name = self.store.unique_name(&base);
        info!(name = %name, "Conversation named");
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::FAILURE_SENTINEL;
    use crate::core::chat_stream::StreamDelta;
    use crate::core::message::ContentBlock;
    use crate::retrieval::extractor::{ContentExtractor, ExtractDepth, NotExtractable};
    use crate::retrieval::search::{SearchError, SearchHit, SearchProvider};
    use crate::retrieval::FetchOptions;
    use crate::utils::test_utils::FakeCompleter;
    use crate::core::message::ImageSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct OneHit;

    #[async_trait]
    impl SearchProvider for OneHit {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
            Ok(vec![SearchHit::new("Source", "https://example.com/a")])
        }
    }

    struct EchoExtractor;

    #[async_trait]
    impl ContentExtractor for EchoExtractor {
        async fn extract(&self, url: &str, _depth: ExtractDepth) -> Result<String, NotExtractable> {
            Ok(format!("content of {url}"))
        }
    }

    fn session(dir: &TempDir, completer: FakeCompleter) -> ChatSession {
        let config = Config {
            history_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let credentials = Credentials {
            api_key: String::new(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
        };
        let fetcher = ReferenceFetcher::new(
            Arc::new(OneHit),
            Arc::new(EchoExtractor),
            FetchOptions::default(),
        );
        ChatSession::with_parts(
            config.clone(),
            credentials,
            reqwest::Client::new(),
            ConversationStore::new(dir.path()),
            Arc::new(completer),
            fetcher,
        )
    }

    async fn play(session: &mut ChatSession, text: &str, script: Vec<StreamMessage>) -> TurnReport {
        let (_, stream_id) = session.begin_turn(UserTurn::new(text).into_message());
        for message in script {
            session.stream_service.send_for_test(message, stream_id);
        }
        let cancel = CancellationToken::new();
        let outcome = session.await_outcome(stream_id, &cancel, &mut |_| {}).await;
        session.finish_turn(outcome).await
    }

    #[tokio::test]
    async fn completed_turn_is_named_and_saved() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, FakeCompleter::replying("Greetings"));

        let report = play(
            &mut session,
            "hello",
            vec![
                StreamMessage::Delta(StreamDelta::reasoning("polite")),
                StreamMessage::Delta(StreamDelta::answer("Hi!")),
                StreamMessage::End,
            ],
        )
        .await;

        assert!(matches!(report.outcome, TurnOutcome::Completed(_)));
        assert!(report.persist_error.is_none());
        let name = session.name().unwrap().to_string();
        assert!(name.starts_with("Greetings_"));

        let stored = session.store().load(&name).unwrap();
        assert_eq!(stored, session.messages());
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].text(), "Hi!");
        assert_eq!(stored[1].reasoning(), Some("polite"));
    }

    #[tokio::test]
    async fn name_is_assigned_once() {
        let dir = TempDir::new().unwrap();
        let completer = FakeCompleter::replying("Topic");
        let mut session = session(&dir, completer);

        play(&mut session, "one", vec![StreamMessage::End]).await;
        let first = session.name().unwrap().to_string();
        play(&mut session, "two", vec![StreamMessage::End]).await;

        assert_eq!(session.name(), Some(first.as_str()));
        assert_eq!(session.store().list().unwrap(), vec![first.clone()]);
        assert_eq!(session.store().load(&first).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failed_turn_appends_sentinel() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, FakeCompleter::failing());

        let report = play(
            &mut session,
            "hello",
            vec![
                StreamMessage::Delta(StreamDelta::answer("par")),
                StreamMessage::Error("API Error: overloaded".to_string()),
                StreamMessage::End,
            ],
        )
        .await;

        assert!(matches!(report.outcome, TurnOutcome::Failed(_)));
        assert!(session.name().unwrap().starts_with("Untitled_"));
        let last = session.messages().last().unwrap();
        assert_eq!(last.text(), FAILURE_SENTINEL);
        assert_eq!(last.reasoning(), Some("Error: API Error: overloaded"));
    }

    #[tokio::test]
    async fn cancelled_turn_leaves_conversation_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, FakeCompleter::replying("x"));

        let (_, stream_id) = session.begin_turn(Message::user_text("hello"));
        session
            .stream_service
            .send_for_test(StreamMessage::Delta(StreamDelta::answer("partial")), stream_id);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = session.await_outcome(stream_id, &cancel, &mut |_| {}).await;
        let report = session.finish_turn(outcome).await;

        assert_eq!(report.outcome, TurnOutcome::Cancelled);
        assert!(session.messages().is_empty());
        assert!(session.name().is_none());
        assert!(session.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_the_turn_in_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let mut session = session(&dir, FakeCompleter::replying("t"));
        session.store = ConversationStore::new(&blocker);

        let report = play(&mut session, "hello", vec![StreamMessage::End]).await;

        assert!(matches!(report.persist_error, Some(StoreError::Io { .. })));
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn stale_stream_output_is_ignored_after_reset() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, FakeCompleter::replying("t"));

        let (_, old_id) = session.begin_turn(Message::user_text("old"));
        session.reset();
        session
            .stream_service
            .send_for_test(StreamMessage::Delta(StreamDelta::answer("stale")), old_id);
        session.stream_service.send_for_test(StreamMessage::End, old_id);

        let report = play(
            &mut session,
            "new",
            vec![StreamMessage::Delta(StreamDelta::answer("fresh")), StreamMessage::End],
        )
        .await;
        let message = report.outcome.into_message().unwrap();
        assert_eq!(message.text(), "fresh");
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn resume_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, FakeCompleter::replying("Saved"));
        play(&mut session, "hello", vec![StreamMessage::End]).await;
        let name = session.name().unwrap().to_string();

        session.reset();
        session.resume(&name).unwrap();
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.name(), Some(name.as_str()));

        session.delete(&name).unwrap();
        assert!(session.messages().is_empty());
        assert!(session.name().is_none());
        assert!(matches!(session.resume(&name), Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn retrieval_uses_generated_keywords() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir, FakeCompleter::replying("rust, tokio, select"));

        let mut events = Vec::new();
        let references = session
            .retrieve("how does select work", &mut |event| events.push(event))
            .await;

        assert_eq!(references.len(), 1);
        assert_eq!(references[0].content, "content of https://example.com/a");
        assert_eq!(
            events,
            vec![
                TurnEvent::SearchStarted {
                    query: "rust, tokio, select".to_string()
                },
                TurnEvent::ReferencesReady(1),
            ]
        );
    }

    #[test]
    fn references_reach_the_text_request() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, FakeCompleter::replying("t"));
        let mut message = Message::user_text("question");
        message.set_references(vec![crate::utils::test_utils::reference(
            "Source",
            "https://example.com/a",
            "grounding",
        )]);

        let (request, _) = session.begin_turn(message);
        let content = request.messages[0].content.as_text().unwrap();
        assert!(content.contains("[Reference material]"));
        assert!(content.ends_with("[Original input]\nquestion"));
        assert!(matches!(
            session.messages()[0].blocks().last(),
            Some(ContentBlock::References(_))
        ));
    }

    const SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"checking\"}}]}\n\n\
                            data: {\"choices\":[{\"delta\":{\"content\":\"Grounded answer\"}}]}\n\n\
                            data: [DONE]\n\n";

    /// Search provider that counts how often it is asked.
    struct CountingSearch {
        hits: Vec<SearchHit>,
        calls: AtomicUsize,
    }

    impl CountingSearch {
        fn new(links: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                hits: links
                    .iter()
                    .map(|link| SearchHit::new("Source", *link))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..read]);
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve `body` as an event stream to every request; returns the base URL.
    async fn sse_endpoint(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/v1")
    }

    fn live_session(dir: &TempDir, base_url: String, search: Arc<CountingSearch>) -> ChatSession {
        let mut config = Config {
            history_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        config.search.enabled = Some(true);
        config.search.generate_keywords = Some(false);
        let credentials = Credentials {
            api_key: "test-key".to_string(),
            base_url,
        };
        let fetcher = ReferenceFetcher::new(search, Arc::new(EchoExtractor), FetchOptions::default());
        ChatSession::with_parts(
            config,
            credentials,
            reqwest::Client::builder().no_proxy().build().unwrap(),
            ConversationStore::new(dir.path()),
            Arc::new(FakeCompleter::replying("Grounding")),
            fetcher,
        )
    }

    #[tokio::test]
    async fn text_turn_attaches_and_persists_references() {
        let dir = TempDir::new().unwrap();
        let search = CountingSearch::new(&["https://example.com/a"]);
        let mut session = live_session(&dir, sse_endpoint(SSE_BODY).await, search.clone());

        let mut events = Vec::new();
        let report = session
            .run_turn(
                UserTurn::new("what grounds this?"),
                CancellationToken::new(),
                |event| events.push(event),
            )
            .await;

        assert_eq!(search.calls(), 1);
        assert_eq!(report.references, 1);
        assert!(report.persist_error.is_none());
        let TurnOutcome::Completed(answer) = &report.outcome else {
            panic!("expected completed turn, got {:?}", report.outcome);
        };
        assert_eq!(answer.text(), "Grounded answer");
        assert_eq!(answer.reasoning(), Some("checking"));
        assert!(events.contains(&TurnEvent::ReferencesReady(1)));

        let name = session.name().unwrap().to_string();
        let stored = session.store().load(&name).unwrap();
        assert_eq!(stored.len(), 2);
        let references = stored[0].references().expect("reference block persisted");
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].link, "https://example.com/a");
        assert_eq!(references[0].content, "content of https://example.com/a");
    }

    #[tokio::test]
    async fn empty_search_attaches_no_reference_block() {
        let dir = TempDir::new().unwrap();
        let search = CountingSearch::new(&[]);
        let mut session = live_session(&dir, sse_endpoint(SSE_BODY).await, search.clone());

        let report = session
            .run_turn(UserTurn::new("anything"), CancellationToken::new(), |_| {})
            .await;

        assert_eq!(search.calls(), 1);
        assert_eq!(report.references, 0);
        assert!(matches!(report.outcome, TurnOutcome::Completed(_)));
        assert!(session.messages()[0].references().is_none());
    }

    #[tokio::test]
    async fn image_turn_skips_search() {
        let dir = TempDir::new().unwrap();
        let search = CountingSearch::new(&["https://example.com/a"]);
        let mut session = live_session(&dir, sse_endpoint(SSE_BODY).await, search.clone());

        let turn = UserTurn::new("what is in this picture?")
            .with_image(ImageSource::inline("image/png", vec![1, 2, 3]));
        let mut events = Vec::new();
        let report = session
            .run_turn(turn, CancellationToken::new(), |event| events.push(event))
            .await;

        assert_eq!(search.calls(), 0);
        assert_eq!(report.references, 0);
        assert!(!events
            .iter()
            .any(|event| matches!(event, TurnEvent::SearchStarted { .. })));
        assert!(matches!(report.outcome, TurnOutcome::Completed(_)));
        assert!(session.messages()[0].has_image());
        assert!(session.messages()[0].references().is_none());
    }

    #[tokio::test]
    async fn cancelled_before_retrieval_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let search = CountingSearch::new(&["https://example.com/a"]);
        let mut session = live_session(&dir, sse_endpoint(SSE_BODY).await, search.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = session
            .run_turn(UserTurn::new("never mind"), cancel, |_| {})
            .await;

        assert_eq!(report.outcome, TurnOutcome::Cancelled);
        assert_eq!(report.references, 0);
        assert!(report.persist_error.is_none());
        assert_eq!(search.calls(), 0);
        assert!(session.messages().is_empty());
        assert!(session.name().is_none());
        assert!(session.store().list().unwrap().is_empty());
    }
}
