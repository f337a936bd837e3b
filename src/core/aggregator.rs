//! Turns the delta stream of one model call into an answer and a reasoning
//! trace, and into exactly one assistant [`Message`] once the call ends.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::chat_stream::{StreamDelta, StreamMessage};
use crate::core::message::Message;

/// Appended to the partial answer while the stream is still running.
pub const CURSOR_MARKER: &str = "▌";

/// Content of the assistant message recorded for a failed call.
pub const FAILURE_SENTINEL: &str = "Response Failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub answer_so_far: String,
    pub reasoning_so_far: String,
    pub phase: StreamPhase,
    pub error: Option<String>,
}

/// Incremental views for a consumer rendering progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamView {
    /// Answer so far followed by [`CURSOR_MARKER`].
    Answer(String),
    /// Reasoning so far.
    Reasoning(String),
}

#[derive(Debug, Default)]
pub struct StreamAggregator {
    state: StreamState,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state.phase, StreamPhase::Completed | StreamPhase::Failed)
    }

    pub fn begin(&mut self) {
        self.state = StreamState {
            phase: StreamPhase::Streaming,
            ..StreamState::default()
        };
    }

    /// Feed one message from the transport. Messages arriving after a
    /// terminal state are ignored.
    pub fn apply(&mut self, message: StreamMessage) -> Vec<StreamView> {
        if self.is_terminal() {
            return Vec::new();
        }
        if self.state.phase == StreamPhase::Idle {
            self.begin();
        }

        match message {
            StreamMessage::Delta(delta) => self.apply_delta(delta),
            StreamMessage::Error(error) => {
                self.fail(error);
                Vec::new()
            }
            StreamMessage::End => {
                self.state.phase = StreamPhase::Completed;
                Vec::new()
            }
        }
    }

    fn apply_delta(&mut self, delta: StreamDelta) -> Vec<StreamView> {
        let mut views = Vec::new();
        if let Some(reasoning) = delta.reasoning {
            self.state.reasoning_so_far.push_str(&reasoning);
            views.push(StreamView::Reasoning(self.state.reasoning_so_far.clone()));
        }
        if let Some(answer) = delta.answer {
            self.state.answer_so_far.push_str(&answer);
            views.push(StreamView::Answer(format!(
                "{}{CURSOR_MARKER}",
                self.state.answer_so_far
            )));
        }
        views
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.state.phase = StreamPhase::Failed;
        self.state.error = Some(error.into());
    }

    /// The assistant message for a terminal state; `None` while the call is
    /// still running.
    pub fn into_message(self) -> Option<Message> {
        match self.state.phase {
            StreamPhase::Completed => Some(Message::assistant(
                self.state.answer_so_far.trim(),
                self.state.reasoning_so_far.trim(),
            )),
            StreamPhase::Failed => Some(Message::assistant(
                FAILURE_SENTINEL,
                format!("Error: {}", self.state.error.unwrap_or_default()),
            )),
            StreamPhase::Idle | StreamPhase::Streaming => None,
        }
    }
}

/// How one model call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(Message),
    Failed(Message),
    /// Abandoned before reaching a terminal state; nothing is recorded.
    Cancelled,
}

impl TurnOutcome {
    pub fn message(&self) -> Option<&Message> {
        match self {
            TurnOutcome::Completed(message) | TurnOutcome::Failed(message) => Some(message),
            TurnOutcome::Cancelled => None,
        }
    }

    pub fn into_message(self) -> Option<Message> {
        match self {
            TurnOutcome::Completed(message) | TurnOutcome::Failed(message) => Some(message),
            TurnOutcome::Cancelled => None,
        }
    }
}

/// Drain `rx` for `stream_id` until the call ends or `cancel` fires.
///
/// Messages tagged with another id belong to an abandoned call and are
/// skipped. A channel that closes early counts as a failed call.
pub async fn aggregate(
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    stream_id: u64,
    cancel: &CancellationToken,
    mut on_view: impl FnMut(StreamView),
) -> TurnOutcome {
    let mut aggregator = StreamAggregator::new();
    aggregator.begin();

    while !aggregator.is_terminal() {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(stream_id, "Stream abandoned before completion");
                return TurnOutcome::Cancelled;
            }
            received = rx.recv() => received,
        };

        match received {
            Some((message, id)) if id == stream_id => {
                for view in aggregator.apply(message) {
                    on_view(view);
                }
            }
            Some((_, stale_id)) => {
                debug!(stream_id, stale_id, "Dropping message from stale stream");
            }
            None => {
                warn!(stream_id, "Stream channel closed before the call ended");
                aggregator.fail("stream closed unexpectedly");
            }
        }
    }

    match aggregator.phase() {
        StreamPhase::Failed => aggregator
            .into_message()
            .map(TurnOutcome::Failed)
            .unwrap_or(TurnOutcome::Cancelled),
        _ => aggregator
            .into_message()
            .map(TurnOutcome::Completed)
            .unwrap_or(TurnOutcome::Cancelled),
    }
}
