//! One-shot (non-streaming) completions for short helper prompts such as
//! conversation naming and search keyword generation.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{ChatCompletion, ChatMessage, ChatRequest};
use crate::core::chat_stream::format_api_error;
use crate::core::config::defaults::DEFAULT_TOP_P;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

/// Helper prompts only need a short answer.
const HELPER_MAX_TOKENS: u32 = 1024;

#[derive(Debug)]
pub enum CompletionError {
    Transport(String),
    Api { status: u16, message: String },
    Decode(String),
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Transport(message) => write!(f, "Completion request failed: {message}"),
            CompletionError::Api { status, message } => {
                write!(f, "Completion failed with status {status}: {message}")
            }
            CompletionError::Decode(message) => {
                write!(f, "Failed to decode completion response: {message}")
            }
        }
    }
}

impl std::error::Error for CompletionError {}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Send `system` + `user` to `model` and return the reply text.
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, CompletionError>;
}

#[derive(Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage::text("system", system),
                ChatMessage::text("user", user),
            ],
            stream: false,
            max_tokens: HELPER_MAX_TOKENS,
            temperature,
            top_p: DEFAULT_TOP_P,
        };

        let url = construct_api_url(&self.base_url, "chat/completions");
        let http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        let response = add_auth_headers(http_request, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: format_api_error(&error_text),
            });
        }

        let completion = response
            .json::<ChatCompletion>()
            .await
            .map_err(|err| CompletionError::Decode(err.to_string()))?;

        let text = first_choice_text(completion)?;
        debug!(model = %model, chars = text.chars().count(), "Helper completion received");
        Ok(text)
    }
}

fn first_choice_text(completion: ChatCompletion) -> Result<String, CompletionError> {
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| CompletionError::Decode("response has no choices".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_is_used() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Rust, async, tokio"}},{"message":{"content":"other"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(completion).unwrap(), "Rust, async, tokio");
    }

    #[test]
    fn missing_content_is_empty_and_missing_choices_is_an_error() {
        let no_content: ChatCompletion =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(first_choice_text(no_content).unwrap(), "");

        let no_choices: ChatCompletion = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_text(no_choices),
            Err(CompletionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let completer = CompletionClient::new(reqwest::Client::new(), "http://127.0.0.1:9/v1", "");
        let err = completer
            .complete("model", "system", "user", 0.6)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
    }
}
