#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
use async_trait::async_trait;

#[cfg(test)]
use crate::core::assembler::{ContextSettings, GenerationParams};
#[cfg(test)]
use crate::core::completion::{Completer, CompletionError};
#[cfg(test)]
use crate::core::message::Reference;

#[cfg(test)]
pub fn context_settings() -> ContextSettings {
    ContextSettings {
        text_model: "text-model".to_string(),
        vision_model: "vision-model".to_string(),
        vision_max_tokens: 4096,
        excerpt_chars: 4096,
        params: GenerationParams {
            max_tokens: 8192,
            temperature: 0.6,
            top_p: 0.95,
        },
    }
}

#[cfg(test)]
pub fn reference(title: &str, link: &str, content: &str) -> Reference {
    Reference {
        title: title.to_string(),
        link: link.to_string(),
        content: content.to_string(),
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCall {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Completer double: answers every call with the same reply (or fails) and
/// records what it was asked.
#[cfg(test)]
pub struct FakeCompleter {
    reply: Option<String>,
    calls: Mutex<Vec<CompletionCall>>,
}

#[cfg(test)]
impl FakeCompleter {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Completer for FakeCompleter {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(CompletionCall {
            model: model.to_string(),
            system: system.to_string(),
            user: user.to_string(),
            temperature,
        });
        self.reply
            .clone()
            .ok_or_else(|| CompletionError::Transport("connection refused".to_string()))
    }
}
