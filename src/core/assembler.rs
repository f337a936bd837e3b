//! Builds the chat-completions request for a turn.
//!
//! The latest message alone decides the route: an attached image sends the
//! whole conversation to the vision model as typed block lists, otherwise the
//! text model receives one flattened string per message with retrieved
//! references placed ahead of the user's own words.

use crate::api::{ChatMessage, ChatRequest, WireBlock, WireContent, WireImageUrl};
use crate::core::message::{ContentBlock, Message, Reference};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub text_model: String,
    pub vision_model: String,
    /// Ceiling for vision calls, applied regardless of `params.max_tokens`.
    pub vision_max_tokens: u32,
    /// Per-reference excerpt cap, in characters.
    pub excerpt_chars: usize,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRoute {
    Text,
    Vision,
}

pub const REFERENCE_HEADING: &str = "[Reference material]";
pub const ORIGINAL_INPUT_HEADING: &str = "[Original input]";

/// Only the message being answered is inspected; history is not rescanned.
pub fn choose_route(latest: &Message) -> ModelRoute {
    if latest.has_image() {
        ModelRoute::Vision
    } else {
        ModelRoute::Text
    }
}

/// `history` holds the prior turns; `turn` is the message being answered.
pub fn assemble(history: &[Message], turn: &Message, settings: &ContextSettings) -> ChatRequest {
    let route = choose_route(turn);
    let messages = history
        .iter()
        .chain(std::iter::once(turn))
        .map(|message| match route {
            ModelRoute::Vision => vision_message(message),
            ModelRoute::Text => text_message(message, settings.excerpt_chars),
        })
        .collect();

    let (model, max_tokens) = match route {
        ModelRoute::Vision => (settings.vision_model.clone(), settings.vision_max_tokens),
        ModelRoute::Text => (settings.text_model.clone(), settings.params.max_tokens),
    };

    ChatRequest {
        model,
        messages,
        stream: true,
        max_tokens,
        temperature: settings.params.temperature,
        top_p: settings.params.top_p,
    }
}

fn vision_message(message: &Message) -> ChatMessage {
    let blocks = message
        .blocks()
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(WireBlock::Text { text: text.clone() }),
            ContentBlock::Image(image) => Some(WireBlock::ImageUrl {
                image_url: WireImageUrl {
                    url: image.to_uri(),
                },
            }),
            ContentBlock::References(_) => None,
        })
        .collect();

    ChatMessage {
        role: message.role().as_str().to_string(),
        content: WireContent::Blocks(blocks),
    }
}

fn text_message(message: &Message, excerpt_chars: usize) -> ChatMessage {
    let text = message.text();
    let content = match message.references() {
        Some(references) if !references.is_empty() => format!(
            "{}{ORIGINAL_INPUT_HEADING}\n{text}",
            reference_preamble(references, excerpt_chars)
        ),
        _ => text,
    };
    ChatMessage::text(message.role().as_str(), content)
}

/// Numbered excerpts with their sources under [`REFERENCE_HEADING`].
pub fn reference_preamble(references: &[Reference], excerpt_chars: usize) -> String {
    let mut preamble = format!("\n\n{REFERENCE_HEADING}\n");
    for (index, reference) in references.iter().enumerate() {
        preamble.push_str(&format!(
            "{}. {}\n\nSource: {} ({})\n\n",
            index + 1,
            truncate_chars(&reference.content, excerpt_chars),
            reference.title,
            reference.link
        ));
    }
    preamble
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{ImageSource, UserTurn};
    use crate::utils::test_utils::{context_settings, reference};

    fn image_turn(text: &str) -> Message {
        UserTurn::new(text)
            .with_image(ImageSource::inline("image/png", vec![1, 2, 3]))
            .into_message()
    }

    #[test]
    fn current_image_routes_to_vision_model() {
        let settings = context_settings();
        let history = vec![Message::user_text("hi"), Message::assistant("hello", "")];
        let request = assemble(&history, &image_turn("what is this?"), &settings);

        assert_eq!(request.model, settings.vision_model);
        assert_eq!(request.max_tokens, settings.vision_max_tokens);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(
            serde_json::to_value(&request.messages[2]).unwrap(),
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}},
                    {"type": "text", "text": "what is this?"}
                ]
            })
        );
        assert_eq!(
            serde_json::to_value(&request.messages[1]).unwrap(),
            serde_json::json!({
                "role": "assistant",
                "content": [{"type": "text", "text": "hello"}]
            })
        );
    }

    #[test]
    fn image_only_in_history_routes_to_text_model() {
        let settings = context_settings();
        let history = vec![image_turn("old picture"), Message::assistant("a cat", "")];
        let request = assemble(&history, &Message::user_text("thanks"), &settings);

        assert_eq!(request.model, settings.text_model);
        assert_eq!(request.max_tokens, settings.params.max_tokens);
        assert_eq!(request.messages[0].content.as_text(), Some("old picture"));
        assert_eq!(request.messages[2].content.as_text(), Some("thanks"));
    }

    #[test]
    fn references_precede_original_input() {
        let settings = context_settings();
        let mut turn = Message::user_text("What is GRPO?");
        turn.set_references(vec![
            reference("Paper", "https://arxiv.org/abs/1", "Group relative policy optimization."),
            reference("Blog", "https://example.com/grpo", "A walkthrough."),
        ]);

        let request = assemble(&[], &turn, &settings);
        let content = request.messages[0].content.as_text().unwrap();
        assert_eq!(
            content,
            "\n\n[Reference material]\n\
             1. Group relative policy optimization.\n\nSource: Paper (https://arxiv.org/abs/1)\n\n\
             2. A walkthrough.\n\nSource: Blog (https://example.com/grpo)\n\n\
             [Original input]\nWhat is GRPO?"
        );
    }

    #[test]
    fn vision_payload_drops_references() {
        let settings = context_settings();
        let mut turn = image_turn("look");
        turn.set_references(vec![reference("T", "https://t", "excerpt")]);

        let request = assemble(&[], &turn, &settings);
        let WireContent::Blocks(blocks) = &request.messages[0].content else {
            panic!("vision messages are block lists");
        };
        assert_eq!(blocks.len(), 2);
        assert!(!serde_json::to_string(blocks).unwrap().contains("excerpt"));
    }

    #[test]
    fn excerpts_are_truncated_by_characters() {
        let references = vec![reference("T", "https://t", "αβγδε")];
        let preamble = reference_preamble(&references, 3);
        assert!(preamble.contains("1. αβγ\n\nSource: T (https://t)"));
    }

    #[test]
    fn empty_reference_block_adds_no_preamble() {
        let mut turn = Message::user_text("plain");
        turn.set_references(Vec::new());
        let request = assemble(&[], &turn, &context_settings());
        assert_eq!(request.messages[0].content.as_text(), Some("plain"));
    }

    #[test]
    fn generation_params_pass_through() {
        let settings = context_settings();
        let request = assemble(&[], &Message::user_text("x"), &settings);
        assert_eq!(request.temperature, settings.params.temperature);
        assert_eq!(request.top_p, settings.params.top_p);
        assert!(request.stream);
    }
}
