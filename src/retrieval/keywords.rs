use tracing::{debug, warn};

use crate::core::completion::Completer;

pub const KEYWORD_SYSTEM_PROMPT: &str = "You are a search keyword assistant. Given the user's input, output the three most relevant search keywords separated by commas, and nothing else.";
pub const KEYWORD_TEMPERATURE: f32 = 0.6;

/// Rewrite a chat prompt into a search query. Falls back to the prompt itself
/// when the helper call fails or answers with nothing.
pub async fn search_query(completer: &dyn Completer, model: &str, prompt: &str) -> String {
    let prompt = prompt.trim();
    match completer
        .complete(model, KEYWORD_SYSTEM_PROMPT, prompt, KEYWORD_TEMPERATURE)
        .await
    {
        Ok(keywords) => {
            let keywords = normalize_keywords(&keywords);
            if keywords.is_empty() {
                prompt.to_string()
            } else {
                debug!(keywords = %keywords, "Search keywords generated");
                keywords
            }
        }
        Err(err) => {
            warn!(error = %err, "Keyword generation failed; searching with the raw prompt");
            prompt.to_string()
        }
    }
}

/// Models answer with full-width commas, numbering or a trailing period;
/// reduce that to `a, b, c`.
fn normalize_keywords(raw: &str) -> String {
    raw.replace(['，', '、', '\n'], ",")
        .split(',')
        .map(|keyword| {
            strip_numbering(keyword.trim())
                .trim_end_matches(['.', '。'])
                .trim_matches('"')
                .trim()
        })
        .filter(|keyword| !keyword.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `1. foo` / `2) bar` → `foo` / `bar`; `2024 elections` is left alone.
fn strip_numbering(keyword: &str) -> &str {
    let digits = keyword.len() - keyword.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return keyword;
    }
    match keyword[digits..].strip_prefix(['.', ')']) {
        Some(rest) => rest.trim_start(),
        None => keyword,
    }
}
