//! `search` command: run retrieval alone and print what would be attached.

use std::error::Error;
use std::sync::Arc;

use crate::core::config::Config;
use crate::retrieval::{DuckDuckGoSearch, ReferenceFetcher, WebExtractor};

const PREVIEW_CHARS: usize = 300;

pub async fn run_search(config: Config, query: String) -> Result<(), Box<dyn Error>> {
    let options = config.fetch_options();
    let fetcher = ReferenceFetcher::new(
        Arc::new(DuckDuckGoSearch::new(options.timeout)?),
        Arc::new(WebExtractor::new(options.timeout)?),
        options,
    );

    eprintln!("🔎 Searching: {query}");
    let references = fetcher.fetch(&query).await;
    if references.is_empty() {
        println!("No usable references found.");
        return Ok(());
    }

    for (index, reference) in references.iter().enumerate() {
        println!("{}. {}", index + 1, reference.title);
        println!("   {}", reference.link);
        println!("   {}", preview(&reference.content, PREVIEW_CHARS));
        println!();
    }
    Ok(())
}

/// First `max_chars` characters on one line, with an ellipsis when cut.
fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_cuts() {
        assert_eq!(preview("a\n\n b  c", 10), "a b c");
        assert_eq!(preview("αβγδε", 3), "αβγ…");
    }
}
