use crate::core::config::data::{path_display, Config};

fn show<T: std::fmt::Display>(value: &Option<T>, fallback: impl std::fmt::Display) -> String {
    match value {
        Some(value) => value.to_string(),
        None => format!("{fallback} (default)"),
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

impl Config {
    pub fn print_all(&self) {
        let params = self.generation_params();
        let fetch = self.fetch_options();

        println!("Current configuration:");
        println!("  base-url: {}", show(&self.base_url, self.base_url()));
        println!("  text-model: {}", show(&self.text_model, self.text_model()));
        println!(
            "  vision-model: {}",
            show(&self.vision_model, self.vision_model())
        );
        println!(
            "  naming-model: {}",
            show(&self.naming_model, self.naming_model())
        );
        println!("  max-tokens: {}", show(&self.max_tokens, params.max_tokens));
        println!(
            "  vision-max-tokens: {}",
            show(
                &self.vision_max_tokens,
                self.context_settings().vision_max_tokens
            )
        );
        println!(
            "  temperature: {}",
            show(&self.temperature, params.temperature)
        );
        println!("  top-p: {}", show(&self.top_p, params.top_p));
        println!("  history-dir: {}", path_display(self.history_dir()));
        println!("  search: {}", on_off(self.search_enabled()));
        println!(
            "  search-max-results: {}",
            show(&self.search.max_results, fetch.max_results)
        );
        println!(
            "  search-concurrency: {}",
            show(&self.search.concurrency, fetch.concurrency)
        );
        println!(
            "  search-timeout-secs: {}",
            show(&self.search.timeout_secs, fetch.timeout.as_secs())
        );
        println!(
            "  search-excerpt-chars: {}",
            show(
                &self.search.excerpt_chars,
                self.context_settings().excerpt_chars
            )
        );
        println!(
            "  arxiv-full-text: {}",
            on_off(self.search.arxiv_full_text.unwrap_or(false))
        );
        println!("  search-keywords: {}", on_off(self.generate_keywords()));
    }
}
