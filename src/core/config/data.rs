use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retrieval settings, stored as the `[search]` table.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct SearchConfig {
    /// Augment text-only turns with web references
    pub enabled: Option<bool>,
    /// Upper bound on references attached to one turn
    pub max_results: Option<usize>,
    /// Sources fetched in parallel
    pub concurrency: Option<usize>,
    /// Per-source fetch budget in seconds
    pub timeout_secs: Option<u64>,
    /// Characters of each reference included in the prompt
    pub excerpt_chars: Option<usize>,
    /// Fetch whole arXiv papers instead of abstracts
    pub arxiv_full_text: Option<bool>,
    /// Rewrite the prompt into search keywords before searching
    pub generate_keywords: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// OpenAI-compatible endpoint, e.g. "https://api.siliconflow.cn/v1"
    pub base_url: Option<String>,
    /// Model used for text-only turns
    pub text_model: Option<String>,
    /// Model used when the current turn carries an image
    pub vision_model: Option<String>,
    /// Model used for conversation naming and search keywords
    pub naming_model: Option<String>,
    pub max_tokens: Option<u32>,
    /// Fixed ceiling for vision calls, independent of `max_tokens`
    pub vision_max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Directory holding one JSON file per conversation
    pub history_dir: Option<PathBuf>,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
