use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::core::assembler::{ContextSettings, GenerationParams};
use crate::core::config::data::Config;
use crate::retrieval::{ExtractDepth, FetchOptions};

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_TEXT_MODEL: &str = "deepseek-ai/DeepSeek-R1";
pub const DEFAULT_VISION_MODEL: &str = "Qwen/Qwen2.5-VL-72B-Instruct";
pub const DEFAULT_NAMING_MODEL: &str = "deepseek-ai/DeepSeek-V3";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_VISION_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_TOP_P: f32 = 0.95;

pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 5;
pub const DEFAULT_SEARCH_CONCURRENCY: usize = 4;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_EXCERPT_CHARS: usize = 4096;

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "refchat", "refchat")
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn text_model(&self) -> &str {
        self.text_model.as_deref().unwrap_or(DEFAULT_TEXT_MODEL)
    }

    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or(DEFAULT_VISION_MODEL)
    }

    pub fn naming_model(&self) -> &str {
        self.naming_model.as_deref().unwrap_or(DEFAULT_NAMING_MODEL)
    }

    pub fn search_enabled(&self) -> bool {
        self.search.enabled.unwrap_or(false)
    }

    pub fn generate_keywords(&self) -> bool {
        self.search.generate_keywords.unwrap_or(true)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: self.top_p.unwrap_or(DEFAULT_TOP_P),
        }
    }

    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            text_model: self.text_model().to_string(),
            vision_model: self.vision_model().to_string(),
            vision_max_tokens: self.vision_max_tokens.unwrap_or(DEFAULT_VISION_MAX_TOKENS),
            excerpt_chars: self.search.excerpt_chars.unwrap_or(DEFAULT_EXCERPT_CHARS),
            params: self.generation_params(),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_results: self
                .search
                .max_results
                .unwrap_or(DEFAULT_SEARCH_MAX_RESULTS),
            concurrency: self
                .search
                .concurrency
                .unwrap_or(DEFAULT_SEARCH_CONCURRENCY)
                .max(1),
            timeout: Duration::from_secs(
                self.search
                    .timeout_secs
                    .unwrap_or(DEFAULT_SEARCH_TIMEOUT_SECS),
            ),
            depth: if self.search.arxiv_full_text.unwrap_or(false) {
                ExtractDepth::FullText
            } else {
                ExtractDepth::Summary
            },
        }
    }

    /// Conversation directory: configured path, else the platform data dir,
    /// else `./ChatHistory`.
    pub fn history_dir(&self) -> PathBuf {
        if let Some(dir) = &self.history_dir {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("history"))
            .unwrap_or_else(|| PathBuf::from("ChatHistory"))
    }
}
