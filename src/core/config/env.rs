//! Credentials come from the environment only and are never persisted.

use crate::core::config::data::Config;

pub const API_KEY_ENV: &str = "REFCHAT_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "REFCHAT_BASE_URL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
}

impl Config {
    pub fn resolve_credentials(&self) -> Credentials {
        self.resolve_credentials_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn resolve_credentials_with<F>(&self, lookup: F) -> Credentials
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = non_empty(API_KEY_ENV)
            .or_else(|| non_empty(FALLBACK_API_KEY_ENV))
            .unwrap_or_default();
        let base_url = non_empty(BASE_URL_ENV).unwrap_or_else(|| self.base_url().to_string());

        Credentials { api_key, base_url }
    }
}
