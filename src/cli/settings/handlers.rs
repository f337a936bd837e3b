//! Data-driven handlers: one boolean or value handler per configuration key.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{format_bool, parse_bool, parse_number, success_set};
use crate::cli::settings::SettingHandler;
use crate::core::config::data::Config;

/// Handler for on/off settings.
pub struct BooleanHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    default_display: &'static str,
    set_field: fn(&mut Config, Option<bool>),
}

impl SettingHandler for BooleanHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        if args.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: self.hint,
                example: self.example,
            });
        }

        let input = args.join(" ");
        let value = parse_bool(&input).ok_or(SettingError::InvalidBoolean(input))?;
        (self.set_field)(config, Some(value));
        Ok(success_set(self.key, format_bool(value)))
    }

    fn unset(&self, config: &mut Config) -> String {
        (self.set_field)(config, None);
        format!(
            "✅ Unset {} (will use default: {})",
            self.key, self.default_display
        )
    }
}

/// Handler for free-form and numeric settings. `set_field` parses and
/// validates the joined arguments.
pub struct ValueHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    set_field: fn(&mut Config, &str) -> Result<(), SettingError>,
    clear: fn(&mut Config),
}

impl SettingHandler for ValueHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let value = args.join(" ");
        if value.trim().is_empty() {
            return Err(SettingError::MissingArgs {
                hint: self.hint,
                example: self.example,
            });
        }
        (self.set_field)(config, value.trim())?;
        Ok(success_set(self.key, value.trim()))
    }

    fn unset(&self, config: &mut Config) -> String {
        (self.clear)(config);
        format!("✅ Unset {} (will use default)", self.key)
    }
}

fn in_range(
    key: &'static str,
    input: &str,
    min: f32,
    max: f32,
    expected: &'static str,
) -> Result<f32, SettingError> {
    let value: f32 = parse_number(key, input, expected)?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(SettingError::InvalidValue {
            key,
            input: input.to_string(),
            expected,
        })
    }
}

fn positive<T: std::str::FromStr + PartialOrd + Default>(
    key: &'static str,
    input: &str,
) -> Result<T, SettingError> {
    let value: T = parse_number(key, input, "a positive integer")?;
    if value > T::default() {
        Ok(value)
    } else {
        Err(SettingError::InvalidValue {
            key,
            input: input.to_string(),
            expected: "a positive integer",
        })
    }
}

pub fn all_handlers() -> Vec<Box<dyn SettingHandler>> {
    vec![
        Box::new(ValueHandler {
            key: "base-url",
            hint: "To set the API endpoint, provide its base URL:",
            example: "refchat set base-url https://api.siliconflow.cn/v1",
            set_field: |c, v| {
                c.base_url = Some(v.to_string());
                Ok(())
            },
            clear: |c| c.base_url = None,
        }),
        Box::new(ValueHandler {
            key: "text-model",
            hint: "To set the text model, provide a model id:",
            example: "refchat set text-model deepseek-ai/DeepSeek-R1",
            set_field: |c, v| {
                c.text_model = Some(v.to_string());
                Ok(())
            },
            clear: |c| c.text_model = None,
        }),
        Box::new(ValueHandler {
            key: "vision-model",
            hint: "To set the vision model, provide a model id:",
            example: "refchat set vision-model Qwen/Qwen2.5-VL-72B-Instruct",
            set_field: |c, v| {
                c.vision_model = Some(v.to_string());
                Ok(())
            },
            clear: |c| c.vision_model = None,
        }),
        Box::new(ValueHandler {
            key: "naming-model",
            hint: "To set the model used for naming and search keywords, provide a model id:",
            example: "refchat set naming-model deepseek-ai/DeepSeek-V3",
            set_field: |c, v| {
                c.naming_model = Some(v.to_string());
                Ok(())
            },
            clear: |c| c.naming_model = None,
        }),
        Box::new(ValueHandler {
            key: "max-tokens",
            hint: "To set the answer token limit, provide a number:",
            example: "refchat set max-tokens 8192",
            set_field: |c, v| {
                c.max_tokens = Some(positive("max-tokens", v)?);
                Ok(())
            },
            clear: |c| c.max_tokens = None,
        }),
        Box::new(ValueHandler {
            key: "vision-max-tokens",
            hint: "To set the vision answer token limit, provide a number:",
            example: "refchat set vision-max-tokens 4096",
            set_field: |c, v| {
                c.vision_max_tokens = Some(positive("vision-max-tokens", v)?);
                Ok(())
            },
            clear: |c| c.vision_max_tokens = None,
        }),
        Box::new(ValueHandler {
            key: "temperature",
            hint: "To set the sampling temperature, provide a number between 0 and 2:",
            example: "refchat set temperature 0.6",
            set_field: |c, v| {
                c.temperature = Some(in_range("temperature", v, 0.0, 2.0, "a number between 0 and 2")?);
                Ok(())
            },
            clear: |c| c.temperature = None,
        }),
        Box::new(ValueHandler {
            key: "top-p",
            hint: "To set nucleus sampling, provide a number between 0 and 1:",
            example: "refchat set top-p 0.95",
            set_field: |c, v| {
                c.top_p = Some(in_range("top-p", v, 0.0, 1.0, "a number between 0 and 1")?);
                Ok(())
            },
            clear: |c| c.top_p = None,
        }),
        Box::new(ValueHandler {
            key: "history-dir",
            hint: "To set where conversations are stored, provide a directory:",
            example: "refchat set history-dir ~/ChatHistory",
            set_field: |c, v| {
                c.history_dir = Some(v.into());
                Ok(())
            },
            clear: |c| c.history_dir = None,
        }),
        Box::new(BooleanHandler {
            key: "search",
            hint: "To toggle web references for text turns, specify on or off:",
            example: "refchat set search on",
            default_display: "off",
            set_field: |c, v| c.search.enabled = v,
        }),
        Box::new(ValueHandler {
            key: "search-max-results",
            hint: "To set how many references a turn may use, provide a number:",
            example: "refchat set search-max-results 5",
            set_field: |c, v| {
                c.search.max_results = Some(positive("search-max-results", v)?);
                Ok(())
            },
            clear: |c| c.search.max_results = None,
        }),
        Box::new(ValueHandler {
            key: "search-concurrency",
            hint: "To set how many sources are fetched at once, provide a number:",
            example: "refchat set search-concurrency 4",
            set_field: |c, v| {
                c.search.concurrency = Some(positive("search-concurrency", v)?);
                Ok(())
            },
            clear: |c| c.search.concurrency = None,
        }),
        Box::new(ValueHandler {
            key: "search-timeout-secs",
            hint: "To set the per-source fetch timeout, provide seconds:",
            example: "refchat set search-timeout-secs 15",
            set_field: |c, v| {
                c.search.timeout_secs = Some(positive("search-timeout-secs", v)?);
                Ok(())
            },
            clear: |c| c.search.timeout_secs = None,
        }),
        Box::new(ValueHandler {
            key: "search-excerpt-chars",
            hint: "To set how much of each reference reaches the prompt, provide characters:",
            example: "refchat set search-excerpt-chars 4096",
            set_field: |c, v| {
                c.search.excerpt_chars = Some(positive("search-excerpt-chars", v)?);
                Ok(())
            },
            clear: |c| c.search.excerpt_chars = None,
        }),
        Box::new(BooleanHandler {
            key: "arxiv-full-text",
            hint: "To read whole arXiv papers instead of abstracts, specify on or off:",
            example: "refchat set arxiv-full-text on",
            default_display: "off",
            set_field: |c, v| c.search.arxiv_full_text = v,
        }),
        Box::new(BooleanHandler {
            key: "search-keywords",
            hint: "To toggle keyword generation before searching, specify on or off:",
            example: "refchat set search-keywords off",
            default_display: "on",
            set_field: |c, v| c.search.generate_keywords = v,
        }),
    ]
}
