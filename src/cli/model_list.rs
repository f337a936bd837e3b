//! Model listing functionality
//!
//! This module lists the models offered by the configured endpoint.

use crate::api::models::{fetch_models, sort_models};
use crate::cli::chat::require_credentials;
use crate::core::config::Config;
use chrono::{DateTime, Utc};
use std::error::Error;

pub async fn list_models(config: Config) -> Result<(), Box<dyn Error>> {
    let credentials = require_credentials(&config)?;

    println!("🤖 Available Models at {}", credentials.base_url);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("🎯 Text model: {}", config.text_model());
    println!("🖼  Vision model: {}", config.vision_model());
    println!();

    let client = reqwest::Client::new();
    let models_response = fetch_models(&client, &credentials.base_url, &credentials.api_key).await?;

    if models_response.data.is_empty() {
        println!("No models found at this endpoint.");
        return Ok(());
    }

    println!(
        "Found {} models (sorted newest first):",
        models_response.data.len()
    );
    println!();

    let mut models = models_response.data;
    sort_models(&mut models);

    for model in models {
        println!("  • {}", model.id);
        if let Some(owned_by) = &model.owned_by {
            if !owned_by.is_empty() && owned_by != "system" {
                println!("    Owner: {owned_by}");
            }
        }
        if let Some(created) = model.created.and_then(format_created) {
            println!("    Created: {created}");
        } else if let Some(created_at) = model.created_at.as_deref().filter(|c| !c.is_empty()) {
            println!("    Created: {created_at}");
        }
        println!();
    }

    Ok(())
}

/// Some endpoints report milliseconds, others seconds.
fn format_created(created: u64) -> Option<String> {
    if created == 0 {
        return None;
    }
    let secs = if created > 10_000_000_000 {
        created / 1000
    } else {
        created
    };
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_accepts_seconds_and_milliseconds() {
        assert_eq!(
            format_created(1_700_000_000).as_deref(),
            Some("2023-11-14 22:13:20 UTC")
        );
        assert_eq!(
            format_created(1_700_000_000_000).as_deref(),
            Some("2023-11-14 22:13:20 UTC")
        );
        assert_eq!(format_created(0), None);
    }
}
