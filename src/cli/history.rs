//! `history` subcommands over the conversation store.

use std::error::Error;

use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::conversation::ConversationStore;
use crate::core::message::{ContentBlock, Message};

pub fn list_conversations(config: &Config) -> Result<(), Box<dyn Error>> {
    let store = ConversationStore::new(config.history_dir());
    let names = store.list()?;

    println!("💬 Conversations in {}", path_display(store.dir()));
    println!();
    if names.is_empty() {
        println!("No saved conversations.");
    }
    for name in names {
        println!("  • {name}");
    }
    Ok(())
}

pub fn show_conversation(config: &Config, name: &str) -> Result<(), Box<dyn Error>> {
    let store = ConversationStore::new(config.history_dir());
    let messages = store.load(name)?;
    print!("{}", render_transcript(&messages));
    Ok(())
}

pub fn delete_conversation(config: &Config, name: &str) -> Result<(), Box<dyn Error>> {
    let store = ConversationStore::new(config.history_dir());
    store.delete(name)?;
    println!("🗑  Deleted {name}");
    Ok(())
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        if message.is_user() {
            out.push_str(&format!("You: {}\n", message.text()));
            for block in message.blocks() {
                match block {
                    ContentBlock::Image(_) => out.push_str("  [image]\n"),
                    ContentBlock::References(references) => {
                        for reference in references {
                            out.push_str(&format!(
                                "  [source] {} ({})\n",
                                reference.title, reference.link
                            ));
                        }
                    }
                    ContentBlock::Text(_) => {}
                }
            }
        } else {
            if let Some(reasoning) = message.reasoning().filter(|r| !r.is_empty()) {
                out.push_str(&format!("Reasoning: {reasoning}\n"));
            }
            out.push_str(&format!("Assistant: {}\n", message.text()));
        }
        out.push('\n');
    }
    out
}
