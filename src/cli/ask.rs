//! One-shot `ask` command: a single turn saved as a new conversation.

use std::error::Error;
use std::path::PathBuf;

use crate::cli::chat::{load_images, require_credentials, stream_turn};
use crate::core::aggregator::TurnOutcome;
use crate::core::config::Config;
use crate::core::message::{Message, UserTurn};
use crate::core::session::ChatSession;

pub async fn run_ask(
    config: Config,
    prompt: String,
    images: Vec<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    if prompt.trim().is_empty() && images.is_empty() {
        eprintln!("Usage: refchat ask <prompt>");
        std::process::exit(1);
    }

    let credentials = require_credentials(&config)?;
    let mut turn = UserTurn::new(prompt);
    for image in load_images(&images)? {
        turn = turn.with_image(image);
    }

    let mut session = ChatSession::new(config, credentials)?;
    let report = stream_turn(&mut session, turn).await;

    if let Some(user) = session.messages().iter().rev().find(|m| m.is_user()) {
        print_sources(user);
    }
    if let Some(name) = session.name() {
        eprintln!("💾 Saved as {name}");
    }

    match report.outcome {
        TurnOutcome::Completed(_) => Ok(()),
        TurnOutcome::Failed(_) | TurnOutcome::Cancelled => std::process::exit(1),
    }
}

fn print_sources(message: &Message) {
    let Some(references) = message.references() else {
        return;
    };
    eprintln!();
    eprintln!("Sources:");
    for (index, reference) in references.iter().enumerate() {
        eprintln!("  {}. {} ({})", index + 1, reference.title, reference.link);
    }
}
