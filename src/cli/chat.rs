//! Line-based interactive chat.

use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::core::aggregator::{TurnOutcome, CURSOR_MARKER};
use crate::core::config::env::Credentials;
use crate::core::config::Config;
use crate::core::message::{ImageSource, UserTurn};
use crate::core::session::{ChatSession, TurnEvent, TurnReport};
use crate::utils::image::load_image;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// A parsed line of chat input.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChatInput<'a> {
    Empty,
    Quit,
    New,
    Image(&'a str),
    Message(&'a str),
}

pub(crate) fn parse_input(line: &str) -> ChatInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    match line.split_once(char::is_whitespace) {
        Some(("/image", path)) if !path.trim().is_empty() => ChatInput::Image(path.trim()),
        _ => match line {
            "/quit" | "/exit" => ChatInput::Quit,
            "/new" => ChatInput::New,
            _ => ChatInput::Message(line),
        },
    }
}

/// Resolve credentials, refusing to start without an API key.
pub(crate) fn require_credentials(config: &Config) -> Result<Credentials, Box<dyn Error>> {
    let credentials = config.resolve_credentials();
    if credentials.api_key.is_empty() {
        return Err("❌ No API key found\n\n\
            Please set one of:\n  \
            export REFCHAT_API_KEY=\"your-api-key-here\"\n  \
            export OPENAI_API_KEY=\"your-api-key-here\""
            .into());
    }
    Ok(credentials)
}

pub(crate) fn load_images(paths: &[PathBuf]) -> Result<Vec<ImageSource>, Box<dyn Error>> {
    paths.iter().map(|path| load_image(path)).collect()
}

pub async fn run_chat(
    config: Config,
    resume: Option<String>,
    images: Vec<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let credentials = require_credentials(&config)?;
    let mut pending = load_images(&images)?;
    let mut session = ChatSession::new(config, credentials)?;

    if let Some(name) = resume {
        session.resume(&name)?;
        eprintln!(
            "📂 Resumed {name} ({} messages)",
            session.messages().len()
        );
    }

    eprintln!("🚀 refchat: {}", session.config().text_model());
    eprintln!(
        "🔎 Web references: {}",
        if session.config().search_enabled() { "on" } else { "off" }
    );
    eprintln!("💡 /new, /image <path>, /quit; Ctrl+C cancels an answer");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::New => {
                session.reset();
                pending.clear();
                eprintln!("🆕 New conversation");
            }
            ChatInput::Image(path) => match load_image(Path::new(path)) {
                Ok(image) => {
                    pending.push(image);
                    eprintln!("🖼  Image queued for the next message ({})", pending.len());
                }
                Err(err) => eprintln!("❌ {err}"),
            },
            ChatInput::Message(text) => {
                let was_named = session.name().is_some();
                let mut turn = UserTurn::new(text);
                for image in pending.drain(..) {
                    turn = turn.with_image(image);
                }
                stream_turn(&mut session, turn).await;
                if let (false, Some(name)) = (was_named, session.name()) {
                    eprintln!("💾 Saved as {name}");
                }
            }
        }
    }

    Ok(())
}

/// Run one turn, printing progress as it arrives. Ctrl+C cancels the turn.
pub(crate) async fn stream_turn(session: &mut ChatSession, turn: UserTurn) -> TurnReport {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut printer = StreamPrinter::default();
    let report = session
        .run_turn(turn, cancel, |event| printer.handle(event))
        .await;
    watcher.abort();
    printer.finish(&report);
    report
}

/// Prints only the part of each cumulative view not yet shown.
#[derive(Default)]
struct StreamPrinter {
    answer_printed: usize,
    reasoning_printed: usize,
}

impl StreamPrinter {
    fn handle(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::SearchStarted { query } => eprintln!("🔎 Searching: {query}"),
            TurnEvent::ReferencesReady(count) => eprintln!("📚 {count} reference(s)"),
            TurnEvent::Reasoning(text) => {
                let new = unseen(&text, self.reasoning_printed);
                if !new.is_empty() {
                    eprint!("{DIM}{new}{RESET}");
                    self.reasoning_printed = text.len();
                }
            }
            TurnEvent::Answer(text) => {
                let text = text.strip_suffix(CURSOR_MARKER).unwrap_or(&text);
                let new = unseen(text, self.answer_printed);
                if new.is_empty() {
                    return;
                }
                if self.answer_printed == 0 && self.reasoning_printed > 0 {
                    eprintln!();
                }
                print!("{new}");
                let _ = io::stdout().flush();
                self.answer_printed = text.len();
            }
        }
    }

    fn finish(&self, report: &TurnReport) {
        match &report.outcome {
            TurnOutcome::Completed(_) => println!(),
            TurnOutcome::Failed(message) => {
                if self.answer_printed > 0 {
                    println!();
                }
                let reason = message
                    .reasoning()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.text());
                eprintln!("❌ {reason}");
            }
            TurnOutcome::Cancelled => {
                if self.answer_printed > 0 {
                    println!();
                }
                eprintln!("⏹  Cancelled");
            }
        }
        if let Some(err) = &report.persist_error {
            eprintln!("⚠️  Conversation not saved: {err}");
        }
    }
}

/// Suffix of the cumulative `full` after the first `printed` bytes.
fn unseen(full: &str, printed: usize) -> &str {
    full.get(printed..).unwrap_or("")
}
