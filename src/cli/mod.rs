//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod ask;
pub mod chat;
pub mod history;
pub mod model_list;
pub mod search;
pub mod settings;

use std::error::Error;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::cli::ask::run_ask;
use crate::cli::chat::run_chat;
use crate::cli::history::{delete_conversation, list_conversations, show_conversation};
use crate::cli::model_list::list_models;
use crate::cli::search::run_search;
use crate::core::config::Config;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "refchat")]
#[command(about = "A command-line chat client that grounds answers in web and arXiv references")]
#[command(
    long_about = "refchat talks to an OpenAI-compatible chat-completions endpoint. Text turns can \
be augmented with references fetched from the web (and arXiv); turns carrying an image are \
routed to a vision model. Every conversation is saved as JSON and can be resumed.\n\n\
Environment Variables:\n\
  REFCHAT_API_KEY   API key (falls back to OPENAI_API_KEY)\n\
  REFCHAT_BASE_URL  Override the configured base URL\n\
  RUST_LOG          Diagnostic filter (overrides -v)\n\n\
Chat commands:\n\
  /new              Start a new conversation\n\
  /image <path>     Attach an image to the next message\n\
  /quit             Exit\n\
  Ctrl+C            Cancel the answer being streamed"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase diagnostic output (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Per-invocation overrides of the saved configuration.
#[derive(ClapArgs, Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    /// Text model to use for this run
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Augment text turns with web references
    #[arg(long, global = true, conflicts_with = "no_search")]
    pub search: bool,

    /// Do not search the web, even if enabled in the config
    #[arg(long, global = true)]
    pub no_search: bool,

    #[arg(long, global = true, value_name = "N")]
    pub max_tokens: Option<u32>,

    #[arg(long, global = true, value_name = "T")]
    pub temperature: Option<f32>,

    #[arg(long, global = true, value_name = "P")]
    pub top_p: Option<f32>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.text_model = Some(model.clone());
        }
        if self.search {
            config.search.enabled = Some(true);
        }
        if self.no_search {
            config.search.enabled = Some(false);
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = Some(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            config.temperature = Some(temperature);
        }
        if let Some(top_p) = self.top_p {
            config.top_p = Some(top_p);
        }
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start an interactive chat session (default)
    Chat {
        /// Continue a saved conversation
        #[arg(long, value_name = "NAME")]
        resume: Option<String>,
        /// Attach an image to the first message
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
    /// Ask a single question and save it as a new conversation
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
    /// Fetch references for a query without asking the model
    Search {
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// Manage saved conversations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// List models offered by the endpoint
    Models,
    /// Show the current configuration
    Config,
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum HistoryAction {
    /// List saved conversations, newest first
    List,
    /// Print a saved conversation
    Show { name: String },
    /// Delete a saved conversation
    Delete { name: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let load_config = || -> Result<Config, Box<dyn Error>> {
        let mut config = Config::load()?;
        args.overrides.apply(&mut config);
        Ok(config)
    };

    match args.command.unwrap_or(Commands::Chat {
        resume: None,
        images: Vec::new(),
    }) {
        Commands::Chat { resume, images } => run_chat(load_config()?, resume, images).await,
        Commands::Ask { prompt, images } => run_ask(load_config()?, prompt.join(" "), images).await,
        Commands::Search { query } => run_search(load_config()?, query.join(" ")).await,
        Commands::History { action } => {
            let config = load_config()?;
            match action {
                HistoryAction::List => list_conversations(&config),
                HistoryAction::Show { name } => show_conversation(&config, &name),
                HistoryAction::Delete { name } => delete_conversation(&config, &name),
            }
        }
        Commands::Models => list_models(load_config()?).await,
        Commands::Config => {
            load_config()?.print_all();
            Ok(())
        }
        Commands::Set { key, value } => {
            report_setting(settings::set(&key, &value));
            Ok(())
        }
        Commands::Unset { key } => {
            report_setting(settings::unset(&key));
            Ok(())
        }
    }
}

fn report_setting(result: Result<String, settings::SettingError>) {
    match result {
        Ok(message) => println!("{message}"),
        Err(err) => {
            err.print();
            std::process::exit(err.exit_code());
        }
    }
}
