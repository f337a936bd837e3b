//! refchat is a command-line chat client that grounds answers in references
//! fetched from the web and arXiv.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`retrieval`] searches the web, extracts readable text from each hit and
//!   turns the survivors into ranked references.
//! - [`core`] owns the conversation model, request assembly, the streaming
//!   transport, stream aggregation, persistence and the [`core::session`]
//!   that drives one turn end to end.
//! - [`api`] defines the chat-completions and model-listing payloads.
//! - [`cli`] parses the command line and runs the interactive session.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod retrieval;
pub mod utils;
