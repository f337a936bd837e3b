pub mod aggregator;
pub mod assembler;
pub mod chat_stream;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod message;
pub mod session;
