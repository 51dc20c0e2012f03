//! nexos-bridge - OpenAI-compatible front door for the nexos.ai chat backend
//!
//! This crate provides an HTTP proxy that accepts OpenAI chat-completions
//! requests, replays the latest user message into a nexos.ai chat session and
//! translates the upstream event stream back into OpenAI responses.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod openai;
pub mod session;
pub mod stream;
pub mod testing;
pub mod upstream;

pub use error::BridgeError;
