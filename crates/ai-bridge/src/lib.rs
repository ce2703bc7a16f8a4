//! LLM bridge for Undercroft.
//!
//! The engine consumes one narrow capability: chat completion plus text
//! embedding, with a per-call timeout. Everything behind it is swappable;
//! the shipped client talks to any OpenAI-compatible endpoint. Every
//! consumer in the engine carries a deterministic fallback, so a failed
//! or absent client degrades the game but never breaks it.

pub mod client;
pub mod error;

pub use client::{clean_json_reply, ChatRequest, LlmClient, OpenAiClient};
pub use error::{LlmError, LlmResult};
