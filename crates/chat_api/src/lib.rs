//! Transport-only client for OpenAI-compatible streaming chat completions.
//!
//! This crate owns request building, retry, and parsing of the `data:` line stream
//! (one JSON object per line, terminated by `data: [DONE]`). It keeps no conversation
//! state and has no console coupling.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, StreamResult, StreamSummary};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::ChatStreamEvent;
pub use payload::{ChatMessage, ChatRequest};
pub use sse::ChatStreamParser;
pub use url::normalize_chat_url;
