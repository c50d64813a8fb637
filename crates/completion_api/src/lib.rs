//! Transport-only client primitives for OpenAI-compatible chat completions.
//!
//! This crate owns request building, endpoint resolution and response/SSE
//! parsing for `/chat/completions` endpoints. It intentionally contains no
//! credential storage, no retry policy and no transcript coupling.
//!
//! Cancellation is cooperative: every network await is polled against a shared
//! [`client::CancellationSignal`] so callers can abandon a request mid-stream.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::CompletionApiClient;
pub use client::StreamResult;
pub use config::CompletionApiConfig;
pub use error::CompletionApiError;
pub use events::{ChatStreamEvent, FinishReason};
pub use payload::{ChatCompletionRequest, ChatMessage};
pub use sse::SseStreamParser;
pub use url::{chat_completions_url, resolve_base_url};

pub use reqwest::StatusCode;
