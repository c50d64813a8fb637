//! Line-oriented terminal front end for `chat_session`.
//!
//! ## Provider bootstrap
//!
//! - `CHAT_PROVIDER=openai` (default) talks to an OpenAI-compatible endpoint
//!   chosen by the persisted settings (`/set endpoint ...`).
//! - `CHAT_PROVIDER=mock` replies with canned chunks, for offline runs.
//!
//! ## Environment
//!
//! - `CHAT_DATA_DIR`: persistence root (default `$HOME/.chat_session`).
//! - `CHAT_STREAM=0`: request whole replies instead of streaming.
//! - `CHAT_PARTIAL_REPLIES=keep`: keep the partial reply when a stream fails.
//! - `CHAT_REQUEST_TIMEOUT_SEC`: per-request timeout, > 0.
//! - `CHAT_LOG`: `tracing` filter for stderr logs (default `warn`).

pub mod avatar;
pub mod commands;
pub mod logging;
pub mod providers;
pub mod repl;
