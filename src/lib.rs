//! Client-side chat session manager.
//!
//! Invariant: at most one completion is in flight, and every transcript
//! mutation goes through [`ChatSession`].
//!
//! # Public API Overview
//! - Own a conversation with [`ChatSession`]; drive a provider from a worker
//!   thread with [`SessionRuntime`].
//! - Project the transcript onto provider messages with [`to_wire_messages`].
//! - Check connectivity with [`probe_connection`].
//! - Host the assistant companion behind [`AssistantAvatar`].
//!
//! Providers live in the `chat_provider_*` crates; persistence in `session_store`.

pub mod companion;
pub mod config;
pub mod controller;
pub mod message;
pub mod probe;
pub mod reconciler;
pub mod runtime;
pub mod settings;
pub mod transcript;
pub mod wire;

pub use crate::companion::{AssistantAvatar, Companion, Gesture};
pub use crate::config::{ResponseMode, SessionConfig, SessionOptions};
pub use crate::controller::{ChatSession, CompletionOverrides, PendingCompletion, SessionError};
pub use crate::message::{Message, Role};
pub use crate::probe::probe_connection;
pub use crate::reconciler::{PartialReplyPolicy, ReconcileOutcome, ReconcilerState, StreamReconciler};
pub use crate::runtime::{NoopObserver, SessionObserver, SessionRuntime};
pub use crate::settings::Settings;
pub use crate::transcript::{Transcript, TranscriptError, PLACEHOLDER};
pub use crate::wire::to_wire_messages;
