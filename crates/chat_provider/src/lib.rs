//! Minimal provider-agnostic contract for executing a single chat completion.
//!
//! This crate defines only the wire-level message shape, the completion
//! request envelope and the lifecycle events a provider emits. It excludes
//! transport details, transcript bookkeeping and persistence concerns.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

/// Identifier for one completion request.
pub type CompletionId = u64;

/// Shared cancellation flag for a completion.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any completion starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Failure reported by the remote completion service or the transport in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    /// Creates an error that carries no HTTP status (transport, parse or stream failures).
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error for a non-success HTTP status.
    #[must_use]
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Role of one outbound wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

impl WireRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Role/content pair in the format the remote completion API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl WireMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
        }
    }
}

/// Input required to start a completion.
///
/// `endpoint` is the configured endpoint identifier; providers resolve it to a
/// concrete base address.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub completion_id: CompletionId,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<WireMessage>,
    pub max_tokens: Option<u32>,
}

/// Provider-emitted lifecycle event for a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    Started {
        completion_id: CompletionId,
    },
    Chunk {
        completion_id: CompletionId,
        text: String,
    },
    Finished {
        completion_id: CompletionId,
    },
    Failed {
        completion_id: CompletionId,
        error: RemoteError,
    },
    Cancelled {
        completion_id: CompletionId,
    },
}

impl CompletionEvent {
    /// Returns the completion identifier associated with this event.
    #[must_use]
    pub fn completion_id(&self) -> CompletionId {
        match self {
            Self::Started { completion_id }
            | Self::Chunk { completion_id, .. }
            | Self::Finished { completion_id }
            | Self::Failed { completion_id, .. }
            | Self::Cancelled { completion_id } => *completion_id,
        }
    }

    /// Returns true when this event terminates the completion lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing a completion provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub display_name: String,
}

/// Provider interface for executing one completion request.
pub trait CompletionProvider: Send + Sync + 'static {
    /// Returns provider identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Executes a request and returns the whole reply text at once.
    fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, RemoteError>;

    /// Executes a request and emits lifecycle events in provider order.
    ///
    /// Implementations emit `Started`, any number of `Chunk` events and exactly
    /// one terminal event. Returning `Err` without a terminal event is treated
    /// by callers as a `Failed` event.
    fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<(), RemoteError>;
}
