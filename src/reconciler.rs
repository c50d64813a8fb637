//! State machine that folds completion results back into the transcript.

use chat_provider::CompletionId;

use crate::message::Message;
use crate::transcript::{Transcript, TranscriptError};

/// Description used when a completion is cancelled locally.
pub const CANCELLED_DESCRIPTION: &str = "request was cancelled";

/// Text of the error entry appended for a failed completion.
#[must_use]
pub fn error_text(description: &str) -> String {
    format!("Error: {description}")
}

/// What happens to already-streamed content when a completion fails mid-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialReplyPolicy {
    /// Remove the partial assistant message before appending the error.
    #[default]
    Discard,
    /// Keep the partial assistant message as a finalized entry, then append the error.
    Keep,
}

impl PartialReplyPolicy {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discard" => Some(Self::Discard),
            "keep" => Some(Self::Keep),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discard => "discard",
            Self::Keep => "keep",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    /// Single-shot request in flight; nothing is in the transcript yet.
    AwaitingReply { completion_id: CompletionId },
    /// Streaming request in flight; the placeholder holds no content yet.
    AwaitingFirstFragment { completion_id: CompletionId },
    Streaming { completion_id: CompletionId },
}

impl ReconcilerState {
    #[must_use]
    pub fn completion_id(&self) -> Option<CompletionId> {
        match self {
            Self::Idle => None,
            Self::AwaitingReply { completion_id }
            | Self::AwaitingFirstFragment { completion_id }
            | Self::Streaming { completion_id } => Some(*completion_id),
        }
    }
}

/// Effect of one reconciler input on the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Stale or empty input; the transcript is unchanged.
    Ignored,
    /// A fragment was applied to the in-progress message.
    Applied,
    /// The completion ended successfully with `reply`.
    Finalized { reply: Message },
    /// The completion failed; `kept_partial` is set under [`PartialReplyPolicy::Keep`].
    Aborted {
        error: Message,
        kept_partial: Option<Message>,
    },
}

impl ReconcileOutcome {
    /// True for the outcomes that return the reconciler to `Idle`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized { .. } | Self::Aborted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReconciler {
    state: ReconcilerState,
    policy: PartialReplyPolicy,
}

impl Default for StreamReconciler {
    fn default() -> Self {
        Self::new(PartialReplyPolicy::default())
    }
}

impl StreamReconciler {
    #[must_use]
    pub fn new(policy: PartialReplyPolicy) -> Self {
        Self {
            state: ReconcilerState::Idle,
            policy,
        }
    }

    #[must_use]
    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    #[must_use]
    pub fn policy(&self) -> PartialReplyPolicy {
        self.policy
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == ReconcilerState::Idle
    }

    #[must_use]
    pub fn active_completion(&self) -> Option<CompletionId> {
        self.state.completion_id()
    }

    /// Starts a streamed completion by appending the placeholder.
    pub fn begin_stream(
        &mut self,
        transcript: &mut Transcript,
        completion_id: CompletionId,
    ) -> Result<(), TranscriptError> {
        self.ensure_idle()?;
        transcript.begin_assistant_placeholder()?;
        self.state = ReconcilerState::AwaitingFirstFragment { completion_id };
        Ok(())
    }

    /// Starts a single-shot completion; the transcript is untouched until the reply.
    pub fn begin_single_shot(&mut self, completion_id: CompletionId) -> Result<(), TranscriptError> {
        self.ensure_idle()?;
        self.state = ReconcilerState::AwaitingReply { completion_id };
        Ok(())
    }

    pub fn on_fragment(
        &mut self,
        transcript: &mut Transcript,
        completion_id: CompletionId,
        text: &str,
    ) -> ReconcileOutcome {
        if text.is_empty() {
            return ReconcileOutcome::Ignored;
        }

        let applied = match self.state {
            ReconcilerState::AwaitingFirstFragment { completion_id: active }
                if active == completion_id =>
            {
                transcript.replace_in_progress_content(text)
            }
            ReconcilerState::Streaming { completion_id: active } if active == completion_id => {
                transcript.apply_fragment(text)
            }
            _ => return ReconcileOutcome::Ignored,
        };

        match applied {
            Ok(()) => {
                self.state = ReconcilerState::Streaming { completion_id };
                ReconcileOutcome::Applied
            }
            Err(error) => self.lost_in_progress(completion_id, error),
        }
    }

    pub fn on_finished(
        &mut self,
        transcript: &mut Transcript,
        completion_id: CompletionId,
    ) -> ReconcileOutcome {
        match self.state {
            ReconcilerState::AwaitingFirstFragment { completion_id: active }
                if active == completion_id =>
            {
                if let Err(error) = transcript.replace_in_progress_content("") {
                    return self.lost_in_progress(completion_id, error);
                }
            }
            ReconcilerState::Streaming { completion_id: active } if active == completion_id => {}
            _ => return ReconcileOutcome::Ignored,
        }

        self.state = ReconcilerState::Idle;
        match transcript.finalize_completion() {
            Ok(reply) => ReconcileOutcome::Finalized {
                reply: reply.clone(),
            },
            Err(error) => self.lost_in_progress(completion_id, error),
        }
    }

    /// Routes a failure (remote error or cancellation) to the abort path.
    pub fn on_failure(
        &mut self,
        transcript: &mut Transcript,
        completion_id: CompletionId,
        description: &str,
    ) -> ReconcileOutcome {
        let kept_partial = match self.state {
            ReconcilerState::AwaitingReply { completion_id: active } if active == completion_id => {
                None
            }
            ReconcilerState::AwaitingFirstFragment { completion_id: active }
                if active == completion_id =>
            {
                let _ = transcript.abort_completion();
                None
            }
            ReconcilerState::Streaming { completion_id: active } if active == completion_id => {
                match self.policy {
                    PartialReplyPolicy::Discard => {
                        let _ = transcript.abort_completion();
                        None
                    }
                    PartialReplyPolicy::Keep => transcript.release_in_progress().ok().cloned(),
                }
            }
            _ => return ReconcileOutcome::Ignored,
        };

        self.state = ReconcilerState::Idle;
        let error = transcript.append_error(error_text(description)).clone();
        ReconcileOutcome::Aborted {
            error,
            kept_partial,
        }
    }

    pub fn on_single_shot(
        &mut self,
        transcript: &mut Transcript,
        completion_id: CompletionId,
        result: Result<String, String>,
    ) -> ReconcileOutcome {
        match self.state {
            ReconcilerState::AwaitingReply { completion_id: active } if active == completion_id => {}
            _ => return ReconcileOutcome::Ignored,
        }

        match result {
            Ok(text) => {
                self.state = ReconcilerState::Idle;
                let reply = Message::assistant(text);
                if let Err(error) = transcript.append(reply.clone()) {
                    return self.lost_in_progress(completion_id, error);
                }
                ReconcileOutcome::Finalized { reply }
            }
            Err(description) => self.on_failure(transcript, completion_id, &description),
        }
    }

    /// Returns to `Idle` without touching the transcript.
    pub fn reset(&mut self) {
        self.state = ReconcilerState::Idle;
    }

    fn ensure_idle(&self) -> Result<(), TranscriptError> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(TranscriptError::ConcurrentCompletion)
        }
    }

    fn lost_in_progress(
        &mut self,
        completion_id: CompletionId,
        error: TranscriptError,
    ) -> ReconcileOutcome {
        tracing::warn!(completion_id, %error, "transcript lost track of the in-progress reply");
        self.state = ReconcilerState::Idle;
        ReconcileOutcome::Ignored
    }
}
