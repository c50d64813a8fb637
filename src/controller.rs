//! Session controller: the single owner of transcript mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_provider::{CancelSignal, CompletionEvent, CompletionId, CompletionRequest, RemoteError};
use session_store::{SessionStore, SessionStoreError, StoredMessage};
use thiserror::Error;

use crate::config::{ResponseMode, SessionOptions};
use crate::message::Message;
use crate::reconciler::{ReconcileOutcome, StreamReconciler, CANCELLED_DESCRIPTION};
use crate::settings::Settings;
use crate::transcript::{Transcript, TranscriptError};
use crate::wire::to_wire_messages;

/// Local rejections. None of these become transcript entries.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a completion is already in progress")]
    ConcurrentCompletion,
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error("failed to start completion worker: {0}")]
    WorkerSpawn(String),
}

/// Per-send replacements for the persisted settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOverrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
}

/// Everything a driver needs to run one completion.
#[derive(Debug, Clone)]
pub struct PendingCompletion {
    pub request: CompletionRequest,
    pub mode: ResponseMode,
    pub cancel: CancelSignal,
}

#[derive(Debug)]
pub struct ChatSession {
    transcript: Transcript,
    reconciler: StreamReconciler,
    settings: Settings,
    options: SessionOptions,
    store: SessionStore,
    next_completion_id: CompletionId,
    active_cancel: Option<CancelSignal>,
}

impl ChatSession {
    /// Hydrates transcript and settings from `store`.
    ///
    /// Unreadable or malformed records are logged and replaced by defaults; the
    /// next checkpoint overwrites them.
    pub fn open(store: SessionStore, options: SessionOptions) -> Self {
        let transcript = match store.load_transcript() {
            Ok(messages) => {
                Transcript::from_messages(messages.into_iter().map(Message::from).collect())
            }
            Err(error) => {
                log_load_failure("transcript", &error);
                Transcript::new()
            }
        };

        let settings = match store.load_settings() {
            Ok(record) => Settings::from_record(record),
            Err(error) => {
                log_load_failure("settings", &error);
                Settings::default()
            }
        };

        tracing::info!(
            messages = transcript.len(),
            mode = ?options.response_mode,
            "chat session hydrated"
        );

        Self {
            transcript,
            reconciler: StreamReconciler::new(options.partial_replies),
            settings,
            options,
            store,
            next_completion_id: 1,
            active_cancel: None,
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.reconciler.is_idle()
    }

    #[must_use]
    pub fn active_completion(&self) -> Option<CompletionId> {
        self.reconciler.active_completion()
    }

    pub fn begin_send(
        &mut self,
        text: &str,
        overrides: &CompletionOverrides,
    ) -> Result<PendingCompletion, SessionError> {
        if !self.reconciler.is_idle() {
            return Err(SessionError::ConcurrentCompletion);
        }
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.transcript.append(Message::user(text))?;
        self.persist_transcript();

        let system_prompt = overrides
            .system_prompt
            .as_deref()
            .unwrap_or(&self.settings.system_prompt);
        let messages = to_wire_messages(&self.transcript, system_prompt);

        let completion_id = self.next_completion_id;
        self.next_completion_id += 1;

        let request = CompletionRequest {
            completion_id,
            endpoint: overrides
                .endpoint
                .clone()
                .unwrap_or_else(|| self.settings.effective_endpoint().to_string()),
            api_key: overrides
                .api_key
                .clone()
                .unwrap_or_else(|| self.settings.api_key.clone()),
            model: overrides
                .model
                .clone()
                .unwrap_or_else(|| self.settings.model.clone()),
            temperature: overrides.temperature.unwrap_or(self.settings.temperature),
            messages,
            max_tokens: None,
        };

        let mode = self.options.response_mode;
        match mode {
            ResponseMode::Streaming => self
                .reconciler
                .begin_stream(&mut self.transcript, completion_id)?,
            ResponseMode::SingleShot => self.reconciler.begin_single_shot(completion_id)?,
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.active_cancel = Some(Arc::clone(&cancel));

        tracing::debug!(
            completion_id,
            model = %request.model,
            endpoint = %request.endpoint,
            messages = request.messages.len(),
            "completion started"
        );

        Ok(PendingCompletion {
            request,
            mode,
            cancel,
        })
    }

    /// Feeds one provider event through the reconciler.
    pub fn apply_event(&mut self, event: CompletionEvent) -> ReconcileOutcome {
        let outcome = match event {
            CompletionEvent::Started { .. } => ReconcileOutcome::Ignored,
            CompletionEvent::Chunk {
                completion_id,
                text,
            } => self
                .reconciler
                .on_fragment(&mut self.transcript, completion_id, &text),
            CompletionEvent::Finished { completion_id } => self
                .reconciler
                .on_finished(&mut self.transcript, completion_id),
            CompletionEvent::Failed {
                completion_id,
                error,
            } => self.reconciler.on_failure(
                &mut self.transcript,
                completion_id,
                &error.to_string(),
            ),
            CompletionEvent::Cancelled { completion_id } => self.reconciler.on_failure(
                &mut self.transcript,
                completion_id,
                CANCELLED_DESCRIPTION,
            ),
        };
        self.after_outcome(&outcome);
        outcome
    }

    /// Applies the result of a single-shot completion.
    pub fn apply_single_shot(
        &mut self,
        completion_id: CompletionId,
        result: Result<String, RemoteError>,
    ) -> ReconcileOutcome {
        let outcome = self.reconciler.on_single_shot(
            &mut self.transcript,
            completion_id,
            result.map_err(|error| error.to_string()),
        );
        self.after_outcome(&outcome);
        outcome
    }

    /// Signals the in-flight completion and moves it to the failure path now.
    ///
    /// Later events for the cancelled completion are stale and ignored.
    pub fn cancel(&mut self) -> ReconcileOutcome {
        let Some(completion_id) = self.reconciler.active_completion() else {
            return ReconcileOutcome::Ignored;
        };
        if let Some(cancel) = self.active_cancel.as_ref() {
            cancel.store(true, Ordering::SeqCst);
        }
        tracing::info!(completion_id, "completion cancelled");

        let outcome =
            self.reconciler
                .on_failure(&mut self.transcript, completion_id, CANCELLED_DESCRIPTION);
        self.after_outcome(&outcome);
        outcome
    }

    /// Drops any in-flight completion and empties the transcript, in memory and on disk.
    /// Drops the transcript and any reply in flight. Returns the interrupted
    /// completion, whose later events are stale.
    pub fn clear(&mut self) -> Option<CompletionId> {
        let interrupted = self.reconciler.active_completion();
        if let Some(cancel) = self.active_cancel.take() {
            cancel.store(true, Ordering::SeqCst);
        }
        self.reconciler.reset();
        self.transcript.clear();

        if let Err(error) = self.store.clear_transcript() {
            tracing::warn!(%error, "failed to clear persisted transcript");
        }
        tracing::info!(?interrupted, "transcript cleared");
        interrupted
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
        if let Err(error) = self.store.save_settings(&self.settings.to_record()) {
            tracing::warn!(%error, "failed to persist settings");
        }
    }

    fn after_outcome(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Finalized { reply } => {
                tracing::debug!(chars = reply.content.chars().count(), "completion finished");
            }
            ReconcileOutcome::Aborted { error, kept_partial } => {
                tracing::info!(
                    error = %error.content,
                    kept_partial = kept_partial.is_some(),
                    "completion aborted"
                );
            }
            ReconcileOutcome::Ignored | ReconcileOutcome::Applied => return,
        }
        self.active_cancel = None;
        self.persist_transcript();
    }

    /// Writes committed messages only; the in-progress reply is never persisted.
    fn persist_transcript(&self) {
        let records: Vec<StoredMessage> = self
            .transcript
            .committed()
            .map(StoredMessage::from)
            .collect();
        if let Err(error) = self.store.save_transcript(&records) {
            tracing::warn!(%error, "failed to persist transcript");
        }
    }
}

fn log_load_failure(record: &str, error: &SessionStoreError) {
    if error.is_malformed() {
        tracing::warn!(record, %error, "persisted record is malformed; using defaults");
    } else {
        tracing::warn!(record, %error, "failed to load persisted record; using defaults");
    }
}
