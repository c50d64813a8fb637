//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport logic and is intended for offline local
//! runs and contract-level integration testing of the session layer.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_provider::{
    CancelSignal, CompletionEvent, CompletionProvider, CompletionRequest, ProviderProfile,
    RemoteError,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Scripted result for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Emit every chunk, then finish successfully.
    Reply(Vec<String>),
    /// Emit every chunk, then fail with `error`.
    Fail {
        chunks: Vec<String>,
        error: RemoteError,
    },
    /// Emit every chunk, then block until the caller cancels.
    Hang(Vec<String>),
    /// Return `Err` from the provider without emitting a terminal event.
    Abort(RemoteError),
}

/// Deterministic mock provider used by session tests and offline runs.
///
/// Scripted outcomes are consumed in call order; once the script is empty the
/// provider falls back to replying with its default chunks.
#[derive(Debug)]
pub struct MockProvider {
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: Vec<String>,
    chunk_delay: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// Creates a mock provider that always replies with `chunks`.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: chunks,
            chunk_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock provider that plays `outcomes` in order.
    #[must_use]
    pub fn scripted(outcomes: Vec<MockOutcome>) -> Self {
        let provider = Self::new(Vec::new());
        lock_unpoisoned(&provider.script).extend(outcomes);
        provider
    }

    /// Sleeps between emitted chunks to mimic token streaming.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Appends an outcome to the script.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        lock_unpoisoned(&self.script).push_back(outcome);
    }

    /// Requests received so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    fn next_outcome(&self, req: &CompletionRequest) -> MockOutcome {
        lock_unpoisoned(&self.requests).push(req.clone());
        lock_unpoisoned(&self.script)
            .pop_front()
            .unwrap_or_else(|| MockOutcome::Reply(self.fallback.clone()))
    }

    fn pause(&self) {
        if !self.chunk_delay.is_zero() {
            thread::sleep(self.chunk_delay);
        }
    }

    fn wait_for_cancel(cancel: &CancelSignal) {
        while !cancel.load(Ordering::SeqCst) {
            thread::sleep(CANCEL_POLL_INTERVAL);
        }
    }

    /// Emits chunks; returns false when cancellation interrupted the stream.
    fn emit_chunks(
        &self,
        completion_id: u64,
        chunks: Vec<String>,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> bool {
        for text in chunks {
            if cancel.load(Ordering::SeqCst) {
                return false;
            }
            emit(CompletionEvent::Chunk {
                completion_id,
                text,
            });
            self.pause();
        }
        !cancel.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(
            [
                "It ",
                "looks ",
                "like ",
                "you're ",
                "chatting ",
                "offline. ",
                "Would ",
                "you ",
                "like ",
                "help?",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        )
        .with_chunk_delay(Duration::from_millis(50))
    }
}

impl CompletionProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            display_name: "Mock".to_string(),
        }
    }

    fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, RemoteError> {
        match self.next_outcome(req) {
            MockOutcome::Reply(chunks) => {
                self.pause();
                Ok(chunks.concat())
            }
            MockOutcome::Fail { error, .. } | MockOutcome::Abort(error) => Err(error),
            MockOutcome::Hang(_) => {
                Self::wait_for_cancel(cancel);
                Err(RemoteError::new("request was cancelled"))
            }
        }
    }

    fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<(), RemoteError> {
        let completion_id = req.completion_id;
        let outcome = match self.next_outcome(&req) {
            MockOutcome::Abort(error) => return Err(error),
            outcome => outcome,
        };

        emit(CompletionEvent::Started { completion_id });

        match outcome {
            MockOutcome::Reply(chunks) => {
                if self.emit_chunks(completion_id, chunks, &cancel, emit) {
                    emit(CompletionEvent::Finished { completion_id });
                } else {
                    emit(CompletionEvent::Cancelled { completion_id });
                }
            }
            MockOutcome::Fail { chunks, error } => {
                if self.emit_chunks(completion_id, chunks, &cancel, emit) {
                    emit(CompletionEvent::Failed {
                        completion_id,
                        error,
                    });
                } else {
                    emit(CompletionEvent::Cancelled { completion_id });
                }
            }
            MockOutcome::Hang(chunks) => {
                self.emit_chunks(completion_id, chunks, &cancel, emit);
                Self::wait_for_cancel(&cancel);
                emit(CompletionEvent::Cancelled { completion_id });
            }
            MockOutcome::Abort(_) => {}
        }

        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
