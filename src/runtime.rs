//! Drives a [`CompletionProvider`] on a worker thread and feeds its events
//! back into a shared [`ChatSession`].
//!
//! Every transcript mutation happens under the session mutex, in the order
//! the worker emits events. Observers are notified after the lock is released.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chat_provider::{CompletionEvent, CompletionId, CompletionProvider, RemoteError};

use crate::config::ResponseMode;
use crate::controller::{ChatSession, CompletionOverrides, PendingCompletion, SessionError};
use crate::message::Message;
use crate::reconciler::ReconcileOutcome;
use crate::settings::Settings;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Rendering-side hooks. Every method defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    fn on_fragment(&self, _completion_id: CompletionId, _text: &str) {}

    fn on_finished(&self, _reply: &Message) {}

    /// `kept_partial` is the partial reply kept under the keep policy.
    fn on_failed(&self, _error: &Message, _kept_partial: Option<&Message>) {}

    /// The transcript was cleared. `interrupted` names the completion that was
    /// in flight at the time, if any; it gets no other terminal callback.
    fn on_cleared(&self, _interrupted: Option<CompletionId>) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

struct ActiveCompletion {
    completion_id: CompletionId,
    join_handle: Option<JoinHandle<()>>,
}

pub struct SessionRuntime {
    session: Arc<Mutex<ChatSession>>,
    provider: Arc<dyn CompletionProvider>,
    observer: Arc<dyn SessionObserver>,
    active: Mutex<Option<ActiveCompletion>>,
    /// Cancelled workers replaced by a newer send before they exited.
    retired: Mutex<Vec<ActiveCompletion>>,
}

impl SessionRuntime {
    pub fn new(
        session: ChatSession,
        provider: Arc<dyn CompletionProvider>,
        observer: Arc<dyn SessionObserver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(Mutex::new(session)),
            provider,
            observer,
            active: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Runs `f` with the session locked. Keep `f` short; workers wait on the same lock.
    pub fn with_session<R>(&self, f: impl FnOnce(&ChatSession) -> R) -> R {
        f(&lock_unpoisoned(&self.session))
    }

    #[must_use]
    pub fn provider(&self) -> Arc<dyn CompletionProvider> {
        Arc::clone(&self.provider)
    }

    pub fn send_message(self: &Arc<Self>, text: &str) -> Result<CompletionId, SessionError> {
        self.send_message_with(text, &CompletionOverrides::default())
    }

    pub fn send_message_with(
        self: &Arc<Self>,
        text: &str,
        overrides: &CompletionOverrides,
    ) -> Result<CompletionId, SessionError> {
        let pending = lock_unpoisoned(&self.session).begin_send(text, overrides)?;
        let completion_id = pending.request.completion_id;

        // Held across spawn so a fast worker cannot clear the slot before it is filled.
        let mut active = lock_unpoisoned(&self.active);
        match self.spawn_worker(pending) {
            Ok(join_handle) => {
                let previous = active.replace(ActiveCompletion {
                    completion_id,
                    join_handle: Some(join_handle),
                });
                drop(active);
                if let Some(previous) = previous {
                    self.retire(previous);
                }
                Ok(completion_id)
            }
            Err(error) => {
                drop(active);
                tracing::warn!(completion_id, %error, "failed to spawn completion worker");
                self.dispatch(CompletionEvent::Failed {
                    completion_id,
                    error: RemoteError::new(format!("failed to start request: {error}")),
                });
                Err(SessionError::WorkerSpawn(error.to_string()))
            }
        }
    }

    /// Cancels the in-flight completion. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        let outcome = lock_unpoisoned(&self.session).cancel();
        let cancelled = outcome.is_terminal();
        self.notify(&outcome, None);
        cancelled
    }

    pub fn clear(&self) {
        let interrupted = lock_unpoisoned(&self.session).clear();
        self.observer.on_cleared(interrupted);
    }

    pub fn update_settings(&self, settings: Settings) {
        lock_unpoisoned(&self.session).update_settings(settings);
    }

    /// True when the session accepts a new send and no worker is still running,
    /// including cancelled workers that have not exited yet.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        lock_unpoisoned(&self.active).is_none()
            && self.reap_retired() == 0
            && lock_unpoisoned(&self.session).is_idle()
    }

    /// Blocks until [`SessionRuntime::is_idle`] or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    fn spawn_worker(self: &Arc<Self>, pending: PendingCompletion) -> std::io::Result<JoinHandle<()>> {
        let completion_id = pending.request.completion_id;
        let runtime = Arc::clone(self);
        thread::Builder::new()
            .name(format!("chat-completion-{completion_id}"))
            .spawn(move || runtime.run_worker(pending))
    }

    fn run_worker(self: Arc<Self>, pending: PendingCompletion) {
        let completion_id = pending.request.completion_id;
        match pending.mode {
            ResponseMode::SingleShot => self.run_single_shot(pending),
            ResponseMode::Streaming => self.run_stream(pending),
        }
        self.clear_active_if_matching(completion_id);
    }

    fn run_single_shot(&self, pending: PendingCompletion) {
        let completion_id = pending.request.completion_id;
        let provider = Arc::clone(&self.provider);
        let result = catch_unwind(AssertUnwindSafe(|| {
            provider.complete(&pending.request, &pending.cancel)
        }))
        .unwrap_or_else(|_| Err(RemoteError::new("provider panicked")));

        if let Err(error) = &result {
            tracing::debug!(completion_id, %error, "single-shot completion failed");
        }
        let outcome = lock_unpoisoned(&self.session).apply_single_shot(completion_id, result);
        self.notify(&outcome, None);
    }

    fn run_stream(&self, pending: PendingCompletion) {
        let PendingCompletion {
            request, cancel, ..
        } = pending;
        let completion_id = request.completion_id;

        let terminal_emitted = AtomicBool::new(false);
        let mut emit = |event: CompletionEvent| {
            if event.is_terminal() {
                terminal_emitted.store(true, Ordering::SeqCst);
            }
            self.dispatch(event);
        };

        let provider = Arc::clone(&self.provider);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.stream(request, cancel, &mut emit)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(CompletionEvent::Failed {
                completion_id,
                error,
            }),
            Err(_) => emit(CompletionEvent::Failed {
                completion_id,
                error: RemoteError::new("provider panicked"),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) && self.is_active_completion(completion_id) {
            emit(CompletionEvent::Failed {
                completion_id,
                error: RemoteError::new("provider exited without a terminal event"),
            });
        }
    }

    fn dispatch(&self, event: CompletionEvent) {
        let fragment = match &event {
            CompletionEvent::Chunk {
                completion_id,
                text,
            } => Some((*completion_id, text.clone())),
            _ => None,
        };
        let outcome = lock_unpoisoned(&self.session).apply_event(event);
        self.notify(&outcome, fragment.as_ref().map(|(id, text)| (*id, text.as_str())));
    }

    fn notify(&self, outcome: &ReconcileOutcome, fragment: Option<(CompletionId, &str)>) {
        match outcome {
            ReconcileOutcome::Ignored => {}
            ReconcileOutcome::Applied => {
                if let Some((completion_id, text)) = fragment {
                    self.observer.on_fragment(completion_id, text);
                }
            }
            ReconcileOutcome::Finalized { reply } => self.observer.on_finished(reply),
            ReconcileOutcome::Aborted {
                error,
                kept_partial,
            } => self.observer.on_failed(error, kept_partial.as_ref()),
        }
    }

    fn retire(&self, mut previous: ActiveCompletion) {
        let finished = previous
            .join_handle
            .as_ref()
            .map_or(true, JoinHandle::is_finished);
        if finished {
            if let Some(join_handle) = previous.join_handle.take() {
                let _ = join_handle.join();
            }
            return;
        }
        tracing::debug!(
            completion_id = previous.completion_id,
            "replacing completion worker that is still winding down"
        );
        lock_unpoisoned(&self.retired).push(previous);
    }

    /// Joins retired workers that have exited; returns how many are still running.
    fn reap_retired(&self) -> usize {
        let mut retired = lock_unpoisoned(&self.retired);
        retired.retain_mut(|worker| {
            let finished = worker
                .join_handle
                .as_ref()
                .map_or(true, JoinHandle::is_finished);
            if finished {
                if let Some(join_handle) = worker.join_handle.take() {
                    let _ = join_handle.join();
                }
            }
            !finished
        });
        retired.len()
    }

    fn is_active_completion(&self, completion_id: CompletionId) -> bool {
        lock_unpoisoned(&self.session).active_completion() == Some(completion_id)
    }

    fn clear_active_if_matching(&self, completion_id: CompletionId) {
        let mut active = lock_unpoisoned(&self.active);
        let matches = active.as_ref().map(|active| active.completion_id) == Some(completion_id);
        if !matches {
            return;
        }

        let Some(mut completed) = active.take() else {
            return;
        };
        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime")
            .field("provider", &self.provider.profile().provider_id)
            .finish_non_exhaustive()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
