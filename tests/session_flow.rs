use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_provider::{
    CancelSignal, CompletionEvent, CompletionProvider, CompletionRequest, ProviderProfile,
    RemoteError, WireRole,
};
use chat_provider_mock::{MockOutcome, MockProvider};
use chat_session::{
    ChatSession, Message, PartialReplyPolicy, ResponseMode, Role, SessionError, SessionObserver,
    SessionOptions, SessionRuntime, PLACEHOLDER,
};
use session_store::{MemoryKeyValueStore, SessionStore};

const WAIT: Duration = Duration::from_secs(5);

fn options(mode: ResponseMode) -> SessionOptions {
    SessionOptions {
        response_mode: mode,
        partial_replies: PartialReplyPolicy::Discard,
    }
}

fn runtime_with(
    provider: Arc<dyn CompletionProvider>,
    mode: ResponseMode,
    observer: Arc<dyn SessionObserver>,
) -> Arc<SessionRuntime> {
    let session = ChatSession::open(SessionStore::new(MemoryKeyValueStore::new()), options(mode));
    SessionRuntime::new(session, provider, observer)
}

fn runtime(provider: Arc<dyn CompletionProvider>, mode: ResponseMode) -> Arc<SessionRuntime> {
    runtime_with(provider, mode, Arc::new(chat_session::NoopObserver))
}

fn snapshot(runtime: &SessionRuntime) -> Vec<(Role, String)> {
    runtime.with_session(|session| {
        session
            .messages()
            .iter()
            .map(|message| (message.role, message.content.clone()))
            .collect()
    })
}

fn chunks(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[derive(Default)]
struct RecordingObserver {
    fragments: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    failed: Mutex<Vec<String>>,
}

impl SessionObserver for RecordingObserver {
    fn on_fragment(&self, _completion_id: u64, text: &str) {
        self.fragments.lock().expect("lock").push(text.to_string());
    }

    fn on_finished(&self, reply: &Message) {
        self.finished.lock().expect("lock").push(reply.content.clone());
    }

    fn on_failed(&self, error: &Message, _kept_partial: Option<&Message>) {
        self.failed.lock().expect("lock").push(error.content.clone());
    }
}

#[test]
fn single_shot_sends_alternate_user_and_assistant() {
    let runtime = runtime(
        Arc::new(MockProvider::new(chunks(&["pong"]))),
        ResponseMode::SingleShot,
    );

    for turn in 0..3 {
        runtime
            .send_message(&format!("ping {turn}"))
            .expect("send should start");
        assert!(runtime.wait_idle(WAIT), "turn {turn} should complete");
    }

    let messages = snapshot(&runtime);
    assert_eq!(messages.len(), 6);
    for (index, (role, content)) in messages.iter().enumerate() {
        if index % 2 == 0 {
            assert_eq!(*role, Role::User);
        } else {
            assert_eq!(*role, Role::Assistant);
            assert_eq!(content, "pong");
        }
    }
}

#[test]
fn streamed_fragments_finalize_into_one_reply() {
    let observer = Arc::new(RecordingObserver::default());
    let runtime = runtime_with(
        Arc::new(MockProvider::new(chunks(&["Hel", "lo"]))),
        ResponseMode::Streaming,
        observer.clone(),
    );

    runtime.send_message("hi").expect("send should start");
    assert!(runtime.wait_idle(WAIT));

    assert_eq!(
        snapshot(&runtime),
        vec![
            (Role::User, "hi".to_string()),
            (Role::Assistant, "Hello".to_string())
        ]
    );
    assert_eq!(*observer.fragments.lock().expect("lock"), chunks(&["Hel", "lo"]));
    assert_eq!(*observer.finished.lock().expect("lock"), chunks(&["Hello"]));
    assert!(observer.failed.lock().expect("lock").is_empty());
}

#[test]
fn wire_request_carries_system_entry_and_excludes_errors() {
    let provider = Arc::new(MockProvider::scripted(vec![
        MockOutcome::Fail {
            chunks: Vec::new(),
            error: RemoteError::with_status(500, "boom"),
        },
        MockOutcome::Reply(chunks(&["ok"])),
    ]));
    let runtime = runtime(provider.clone(), ResponseMode::Streaming);

    runtime.send_message("first").expect("send should start");
    assert!(runtime.wait_idle(WAIT));
    runtime.send_message("second").expect("send should start");
    assert!(runtime.wait_idle(WAIT));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let roles: Vec<WireRole> = requests[1]
        .messages
        .iter()
        .map(|message| message.role)
        .collect();
    assert_eq!(roles, vec![WireRole::System, WireRole::User, WireRole::User]);
    assert!(requests[1]
        .messages
        .iter()
        .all(|message| !message.content.starts_with("Error:")));
}

#[test]
fn failure_before_first_fragment_leaves_one_error_entry() {
    let runtime = runtime(
        Arc::new(MockProvider::scripted(vec![MockOutcome::Fail {
            chunks: Vec::new(),
            error: RemoteError::with_status(401, "Incorrect API key provided"),
        }])),
        ResponseMode::Streaming,
    );

    runtime.send_message("hi").expect("send should start");
    assert!(runtime.wait_idle(WAIT));

    assert_eq!(
        snapshot(&runtime),
        vec![
            (Role::User, "hi".to_string()),
            (
                Role::Error,
                "Error: Incorrect API key provided (HTTP 401)".to_string()
            )
        ]
    );
    assert!(snapshot(&runtime)
        .iter()
        .all(|(_, content)| content != PLACEHOLDER));
}

#[test]
fn mid_stream_failure_follows_partial_reply_policy() {
    for (policy, expected) in [
        (PartialReplyPolicy::Discard, vec![Role::User, Role::Error]),
        (
            PartialReplyPolicy::Keep,
            vec![Role::User, Role::Assistant, Role::Error],
        ),
    ] {
        let session = ChatSession::open(
            SessionStore::new(MemoryKeyValueStore::new()),
            SessionOptions {
                response_mode: ResponseMode::Streaming,
                partial_replies: policy,
            },
        );
        let runtime = SessionRuntime::new(
            session,
            Arc::new(MockProvider::scripted(vec![MockOutcome::Fail {
                chunks: chunks(&["par", "tial"]),
                error: RemoteError::new("connection reset"),
            }])),
            Arc::new(chat_session::NoopObserver),
        );

        runtime.send_message("hi").expect("send should start");
        assert!(runtime.wait_idle(WAIT));

        let roles: Vec<Role> = snapshot(&runtime).into_iter().map(|(role, _)| role).collect();
        assert_eq!(roles, expected, "policy {policy:?}");
    }
}

#[test]
fn provider_error_without_events_becomes_failure() {
    let runtime = runtime(
        Arc::new(MockProvider::scripted(vec![MockOutcome::Abort(
            RemoteError::new("API key is required"),
        )])),
        ResponseMode::Streaming,
    );

    runtime.send_message("hi").expect("send should start");
    assert!(runtime.wait_idle(WAIT));

    assert_eq!(
        snapshot(&runtime),
        vec![
            (Role::User, "hi".to_string()),
            (Role::Error, "Error: API key is required".to_string())
        ]
    );
}

struct SilentProvider;

impl CompletionProvider for SilentProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: "silent".to_string(),
            display_name: "Silent".to_string(),
        }
    }

    fn complete(
        &self,
        _req: &CompletionRequest,
        _cancel: &CancelSignal,
    ) -> Result<String, RemoteError> {
        Ok(String::new())
    }

    fn stream(
        &self,
        req: CompletionRequest,
        _cancel: CancelSignal,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<(), RemoteError> {
        emit(CompletionEvent::Started {
            completion_id: req.completion_id,
        });
        emit(CompletionEvent::Chunk {
            completion_id: req.completion_id,
            text: "half".to_string(),
        });
        Ok(())
    }
}

struct PanickingProvider;

impl CompletionProvider for PanickingProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: "panicking".to_string(),
            display_name: "Panicking".to_string(),
        }
    }

    fn complete(
        &self,
        _req: &CompletionRequest,
        _cancel: &CancelSignal,
    ) -> Result<String, RemoteError> {
        panic!("complete exploded");
    }

    fn stream(
        &self,
        _req: CompletionRequest,
        _cancel: CancelSignal,
        _emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<(), RemoteError> {
        panic!("stream exploded");
    }
}

#[test]
fn provider_exiting_without_terminal_event_is_failed() {
    let runtime = runtime(Arc::new(SilentProvider), ResponseMode::Streaming);

    runtime.send_message("hi").expect("send should start");
    assert!(runtime.wait_idle(WAIT));

    assert_eq!(
        snapshot(&runtime),
        vec![
            (Role::User, "hi".to_string()),
            (
                Role::Error,
                "Error: provider exited without a terminal event".to_string()
            )
        ]
    );
}

#[test]
fn panicking_provider_is_contained() {
    for mode in [ResponseMode::Streaming, ResponseMode::SingleShot] {
        let runtime = runtime(Arc::new(PanickingProvider), mode);

        runtime.send_message("hi").expect("send should start");
        assert!(runtime.wait_idle(WAIT));

        assert_eq!(
            snapshot(&runtime).last(),
            Some(&(Role::Error, "Error: provider panicked".to_string())),
            "mode {mode:?}"
        );
    }
}

#[test]
fn send_while_streaming_is_rejected_without_changes() {
    let runtime = runtime(
        Arc::new(MockProvider::scripted(vec![MockOutcome::Hang(chunks(&["wait"]))])),
        ResponseMode::Streaming,
    );

    runtime.send_message("first").expect("send should start");
    let before = snapshot(&runtime);

    assert!(matches!(
        runtime.send_message("second"),
        Err(SessionError::ConcurrentCompletion)
    ));
    assert_eq!(snapshot(&runtime).len(), before.len());

    assert!(runtime.cancel());
    assert!(runtime.wait_idle(WAIT));
}

#[test]
fn blank_message_is_rejected() {
    let runtime = runtime(Arc::new(MockProvider::new(Vec::new())), ResponseMode::Streaming);
    assert!(matches!(
        runtime.send_message(" \n"),
        Err(SessionError::EmptyMessage)
    ));
    assert!(snapshot(&runtime).is_empty());
}
