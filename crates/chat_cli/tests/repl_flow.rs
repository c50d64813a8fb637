use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_cli::repl::{ConsoleObserver, LineOutcome, Repl, SharedOutput};
use chat_provider::RemoteError;
use chat_provider_mock::{MockOutcome, MockProvider};
use chat_session::{ChatSession, ResponseMode, Role, SessionOptions, SessionRuntime};
use session_store::{FileKeyValueStore, MemoryKeyValueStore, SessionStore};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    repl: Repl,
    runtime: Arc<SessionRuntime>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl Harness {
    fn new(provider: MockProvider, mode: ResponseMode) -> Self {
        Self::with_store(
            SessionStore::new(MemoryKeyValueStore::new()),
            provider,
            mode,
        )
    }

    fn with_store(store: SessionStore, provider: MockProvider, mode: ResponseMode) -> Self {
        let output = Arc::new(Mutex::new(Vec::new()));
        let out: SharedOutput = output.clone();
        let session = ChatSession::open(
            store,
            SessionOptions {
                response_mode: mode,
                ..SessionOptions::default()
            },
        );
        let runtime = SessionRuntime::new(
            session,
            Arc::new(provider),
            Arc::new(ConsoleObserver::new(Arc::clone(&out))),
        );
        let repl = Repl::new(Arc::clone(&runtime), out);
        Self {
            repl,
            runtime,
            output,
        }
    }

    fn line(&mut self, line: &str) -> LineOutcome {
        let outcome = self.repl.handle_line(line);
        assert!(self.runtime.wait_idle(WAIT), "runtime should settle");
        outcome
    }

    fn output(&self) -> String {
        String::from_utf8(lock_unpoisoned(&self.output).clone()).expect("utf8 output")
    }

    fn roles(&self) -> Vec<Role> {
        self.runtime
            .with_session(|session| session.messages().iter().map(|m| m.role).collect())
    }
}

fn chunks(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[test]
fn plain_text_streams_reply_to_output() {
    let mut harness = Harness::new(
        MockProvider::new(chunks(&["Hel", "lo"])),
        ResponseMode::Streaming,
    );

    assert_eq!(harness.line("hi"), LineOutcome::Continue);

    assert!(harness.output().contains("assistant> Hello\n"));
    assert_eq!(harness.roles(), vec![Role::User, Role::Assistant]);
}

#[test]
fn single_shot_reply_is_printed_whole() {
    let mut harness = Harness::new(MockProvider::new(chunks(&["po", "ng"])), ResponseMode::SingleShot);

    harness.line("ping");

    assert!(harness.output().contains("assistant> pong\n"));
}

#[test]
fn failures_print_the_error_entry() {
    let mut harness = Harness::new(
        MockProvider::scripted(vec![MockOutcome::Fail {
            chunks: Vec::new(),
            error: RemoteError::with_status(429, "Rate limit reached"),
        }]),
        ResponseMode::Streaming,
    );

    harness.line("hi");

    assert!(harness
        .output()
        .contains("Error: Rate limit reached (HTTP 429)\n"));
    assert_eq!(harness.roles(), vec![Role::User, Role::Error]);
}

#[test]
fn send_while_streaming_prints_notice_and_cancel_recovers() {
    let mut harness = Harness::new(
        MockProvider::scripted(vec![MockOutcome::Hang(chunks(&["thinking"]))]),
        ResponseMode::Streaming,
    );

    harness.repl.handle_line("first");
    harness.repl.handle_line("second");
    assert!(harness.output().contains("A reply is still in progress"));

    harness.line("/cancel");
    assert!(harness.output().contains("Error: request was cancelled"));
    assert_eq!(harness.roles(), vec![Role::User, Role::Error]);

    harness.line("/cancel");
    assert!(harness.output().contains("Nothing to cancel."));
}

#[test]
fn clear_mid_stream_ends_the_partial_output_line() {
    let mut harness = Harness::new(
        MockProvider::scripted(vec![MockOutcome::Hang(chunks(&["thin"]))]),
        ResponseMode::Streaming,
    );

    harness.repl.handle_line("first");
    let deadline = std::time::Instant::now() + WAIT;
    while !harness.output().contains("assistant> thin") {
        assert!(std::time::Instant::now() < deadline, "fragment never printed");
        std::thread::sleep(Duration::from_millis(5));
    }
    harness.line("/clear");

    assert!(harness
        .output()
        .contains("assistant> thin\nConversation cleared.\n"));
    assert!(harness.roles().is_empty());
}

#[test]
fn set_settings_history_and_clear() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut harness = Harness::with_store(
        SessionStore::new(FileKeyValueStore::new(dir.path())),
        MockProvider::new(chunks(&["ok"])),
        ResponseMode::Streaming,
    );

    harness.line("/set key sk-secret-9876");
    harness.line("/set model deepseek-chat");
    harness.line("/set temperature warm");
    harness.line("/settings");
    let output = harness.output();
    assert!(output.contains("key updated."));
    assert!(output.contains("temperature must be a number"));
    assert!(output.contains("key: **********9876"));
    assert!(!output.contains("sk-secret-9876"));
    assert!(output.contains("model: deepseek-chat"));

    harness.line("hello");
    harness.line("/history");
    assert!(harness.output().contains("user> hello\nassistant> ok\n"));

    harness.line("/clear");
    assert!(harness.roles().is_empty());

    let reopened = ChatSession::open(
        SessionStore::new(FileKeyValueStore::new(dir.path())),
        SessionOptions::default(),
    );
    assert!(reopened.messages().is_empty());
    assert_eq!(reopened.settings().model, "deepseek-chat");
}

#[test]
fn ping_reports_probe_result() {
    let mut harness = Harness::new(
        MockProvider::scripted(vec![
            MockOutcome::Reply(chunks(&["pong"])),
            MockOutcome::Abort(RemoteError::with_status(401, "invalid key")),
        ]),
        ResponseMode::Streaming,
    );

    harness.line("/ping");
    harness.line("/ping");

    let output = harness.output();
    assert!(output.contains("Connection OK: pong"));
    assert!(output.contains("Connection failed: invalid key (HTTP 401)"));
    assert!(harness.roles().is_empty());
}

#[test]
fn companion_gestures_print_avatar_lines() {
    let mut harness = Harness::new(
        MockProvider::new(chunks(&["It looks like you're testing."])),
        ResponseMode::Streaming,
    );

    harness.line("/drag");
    harness.line("/poke");

    let output = harness.output();
    assert!(output.contains("*wiggles*"));
    assert!(output.contains("*Searching...*"));
    assert!(output.contains("\"It looks like you're testing.\""));
}

#[test]
fn unknown_commands_and_quit() {
    let mut harness = Harness::new(MockProvider::new(Vec::new()), ResponseMode::Streaming);

    assert_eq!(harness.line("/frobnicate"), LineOutcome::Continue);
    assert!(harness.output().contains("Unknown command /frobnicate"));
    assert_eq!(harness.line("/quit"), LineOutcome::Quit);
    harness.repl.shutdown();
}
