use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_provider::CompletionId;
use chat_session::{
    probe_connection, Companion, Gesture, Message, SessionError, SessionObserver, SessionRuntime,
};

use crate::avatar::TerminalAvatar;
use crate::commands::{parse_slash_command, SettingField, SlashCommand, HELP_TEXT};

/// Output shared by the input loop and the completion worker.
pub type SharedOutput = Arc<Mutex<dyn Write + Send>>;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Quit,
}

/// Prints replies as they arrive.
pub struct ConsoleObserver {
    out: SharedOutput,
    streaming: AtomicBool,
}

impl ConsoleObserver {
    pub fn new(out: SharedOutput) -> Self {
        Self {
            out,
            streaming: AtomicBool::new(false),
        }
    }

    fn end_stream_line(&self, out: &mut dyn Write) -> bool {
        let was_streaming = self.streaming.swap(false, Ordering::SeqCst);
        if was_streaming {
            let _ = writeln!(out);
        }
        was_streaming
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_fragment(&self, _completion_id: CompletionId, text: &str) {
        let mut out = lock_unpoisoned(&self.out);
        if !self.streaming.swap(true, Ordering::SeqCst) {
            let _ = write!(out, "assistant> ");
        }
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }

    fn on_finished(&self, reply: &Message) {
        let mut out = lock_unpoisoned(&self.out);
        if !self.end_stream_line(&mut *out) {
            let _ = writeln!(out, "assistant> {}", reply.content);
        }
        let _ = out.flush();
    }

    fn on_failed(&self, error: &Message, _kept_partial: Option<&Message>) {
        let mut out = lock_unpoisoned(&self.out);
        self.end_stream_line(&mut *out);
        let _ = writeln!(out, "{}", error.content);
        let _ = out.flush();
    }

    fn on_cleared(&self, interrupted: Option<CompletionId>) {
        if interrupted.is_none() {
            return;
        }
        let mut out = lock_unpoisoned(&self.out);
        if self.end_stream_line(&mut *out) {
            let _ = out.flush();
        }
    }
}

/// `Write` adapter over [`SharedOutput`].
pub struct SharedWriter(pub SharedOutput);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_unpoisoned(&self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock_unpoisoned(&self.0).flush()
    }
}

pub struct Repl {
    runtime: Arc<SessionRuntime>,
    companion: Companion,
    avatar: TerminalAvatar<SharedWriter>,
    out: SharedOutput,
}

impl Repl {
    pub fn new(runtime: Arc<SessionRuntime>, out: SharedOutput) -> Self {
        Self {
            runtime,
            companion: Companion::new(),
            avatar: TerminalAvatar::new(SharedWriter(Arc::clone(&out))),
            out,
        }
    }

    pub fn greet(&self) {
        let (count, model) = self
            .runtime
            .with_session(|session| (session.messages().len(), session.settings().model.clone()));
        self.say(&format!(
            "chat ({model}, {count} saved messages). Type /help for commands."
        ));
    }

    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        let Some(command) = parse_slash_command(line) else {
            self.send(line);
            return LineOutcome::Continue;
        };

        match command {
            SlashCommand::Help => self.say(HELP_TEXT),
            SlashCommand::Clear => {
                self.runtime.clear();
                self.say("Conversation cleared.");
            }
            SlashCommand::Cancel => {
                if !self.runtime.cancel() {
                    self.say("Nothing to cancel.");
                }
            }
            SlashCommand::Quit => return LineOutcome::Quit,
            SlashCommand::Settings => self.show_settings(),
            SlashCommand::Set { field, value } => self.set(field, &value),
            SlashCommand::Ping => self.ping(),
            SlashCommand::Poke => self.gesture(Gesture::Click),
            SlashCommand::Drag => self.gesture(Gesture::Drag),
            SlashCommand::History => self.history(),
            SlashCommand::Usage(usage) => self.say(usage),
            SlashCommand::Unknown(command) => {
                self.say(&format!("Unknown command {command}. Type /help."));
            }
        }

        LineOutcome::Continue
    }

    /// Cancels any reply and waits briefly for the worker to wind down.
    pub fn shutdown(&self) {
        self.runtime.cancel();
        if !self.runtime.wait_idle(SHUTDOWN_GRACE) {
            tracing::warn!("completion worker still running at shutdown");
        }
    }

    fn send(&self, text: &str) {
        match self.runtime.send_message(text) {
            Ok(_) | Err(SessionError::EmptyMessage) => {}
            Err(SessionError::ConcurrentCompletion) => {
                self.say("A reply is still in progress; wait for it or use /cancel.");
            }
            Err(error) => self.say(&format!("Could not send: {error}")),
        }
    }

    fn show_settings(&self) {
        let settings = self.runtime.with_session(|session| session.settings().clone());
        self.say(&format!(
            "endpoint: {}\ncustom-endpoint: {}\nkey: {}\nmodel: {}\ntemperature: {}\nprompt: {}",
            settings.api_endpoint,
            settings.custom_endpoint,
            settings.masked_api_key(),
            settings.model,
            settings.temperature,
            settings.system_prompt,
        ));
    }

    fn set(&self, field: SettingField, value: &str) {
        let mut settings = self.runtime.with_session(|session| session.settings().clone());
        match field.apply(&mut settings, value) {
            Ok(()) => {
                self.runtime.update_settings(settings);
                self.say(&format!("{} updated.", field.name()));
            }
            Err(message) => self.say(&message),
        }
    }

    fn ping(&self) {
        let settings = self.runtime.with_session(|session| session.settings().clone());
        let provider = self.runtime.provider();
        let cancel = Arc::new(AtomicBool::new(false));
        match probe_connection(provider.as_ref(), &settings, &cancel) {
            Ok(reply) => self.say(&format!("Connection OK: {reply}")),
            Err(error) => self.say(&format!("Connection failed: {error}")),
        }
    }

    fn gesture(&mut self, gesture: Gesture) {
        let (transcript, settings) = self.runtime.with_session(|session| {
            (session.transcript().clone(), session.settings().clone())
        });
        let provider = self.runtime.provider();
        self.companion.handle(
            gesture,
            &mut self.avatar,
            provider.as_ref(),
            &transcript,
            &settings,
        );
    }

    fn history(&self) {
        let lines: Vec<String> = self.runtime.with_session(|session| {
            session
                .messages()
                .iter()
                .map(|message| format!("{}> {}", message.role.as_str(), message.content))
                .collect()
        });
        if lines.is_empty() {
            self.say("(no messages)");
        } else {
            self.say(&lines.join("\n"));
        }
    }

    fn say(&self, text: &str) {
        let mut out = lock_unpoisoned(&self.out);
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }
}

fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
