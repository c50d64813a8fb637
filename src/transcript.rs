//! Ordered conversation transcript with at most one in-progress assistant message.

use thiserror::Error;

use crate::message::{Message, Role};

/// Content shown in an assistant message before its first fragment arrives.
pub const PLACEHOLDER: &str = "…";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("a completion is already in progress")]
    ConcurrentCompletion,
    #[error("an assistant message is already in progress")]
    AlreadyInProgress,
    #[error("no completion is in progress")]
    NoActiveCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InProgress {
    index: usize,
    received_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
    in_progress: Option<InProgress>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a transcript from committed messages; nothing is in progress.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            in_progress: None,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn has_in_progress(&self) -> bool {
        self.in_progress.is_some()
    }

    /// The in-progress assistant message, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<&Message> {
        self.in_progress
            .and_then(|in_progress| self.messages.get(in_progress.index))
    }

    /// True for the in-progress message while it still holds only the placeholder.
    #[must_use]
    pub fn is_pending_placeholder(&self, index: usize) -> bool {
        self.in_progress
            .is_some_and(|in_progress| in_progress.index == index && !in_progress.received_content)
    }

    /// Every message except the in-progress one.
    pub fn committed(&self) -> impl Iterator<Item = &Message> {
        let skip = self.in_progress.map(|in_progress| in_progress.index);
        self.messages
            .iter()
            .enumerate()
            .filter(move |(index, _)| Some(*index) != skip)
            .map(|(_, message)| message)
    }

    /// Latest user message content.
    #[must_use]
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }

    pub fn append(&mut self, message: Message) -> Result<(), TranscriptError> {
        if message.role == Role::User && self.in_progress.is_some() {
            return Err(TranscriptError::ConcurrentCompletion);
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn begin_assistant_placeholder(&mut self) -> Result<(), TranscriptError> {
        if self.in_progress.is_some() {
            return Err(TranscriptError::AlreadyInProgress);
        }
        self.messages.push(Message::assistant(PLACEHOLDER));
        self.in_progress = Some(InProgress {
            index: self.messages.len() - 1,
            received_content: false,
        });
        Ok(())
    }

    pub fn apply_fragment(&mut self, text: &str) -> Result<(), TranscriptError> {
        let message = self.in_progress_mut()?;
        message.content.push_str(text);
        self.mark_received();
        Ok(())
    }

    pub fn replace_in_progress_content(&mut self, text: &str) -> Result<(), TranscriptError> {
        let message = self.in_progress_mut()?;
        message.content.clear();
        message.content.push_str(text);
        self.mark_received();
        Ok(())
    }

    /// Clears the in-progress marker; the message keeps its content.
    pub fn finalize_completion(&mut self) -> Result<&Message, TranscriptError> {
        let in_progress = self
            .in_progress
            .take()
            .ok_or(TranscriptError::NoActiveCompletion)?;
        self.messages
            .get(in_progress.index)
            .ok_or(TranscriptError::NoActiveCompletion)
    }

    /// Removes the in-progress message.
    pub fn abort_completion(&mut self) -> Result<Message, TranscriptError> {
        let in_progress = self
            .in_progress
            .take()
            .ok_or(TranscriptError::NoActiveCompletion)?;
        if in_progress.index >= self.messages.len() {
            return Err(TranscriptError::NoActiveCompletion);
        }
        Ok(self.messages.remove(in_progress.index))
    }

    /// Keeps the partial in-progress message as a finalized entry.
    pub fn release_in_progress(&mut self) -> Result<&Message, TranscriptError> {
        self.finalize_completion()
    }

    pub fn append_error(&mut self, text: impl Into<String>) -> &Message {
        self.messages.push(Message::error(text));
        &self.messages[self.messages.len() - 1]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_progress = None;
    }

    fn in_progress_mut(&mut self) -> Result<&mut Message, TranscriptError> {
        let index = self
            .in_progress
            .map(|in_progress| in_progress.index)
            .ok_or(TranscriptError::NoActiveCompletion)?;
        self.messages
            .get_mut(index)
            .ok_or(TranscriptError::NoActiveCompletion)
    }

    fn mark_received(&mut self) {
        if let Some(in_progress) = self.in_progress.as_mut() {
            in_progress.received_content = true;
        }
    }
}
