//! Animated assistant companion that comments on the latest user message.
//!
//! The companion reads the transcript but never mutates it. All drawing is
//! behind [`AssistantAvatar`], so any front end can host it.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chat_provider::{
    CancelSignal, CompletionId, CompletionProvider, CompletionRequest, RemoteError, WireMessage,
};

use crate::settings::Settings;
use crate::transcript::Transcript;

pub const SEARCHING_CUE: &str = "Searching";
pub const COMPANION_MAX_TOKENS: u32 = 50;
pub const COMPANION_TEMPERATURE: f64 = 0.7;
const COMPANION_COMPLETION_ID: CompletionId = 0;

pub const COMPANION_PROMPT: &str = "You are Clippy and may only answer with a single sentence. \
Never use Markdown and never provide code. Always start with \"It looks like...\" or \
\"I noticed...\", staying lively but slightly annoying.";

/// Sent in place of the latest user message when the user has not spoken yet.
pub const NO_USER_MESSAGE: &str = "The user hasn't said anything yet";

pub const KEY_HINT: &str = "It looks like there's a problem with the API key... want to check the settings?";
pub const NETWORK_HINT: &str =
    "It looks like the network connection is having trouble... want to check the API address?";
pub const GENERIC_HINT: &str = "I ran into a problem... want to check the API settings?";

/// Capabilities the companion needs from whatever draws it.
pub trait AssistantAvatar {
    fn play(&mut self, cue: &str);
    fn speak(&mut self, text: &str);
    fn stop(&mut self);
    fn animate(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    Drag,
}

#[derive(Debug, Default, Clone)]
pub struct Companion {
    last_prompt: Option<String>,
    cached_reply: Option<String>,
}

impl Companion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cached_reply(&self) -> Option<&str> {
        self.cached_reply.as_deref()
    }

    pub fn handle(
        &mut self,
        gesture: Gesture,
        avatar: &mut dyn AssistantAvatar,
        provider: &dyn CompletionProvider,
        transcript: &Transcript,
        settings: &Settings,
    ) {
        match gesture {
            Gesture::Drag => self.on_drag(avatar),
            Gesture::Click => self.on_click(avatar, provider, transcript, settings),
        }
    }

    pub fn on_drag(&self, avatar: &mut dyn AssistantAvatar) {
        avatar.animate();
    }

    pub fn on_click(
        &mut self,
        avatar: &mut dyn AssistantAvatar,
        provider: &dyn CompletionProvider,
        transcript: &Transcript,
        settings: &Settings,
    ) {
        avatar.stop();
        avatar.play(SEARCHING_CUE);

        let prompt = transcript
            .last_user_content()
            .unwrap_or(NO_USER_MESSAGE)
            .to_string();

        if self.last_prompt.as_deref() == Some(prompt.as_str()) {
            if let Some(cached) = self.cached_reply.as_deref().filter(|reply| !reply.is_empty()) {
                avatar.stop();
                avatar.speak(cached);
                avatar.animate();
                return;
            }
        }

        let request = companion_request(settings, &prompt);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        match provider.complete(&request, &cancel) {
            Ok(reply) => {
                avatar.stop();
                avatar.speak(&reply);
                avatar.animate();
                self.last_prompt = Some(prompt);
                self.cached_reply = Some(reply);
            }
            Err(error) => {
                tracing::warn!(%error, "companion request failed");
                avatar.stop();
                avatar.speak(hint_for(&error));
                avatar.animate();
            }
        }
    }
}

#[must_use]
pub fn companion_request(settings: &Settings, prompt: &str) -> CompletionRequest {
    CompletionRequest {
        completion_id: COMPANION_COMPLETION_ID,
        endpoint: settings.effective_endpoint().to_string(),
        api_key: settings.api_key.clone(),
        model: settings.model.clone(),
        temperature: COMPANION_TEMPERATURE,
        messages: vec![WireMessage::system(COMPANION_PROMPT), WireMessage::user(prompt)],
        max_tokens: Some(COMPANION_MAX_TOKENS),
    }
}

/// Picks the spoken hint for a failed companion request.
#[must_use]
pub fn hint_for(error: &RemoteError) -> &'static str {
    let text = error.to_string().to_lowercase();
    if text.contains("key") {
        KEY_HINT
    } else if text.contains("network") || text.contains("connect") {
        NETWORK_HINT
    } else {
        GENERIC_HINT
    }
}
