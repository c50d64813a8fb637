//! One-turn connectivity check against the configured endpoint.

use chat_provider::{
    CancelSignal, CompletionId, CompletionProvider, CompletionRequest, RemoteError, WireMessage,
};

use crate::settings::Settings;

pub const PROBE_CONTENT: &str = "ping!";
pub const PROBE_MAX_TOKENS: u32 = 10;
const PROBE_COMPLETION_ID: CompletionId = 0;

/// Request used by [`probe_connection`]: a single user turn, no system entry.
#[must_use]
pub fn probe_request(settings: &Settings) -> CompletionRequest {
    CompletionRequest {
        completion_id: PROBE_COMPLETION_ID,
        endpoint: settings.effective_endpoint().to_string(),
        api_key: settings.api_key.clone(),
        model: settings.model.clone(),
        temperature: settings.temperature,
        messages: vec![WireMessage::user(PROBE_CONTENT)],
        max_tokens: Some(PROBE_MAX_TOKENS),
    }
}

/// Sends the probe and returns the raw reply text. Never touches a transcript.
pub fn probe_connection(
    provider: &dyn CompletionProvider,
    settings: &Settings,
    cancel: &CancelSignal,
) -> Result<String, RemoteError> {
    let request = probe_request(settings);
    tracing::debug!(endpoint = %request.endpoint, model = %request.model, "probing connection");
    let result = provider.complete(&request, cancel);
    if let Err(error) = &result {
        tracing::info!(%error, "connection probe failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_provider::WireRole;

    #[test]
    fn probe_request_has_one_user_turn_and_token_cap() {
        let settings = Settings {
            api_endpoint: "/api/moonshot".to_string(),
            temperature: 0.3,
            ..Settings::default()
        };
        let request = probe_request(&settings);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, WireRole::User);
        assert_eq!(request.messages[0].content, "ping!");
        assert_eq!(request.max_tokens, Some(10));
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.endpoint, "/api/moonshot");
    }
}
