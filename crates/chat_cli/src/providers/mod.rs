use std::sync::Arc;
use std::time::Duration;

use chat_provider::CompletionProvider;
use chat_provider_mock::{MockProvider, MOCK_PROVIDER_ID};
use chat_provider_openai::{
    OpenAiCompatibleProvider, OpenAiProviderConfig, OPENAI_COMPATIBLE_PROVIDER_ID,
};

pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const PROVIDER_ENV_VAR: &str = "CHAT_PROVIDER";

pub fn provider_from_env(
    timeout: Option<Duration>,
) -> Result<Arc<dyn CompletionProvider>, String> {
    let provider_id = std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID), timeout)
}

pub fn provider_for_id(
    provider_id: &str,
    timeout: Option<Duration>,
) -> Result<Arc<dyn CompletionProvider>, String> {
    match provider_id {
        DEFAULT_PROVIDER_ID | OPENAI_COMPATIBLE_PROVIDER_ID => {
            let mut config = OpenAiProviderConfig::default();
            if let Some(timeout) = timeout {
                config = config.with_timeout(timeout);
            }
            let provider = OpenAiCompatibleProvider::new(config)
                .map_err(|error| format!("Failed to initialise provider: {error}"))?;
            Ok(Arc::new(provider))
        }
        MOCK_PROVIDER_ID => Ok(Arc::new(MockProvider::default())),
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {DEFAULT_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        )),
    }
}
