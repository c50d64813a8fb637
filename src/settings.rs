//! User-editable completion settings.

use session_store::SettingsRecord;

pub const DEFAULT_API_ENDPOINT: &str = "/api/openai";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Endpoint identifier that selects `custom_endpoint`.
pub const CUSTOM_ENDPOINT_ID: &str = "custom";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Clippy, the office assistant from the Windows 98 era. \
Keep replies short and playful, never more than fifty words. Like to open with \
\"It looks like you need help\" or \"I noticed you're...\". Add little actions such as \
(taps on the screen) or (straightens bow tie) to feel interactive. Be curious and eager, \
occasionally a bit annoying, because that is your charm. Do not use lists or code blocks; \
keep it conversational.";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    /// Endpoint identifier (`/api/openai`, `/api/deepseek`, `/api/moonshot`, `custom`) or URL.
    pub api_endpoint: String,
    pub custom_endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            custom_endpoint: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Settings {
    /// Builds settings from a persisted record, defaulting each field on its own.
    ///
    /// Empty strings fall back to the default just like missing fields.
    #[must_use]
    pub fn from_record(record: Option<SettingsRecord>) -> Self {
        let defaults = Self::default();
        let Some(record) = record else {
            return defaults;
        };

        Self {
            api_key: record.api_key.unwrap_or_default(),
            api_endpoint: non_empty_or(record.api_endpoint, defaults.api_endpoint),
            custom_endpoint: record.custom_endpoint.unwrap_or_default(),
            model: non_empty_or(record.model, defaults.model),
            temperature: record
                .temperature
                .filter(|value| value.is_finite())
                .unwrap_or(defaults.temperature),
            system_prompt: non_empty_or(record.system_prompt, defaults.system_prompt),
        }
    }

    #[must_use]
    pub fn to_record(&self) -> SettingsRecord {
        SettingsRecord {
            api_key: Some(self.api_key.clone()),
            api_endpoint: Some(self.api_endpoint.clone()),
            custom_endpoint: Some(self.custom_endpoint.clone()),
            model: Some(self.model.clone()),
            temperature: Some(self.temperature),
            system_prompt: Some(self.system_prompt.clone()),
        }
    }

    /// `custom_endpoint` when the identifier is `custom`, else `api_endpoint`.
    #[must_use]
    pub fn effective_endpoint(&self) -> &str {
        if self.api_endpoint == CUSTOM_ENDPOINT_ID {
            &self.custom_endpoint
        } else {
            &self.api_endpoint
        }
    }

    /// API key with everything but the last four characters hidden.
    #[must_use]
    pub fn masked_api_key(&self) -> String {
        let count = self.api_key.chars().count();
        if count == 0 {
            return "(not set)".to_string();
        }
        if count <= 4 {
            return "*".repeat(count);
        }
        let tail: String = self.api_key.chars().skip(count - 4).collect();
        format!("{}{tail}", "*".repeat(count - 4))
    }
}

fn non_empty_or(value: Option<String>, fallback: String) -> String {
    value.filter(|value| !value.is_empty()).unwrap_or(fallback)
}
