use url::Url;

/// Endpoint identifier for the OpenAI API.
pub const ENDPOINT_OPENAI: &str = "/api/openai";
/// Endpoint identifier for the DeepSeek API.
pub const ENDPOINT_DEEPSEEK: &str = "/api/deepseek";
/// Endpoint identifier for the Moonshot API.
pub const ENDPOINT_MOONSHOT: &str = "/api/moonshot";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const MOONSHOT_BASE_URL: &str = "https://api.moonshot.cn/v1";

/// Base address used for any identifier that is neither known nor a custom URL.
pub const DEFAULT_BASE_URL: &str = MOONSHOT_BASE_URL;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Resolve a configured endpoint identifier to a base address.
///
/// Resolution rules:
/// 1) the three provider identifiers map to their fixed base addresses
/// 2) an absolute `http`/`https` URL is a user-supplied override and is kept
/// 3) anything else resolves to [`DEFAULT_BASE_URL`]
pub fn resolve_base_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    match endpoint {
        ENDPOINT_OPENAI => return OPENAI_BASE_URL.to_string(),
        ENDPOINT_DEEPSEEK => return DEEPSEEK_BASE_URL.to_string(),
        ENDPOINT_MOONSHOT => return MOONSHOT_BASE_URL.to_string(),
        _ => {}
    }

    match Url::parse(endpoint) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
            endpoint.trim_end_matches('/').to_string()
        }
        _ => DEFAULT_BASE_URL.to_string(),
    }
}

/// Normalize a base address to its chat completions endpoint.
///
/// Keeps `/chat/completions` unchanged and appends it otherwise.
pub fn chat_completions_url(base_url: &str) -> String {
    let base = if base_url.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        base_url.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(CHAT_COMPLETIONS_PATH) {
        return trimmed.to_string();
    }
    format!("{trimmed}{CHAT_COMPLETIONS_PATH}")
}
