use completion_api::url::{
    DEEPSEEK_BASE_URL, DEFAULT_BASE_URL, MOONSHOT_BASE_URL, OPENAI_BASE_URL,
};
use completion_api::{chat_completions_url, resolve_base_url};

#[test]
fn known_endpoint_identifiers_resolve_to_fixed_addresses() {
    assert_eq!(resolve_base_url("/api/openai"), OPENAI_BASE_URL);
    assert_eq!(resolve_base_url("/api/deepseek"), DEEPSEEK_BASE_URL);
    assert_eq!(resolve_base_url("/api/moonshot"), MOONSHOT_BASE_URL);
    assert_eq!(resolve_base_url("  /api/openai "), OPENAI_BASE_URL);
}

#[test]
fn unknown_identifiers_fall_back_to_default_address() {
    assert_eq!(resolve_base_url(""), DEFAULT_BASE_URL);
    assert_eq!(resolve_base_url("/api/other"), DEFAULT_BASE_URL);
    assert_eq!(resolve_base_url("custom"), DEFAULT_BASE_URL);
    assert_eq!(resolve_base_url("ftp://example.com"), DEFAULT_BASE_URL);
}

#[test]
fn absolute_http_urls_are_kept_as_overrides() {
    assert_eq!(
        resolve_base_url("http://127.0.0.1:8080/v1/"),
        "http://127.0.0.1:8080/v1"
    );
    assert_eq!(
        resolve_base_url("https://llm.internal.example/openai"),
        "https://llm.internal.example/openai"
    );
}

#[test]
fn chat_completions_url_appends_path_once() {
    assert_eq!(
        chat_completions_url("https://api.openai.com/v1"),
        "https://api.openai.com/v1/chat/completions"
    );
    assert_eq!(
        chat_completions_url("https://api.openai.com/v1/"),
        "https://api.openai.com/v1/chat/completions"
    );
    assert_eq!(
        chat_completions_url("https://host/v1/chat/completions"),
        "https://host/v1/chat/completions"
    );
    assert_eq!(
        chat_completions_url(""),
        format!("{DEFAULT_BASE_URL}/chat/completions")
    );
}
