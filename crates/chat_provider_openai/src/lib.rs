//! OpenAI-compatible implementation of the shared `chat_provider` contract.
//!
//! This adapter resolves each request's endpoint identifier, drives the
//! `completion_api` transport on a private current-thread runtime and
//! translates stream events into `CompletionEvent` lifecycle events.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chat_provider::{
    CancelSignal, CompletionEvent, CompletionProvider, CompletionRequest, ProviderInitError,
    ProviderProfile, RemoteError, WireMessage,
};
use completion_api::{
    resolve_base_url, ChatCompletionRequest, ChatMessage, ChatStreamEvent, CompletionApiClient,
    CompletionApiConfig, CompletionApiError, FinishReason,
};

/// Stable provider identifier used for startup selection.
pub const OPENAI_COMPATIBLE_PROVIDER_ID: &str = "openai-compatible";

/// Runtime configuration shared by every request this provider issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenAiProviderConfig {
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl OpenAiProviderConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Resolved destination for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    base_url: String,
    api_key: String,
}

trait ChatClient: Send + Sync {
    fn stream(
        &self,
        target: &Target,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<Option<FinishReason>, CompletionApiError>;

    fn complete(
        &self,
        target: &Target,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, CompletionApiError>;
}

#[derive(Debug)]
struct DefaultChatClient {
    config: OpenAiProviderConfig,
}

impl DefaultChatClient {
    fn client_for(&self, target: &Target) -> Result<CompletionApiClient, CompletionApiError> {
        let mut config =
            CompletionApiConfig::new(target.api_key.clone()).with_base_url(target.base_url.clone());
        if let Some(timeout) = self.config.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            config = config.with_user_agent(user_agent);
        }
        CompletionApiClient::new(config)
    }

    fn runtime() -> Result<tokio::runtime::Runtime, CompletionApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                CompletionApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })
    }
}

impl ChatClient for DefaultChatClient {
    fn stream(
        &self,
        target: &Target,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<Option<FinishReason>, CompletionApiError> {
        let client = self.client_for(target)?;
        let runtime = Self::runtime()?;
        runtime.block_on(client.stream_with_handler(request, Some(cancel), |event| on_event(event)))
    }

    fn complete(
        &self,
        target: &Target,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, CompletionApiError> {
        let client = self.client_for(target)?;
        let runtime = Self::runtime()?;
        runtime.block_on(client.complete(request, Some(cancel)))
    }
}

/// `CompletionProvider` adapter for OpenAI-compatible chat completion services.
pub struct OpenAiCompatibleProvider {
    client: Arc<dyn ChatClient>,
}

impl OpenAiCompatibleProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, ProviderInitError> {
        // Probe client construction once so TLS backend failures surface at startup.
        let client = DefaultChatClient { config };
        client
            .client_for(&Target {
                base_url: resolve_base_url(""),
                api_key: String::new(),
            })
            .map_err(map_init_error)?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    #[cfg(test)]
    fn with_client_for_tests(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

impl CompletionProvider for OpenAiCompatibleProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: OPENAI_COMPATIBLE_PROVIDER_ID.to_string(),
            display_name: "OpenAI-compatible chat completions".to_string(),
        }
    }

    fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, RemoteError> {
        if cancel.load(Ordering::Acquire) {
            return Err(map_remote_error(CompletionApiError::Cancelled));
        }

        let target = target_for(req);
        let request = to_chat_request(req);
        tracing::debug!(
            completion_id = req.completion_id,
            base_url = %target.base_url,
            model = %request.model,
            "sending single-shot completion"
        );
        self.client
            .complete(&target, &request, cancel)
            .map_err(map_remote_error)
    }

    fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(CompletionEvent),
    ) -> Result<(), RemoteError> {
        let completion_id = req.completion_id;

        emit(CompletionEvent::Started { completion_id });

        if cancel.load(Ordering::Acquire) {
            emit(CompletionEvent::Cancelled { completion_id });
            return Ok(());
        }

        let target = target_for(&req);
        let request = to_chat_request(&req);
        tracing::debug!(
            completion_id,
            base_url = %target.base_url,
            model = %request.model,
            messages = request.messages.len(),
            "starting streamed completion"
        );

        let outcome = self
            .client
            .stream(&target, &request, &cancel, &mut |event| {
                if let ChatStreamEvent::ContentDelta { delta } = event {
                    if !delta.is_empty() {
                        emit(CompletionEvent::Chunk {
                            completion_id,
                            text: delta,
                        });
                    }
                }
            });

        match outcome {
            Ok(reason) => {
                tracing::debug!(
                    completion_id,
                    finish_reason = reason.map(|reason| reason.as_str()).unwrap_or("none"),
                    "streamed completion finished"
                );
                emit(CompletionEvent::Finished { completion_id });
            }
            Err(CompletionApiError::Cancelled) => emit(CompletionEvent::Cancelled { completion_id }),
            Err(error) => {
                tracing::warn!(completion_id, %error, "streamed completion failed");
                emit(CompletionEvent::Failed {
                    completion_id,
                    error: map_remote_error(error),
                });
            }
        }

        Ok(())
    }
}

fn target_for(req: &CompletionRequest) -> Target {
    Target {
        base_url: resolve_base_url(&req.endpoint),
        api_key: req.api_key.clone(),
    }
}

fn to_chat_request(req: &CompletionRequest) -> ChatCompletionRequest {
    let messages = req.messages.iter().map(to_chat_message).collect();
    let mut request =
        ChatCompletionRequest::new(req.model.clone(), messages).with_temperature(req.temperature);
    if let Some(max_tokens) = req.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    request
}

fn to_chat_message(message: &WireMessage) -> ChatMessage {
    ChatMessage::new(message.role.as_str(), message.content.clone())
}

fn map_remote_error(error: CompletionApiError) -> RemoteError {
    match error {
        CompletionApiError::Status(status, message) => {
            RemoteError::with_status(status.as_u16(), message)
        }
        other => match other.status() {
            Some(status) => RemoteError::with_status(status, other.to_string()),
            None => RemoteError::new(other.to_string()),
        },
    }
}

fn map_init_error(error: CompletionApiError) -> ProviderInitError {
    ProviderInitError::new(format!(
        "Failed to initialize {OPENAI_COMPATIBLE_PROVIDER_ID} provider: {error}"
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex, MutexGuard};

    use completion_api::url::{DEEPSEEK_BASE_URL, DEFAULT_BASE_URL};

    use super::*;

    enum FakeOutcome {
        Stream(Vec<ChatStreamEvent>, Result<Option<FinishReason>, CompletionApiError>),
        Complete(Result<String, CompletionApiError>),
    }

    struct FakeChatClient {
        observed: Mutex<Option<(Target, ChatCompletionRequest)>>,
        outcome: Mutex<Option<FakeOutcome>>,
    }

    impl FakeChatClient {
        fn new(outcome: FakeOutcome) -> Arc<Self> {
            Arc::new(Self {
                observed: Mutex::new(None),
                outcome: Mutex::new(Some(outcome)),
            })
        }

        fn observed(&self) -> Option<(Target, ChatCompletionRequest)> {
            lock(&self.observed).clone()
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().expect("test mutex should not be poisoned")
    }

    impl ChatClient for FakeChatClient {
        fn stream(
            &self,
            target: &Target,
            request: &ChatCompletionRequest,
            _cancel: &CancelSignal,
            on_event: &mut dyn FnMut(ChatStreamEvent),
        ) -> Result<Option<FinishReason>, CompletionApiError> {
            *lock(&self.observed) = Some((target.clone(), request.clone()));
            match lock(&self.outcome).take() {
                Some(FakeOutcome::Stream(events, result)) => {
                    for event in events {
                        on_event(event);
                    }
                    result
                }
                _ => panic!("fake stream outcome should be consumed exactly once"),
            }
        }

        fn complete(
            &self,
            target: &Target,
            request: &ChatCompletionRequest,
            _cancel: &CancelSignal,
        ) -> Result<String, CompletionApiError> {
            *lock(&self.observed) = Some((target.clone(), request.clone()));
            match lock(&self.outcome).take() {
                Some(FakeOutcome::Complete(result)) => result,
                _ => panic!("fake complete outcome should be consumed exactly once"),
            }
        }
    }

    fn request(endpoint: &str) -> CompletionRequest {
        CompletionRequest {
            completion_id: 9,
            endpoint: endpoint.to_string(),
            api_key: "sk-test".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            messages: vec![WireMessage::system("sys"), WireMessage::user("hello")],
            max_tokens: None,
        }
    }

    fn stream_events(provider: &OpenAiCompatibleProvider, cancelled: bool) -> Vec<CompletionEvent> {
        let cancel = Arc::new(AtomicBool::new(cancelled));
        let mut events = Vec::new();
        provider
            .stream(request("/api/deepseek"), cancel, &mut |event| {
                events.push(event)
            })
            .expect("stream should not return provider-level failure");
        events
    }

    #[test]
    fn profile_reports_openai_compatible_identity() {
        let client = FakeChatClient::new(FakeOutcome::Complete(Ok(String::new())));
        let provider = OpenAiCompatibleProvider::with_client_for_tests(client);
        assert_eq!(provider.profile().provider_id, OPENAI_COMPATIBLE_PROVIDER_ID);
    }

    #[test]
    fn stream_maps_deltas_to_chunks_and_success_to_finished() {
        let client = FakeChatClient::new(FakeOutcome::Stream(
            vec![
                ChatStreamEvent::ContentDelta {
                    delta: "Hello".to_string(),
                },
                ChatStreamEvent::Finished {
                    reason: Some(FinishReason::Stop),
                },
                ChatStreamEvent::ContentDelta {
                    delta: " world".to_string(),
                },
                ChatStreamEvent::Done,
            ],
            Ok(Some(FinishReason::Stop)),
        ));
        let provider =
            OpenAiCompatibleProvider::with_client_for_tests(Arc::clone(&client) as Arc<dyn ChatClient>);

        let events = stream_events(&provider, false);

        assert_eq!(
            events,
            vec![
                CompletionEvent::Started { completion_id: 9 },
                CompletionEvent::Chunk {
                    completion_id: 9,
                    text: "Hello".to_string(),
                },
                CompletionEvent::Chunk {
                    completion_id: 9,
                    text: " world".to_string(),
                },
                CompletionEvent::Finished { completion_id: 9 },
            ]
        );

        let (target, chat_request) = client.observed().expect("request should be observed");
        assert_eq!(target.base_url, DEEPSEEK_BASE_URL);
        assert_eq!(target.api_key, "sk-test");
        assert_eq!(chat_request.model, "deepseek-chat");
        assert_eq!(chat_request.temperature, Some(0.7));
        assert_eq!(chat_request.messages[0], ChatMessage::new("system", "sys"));
        assert_eq!(chat_request.messages[1], ChatMessage::new("user", "hello"));
    }

    #[test]
    fn stream_maps_cancelled_transport_to_cancelled_event() {
        let client = FakeChatClient::new(FakeOutcome::Stream(
            vec![ChatStreamEvent::ContentDelta {
                delta: "par".to_string(),
            }],
            Err(CompletionApiError::Cancelled),
        ));
        let provider = OpenAiCompatibleProvider::with_client_for_tests(client);

        let events = stream_events(&provider, false);

        assert!(matches!(
            events.last(),
            Some(CompletionEvent::Cancelled { completion_id: 9 })
        ));
    }

    #[test]
    fn stream_skips_transport_when_already_cancelled() {
        let client = FakeChatClient::new(FakeOutcome::Complete(Ok(String::new())));
        let provider =
            OpenAiCompatibleProvider::with_client_for_tests(Arc::clone(&client) as Arc<dyn ChatClient>);

        let events = stream_events(&provider, true);

        assert_eq!(
            events,
            vec![
                CompletionEvent::Started { completion_id: 9 },
                CompletionEvent::Cancelled { completion_id: 9 },
            ]
        );
        assert!(client.observed().is_none());
    }

    #[test]
    fn stream_maps_http_status_to_failed_event_with_status() {
        let client = FakeChatClient::new(FakeOutcome::Stream(
            Vec::new(),
            Err(CompletionApiError::Status(
                reqwest_status(401),
                "Incorrect API key provided".to_string(),
            )),
        ));
        let provider = OpenAiCompatibleProvider::with_client_for_tests(client);

        let events = stream_events(&provider, false);

        assert_eq!(
            events.last(),
            Some(&CompletionEvent::Failed {
                completion_id: 9,
                error: RemoteError::with_status(401, "Incorrect API key provided"),
            })
        );
    }

    #[test]
    fn complete_returns_reply_and_resolves_unknown_endpoint_to_default() {
        let client = FakeChatClient::new(FakeOutcome::Complete(Ok("pong".to_string())));
        let provider =
            OpenAiCompatibleProvider::with_client_for_tests(Arc::clone(&client) as Arc<dyn ChatClient>);
        let mut req = request("/api/unknown");
        req.max_tokens = Some(10);

        let reply = provider
            .complete(&req, &Arc::new(AtomicBool::new(false)))
            .expect("complete should succeed");

        assert_eq!(reply, "pong");
        let (target, chat_request) = client.observed().expect("request should be observed");
        assert_eq!(target.base_url, DEFAULT_BASE_URL);
        assert_eq!(chat_request.max_tokens, Some(10));
    }

    #[test]
    fn complete_maps_transport_failure_without_status() {
        let client = FakeChatClient::new(FakeOutcome::Complete(Err(
            CompletionApiError::MissingApiKey,
        )));
        let provider = OpenAiCompatibleProvider::with_client_for_tests(client);

        let error = provider
            .complete(&request("/api/openai"), &Arc::new(AtomicBool::new(false)))
            .expect_err("missing key should fail");

        assert_eq!(error, RemoteError::new("API key is required"));
    }

    fn reqwest_status(code: u16) -> completion_api::StatusCode {
        completion_api::StatusCode::from_u16(code).expect("valid status code")
    }
}
