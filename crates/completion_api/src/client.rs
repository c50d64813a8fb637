use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};

use crate::config::CompletionApiConfig;
use crate::error::{parse_error_message, CompletionApiError};
use crate::events::{ChatStreamEvent, FinishReason};
use crate::headers::build_headers;
use crate::payload::{ChatCompletionRequest, ChatCompletionResponse};
use crate::sse::SseStreamParser;
use crate::url::chat_completions_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct CompletionApiClient {
    http: Client,
    config: CompletionApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<ChatStreamEvent>,
    /// Last finish reason reported by the server, if any.
    pub finish_reason: Option<FinishReason>,
}

impl StreamResult {
    /// Concatenation of every content delta in arrival order.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                ChatStreamEvent::ContentDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl CompletionApiClient {
    pub fn new(config: CompletionApiConfig) -> Result<Self, CompletionApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(CompletionApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CompletionApiConfig {
        &self.config
    }

    pub fn endpoint_url(&self) -> String {
        chat_completions_url(&self.config.base_url)
    }

    pub fn build_headers(&self, streaming: bool) -> Result<HeaderMap, CompletionApiError> {
        let headers = build_headers(&self.config, streaming)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    CompletionApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    CompletionApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Build the POST for `request`, forcing the `stream` flag to `streaming`.
    pub fn build_request(
        &self,
        request: &ChatCompletionRequest,
        streaming: bool,
    ) -> Result<reqwest::RequestBuilder, CompletionApiError> {
        let headers = self.build_headers(streaming)?;
        let mut payload = request.clone();
        payload.stream = streaming;
        Ok(self
            .http
            .post(self.endpoint_url())
            .headers(headers)
            .json(&payload))
    }

    /// Send once. Non-success statuses are mapped to [`CompletionApiError::Status`].
    pub async fn send(
        &self,
        request: &ChatCompletionRequest,
        streaming: bool,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, CompletionApiError> {
        if is_cancelled(cancellation) {
            return Err(CompletionApiError::Cancelled);
        }

        let response = self.build_request(request, streaming)?.send();
        let response = await_or_cancel(response, cancellation)
            .await?
            .map_err(CompletionApiError::from)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        let message = parse_error_message(status, &body);
        tracing::debug!(status = status.as_u16(), %message, "completion request rejected");
        Err(CompletionApiError::Status(status, message))
    }

    /// Non-streaming completion. A `null` content is returned as an empty string.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, CompletionApiError> {
        let response = self.send(request, false, cancellation).await?;
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(CompletionApiError::from)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(CompletionApiError::MalformedResponse(
                "response contained no choices".to_owned(),
            ));
        };
        Ok(choice
            .message
            .and_then(|message| message.content)
            .unwrap_or_default())
    }

    /// Stream a completion, forwarding each parsed event to `on_event`.
    ///
    /// Returns the last reported finish reason. A body that ends without the
    /// `[DONE]` sentinel or a finish reason yields [`CompletionApiError::StreamIncomplete`].
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<Option<FinishReason>, CompletionApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let response = self.send(request, true, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut state = StreamState::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(CompletionApiError::Cancelled);
            }
            let chunk = chunk.map_err(CompletionApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut state, &mut on_event)?;
            }
            if state.done {
                break;
            }
        }

        if is_cancelled(cancellation) {
            return Err(CompletionApiError::Cancelled);
        }
        if !state.done && !state.finished {
            return Err(CompletionApiError::StreamIncomplete);
        }

        Ok(state.finish_reason)
    }

    pub async fn stream(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, CompletionApiError> {
        let mut events = Vec::new();
        let finish_reason = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult {
            events,
            finish_reason,
        })
    }
}

#[derive(Debug, Default)]
struct StreamState {
    finish_reason: Option<FinishReason>,
    finished: bool,
    done: bool,
}

fn process_stream_event<F>(
    event: ChatStreamEvent,
    state: &mut StreamState,
    on_event: &mut F,
) -> Result<(), CompletionApiError>
where
    F: FnMut(ChatStreamEvent),
{
    match &event {
        ChatStreamEvent::Error { code, message } => {
            return Err(CompletionApiError::StreamFailed {
                code: code.clone(),
                message: message
                    .clone()
                    .or_else(|| code.clone())
                    .unwrap_or_else(|| "unknown stream error".to_owned()),
            });
        }
        ChatStreamEvent::Finished { reason } => {
            state.finished = true;
            if reason.is_some() {
                state.finish_reason = *reason;
            }
        }
        ChatStreamEvent::Done => state.done = true,
        ChatStreamEvent::ContentDelta { .. } => {}
    }

    on_event(event);
    Ok(())
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, CompletionApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(CompletionApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(CompletionApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
