use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::ChatStreamEvent;
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::retry::RetryPolicy;
use crate::sse::ChatStreamParser;
use crate::url::normalize_chat_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

/// How a stream ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub finish_reason: Option<String>,
    /// Whether the `[DONE]` sentinel was seen before the body ended.
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<ChatStreamEvent>,
    pub summary: StreamSummary,
}

impl StreamResult {
    /// Concatenated content deltas.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(ChatStreamEvent::content)
            .collect()
    }
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_url(&self.config.base_url)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, ChatApiError> {
        build_headers(&self.config, user_agent)
            .into_iter()
            .map(|(key, value)| {
                let name = HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid name {key:?}")))?;
                let value = HeaderValue::from_str(&value)
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid value for {key}")))?;
                Ok((name, value))
            })
            .collect()
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        validate_request(request)?;

        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let mut payload = request.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    pub async fn send_with_retry(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        let policy = self.config.retry;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(ChatApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if policy.allows_retry(attempt)
                        && RetryPolicy::is_retryable(status.as_u16(), &body)
                    {
                        tracing::warn!(%status, attempt, "retrying chat request");
                        await_or_cancel(tokio::time::sleep(policy.delay(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(ChatApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if policy.allows_retry(attempt) {
                        tracing::warn!(error = ?last_error, attempt, "retrying chat request");
                        await_or_cancel(tokio::time::sleep(policy.delay(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(ChatApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(ChatApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Streams one completion, handing each event to `on_event` as it is decoded.
    ///
    /// Reading stops at the `[DONE]` sentinel. An `error` object in the stream fails the
    /// call after earlier events have been delivered.
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamSummary, ChatApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = ChatStreamParser::default();
        let mut summary = StreamSummary::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let chunk = chunk.map_err(ChatApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut summary, &mut on_event)?;
            }
            if summary.done {
                return Ok(summary);
            }
        }

        for event in parser.finish() {
            process_stream_event(event, &mut summary, &mut on_event)?;
        }

        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        Ok(summary)
    }

    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ChatApiError> {
        let mut events = Vec::new();
        let summary = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, summary })
    }
}

fn validate_request(request: &ChatRequest) -> Result<(), ChatApiError> {
    if request.model.trim().is_empty() {
        return Err(ChatApiError::MissingModel);
    }
    if request.messages.is_empty() {
        return Err(ChatApiError::EmptyConversation);
    }
    Ok(())
}

fn process_stream_event<F>(
    event: ChatStreamEvent,
    summary: &mut StreamSummary,
    on_event: &mut F,
) -> Result<(), ChatApiError>
where
    F: FnMut(ChatStreamEvent),
{
    if summary.done {
        return Ok(());
    }

    match &event {
        ChatStreamEvent::Error { code, message } => {
            return Err(ChatApiError::StreamFailed {
                code: code.clone(),
                message: message
                    .clone()
                    .or_else(|| code.clone())
                    .unwrap_or_else(|| "unknown stream error".to_owned()),
            });
        }
        ChatStreamEvent::FinishReason { reason } => {
            summary.finish_reason = Some(reason.clone());
        }
        ChatStreamEvent::Done => summary.done = true,
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
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
