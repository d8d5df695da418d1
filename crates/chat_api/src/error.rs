use reqwest::StatusCode;
use serde::Deserialize;

/// Failures surfaced by [`crate::ChatApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ChatApiError {
    #[error("model name is required")]
    MissingModel,
    #[error("request has no messages")]
    EmptyConversation,
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0} {1}")]
    Status(StatusCode, String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(
        "gave up after retrying (status {}): {}",
        status_label(.status),
        .last_error.as_deref().unwrap_or("no response")
    )]
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    #[error("stream failed{}: {message}", code_label(.code))]
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    #[error("request was cancelled")]
    Cancelled,
    #[error("{0}")]
    Unknown(String),
}

fn status_label(status: &Option<StatusCode>) -> String {
    status.map_or_else(|| "none".to_owned(), |status| status.as_u16().to_string())
}

fn code_label(code: &Option<String>) -> String {
    match code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => format!(" ({code})"),
        _ => String::new(),
    }
}

/// Body shape of an OpenAI-compatible error response.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Extracts a readable message from an error response body.
///
/// Prefers `error.message`, then `error.type`, then the raw body, and finally the
/// status reason phrase when the body is blank.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| {
            [error.message, error.kind]
                .into_iter()
                .flatten()
                .find(|text| !text.trim().is_empty())
        });
    if let Some(message) = from_json {
        return message;
    }

    if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_owned()
    } else {
        body.to_owned()
    }
}
