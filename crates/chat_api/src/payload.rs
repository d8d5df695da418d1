use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sampling parameters forwarded to the endpoint. Anything else in a caller's parameter map
/// is dropped.
pub const SUPPORTED_PARAMETERS: &[&str] = &[
    "temperature",
    "top_p",
    "max_tokens",
    "frequency_penalty",
    "presence_penalty",
    "stop",
    "seed",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Request body for a streaming chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            parameters: Map::new(),
        }
    }

    /// Copies the supported entries of `parameters` into the request.
    pub fn with_parameters(mut self, parameters: &Map<String, Value>) -> Self {
        for (key, value) in parameters {
            if SUPPORTED_PARAMETERS.contains(&key.as_str()) {
                self.parameters.insert(key.clone(), value.clone());
            } else {
                tracing::debug!(parameter = %key, "dropping unsupported chat parameter");
            }
        }
        self
    }
}
