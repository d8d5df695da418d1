//! Remote chat-completions implementation of the `model_backend` contract.
//!
//! The backend owns the conversation history. Every submitted turn appends a user message,
//! issues one streaming request carrying the whole history, forwards content deltas as
//! chunks while they arrive, and appends the assembled assistant reply once the stream ends.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_api::{
    CancellationSignal, ChatApiClient, ChatApiConfig, ChatApiError, ChatMessage, ChatRequest,
    ChatStreamEvent, StreamSummary,
};
use model_backend::{
    BackendError, BackendEvent, BackendProfile, Conversation, ConversationMessage, EventSink,
    ModelBackend, TurnId,
};
use serde_json::{Map, Value};

pub use chat_api::url::DEFAULT_CHAT_BASE_URL as DEFAULT_BASE_URL;

/// Stable backend identifier used by startup selection.
pub const API_BACKEND_ID: &str = "api";

/// Runtime configuration for the remote backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiBackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: String,
    pub parameters: Map<String, Value>,
    pub timeout: Option<Duration>,
}

impl ApiBackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            system_prompt: String::new(),
            parameters: Map::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<(), BackendError> {
        if self.model.trim().is_empty() {
            return Err(BackendError::config("model.name must not be empty"));
        }
        url::Url::parse(self.base_url.trim()).map_err(|error| {
            BackendError::config(format!("invalid api.base_url '{}': {error}", self.base_url))
        })?;
        Ok(())
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.base_url);

        if let Some(api_key) = self.api_key {
            config = config.with_api_key(api_key);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<StreamSummary, ChatApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ChatApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<StreamSummary, ChatApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ChatApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }
}

/// `ModelBackend` backed by `chat_api` transport primitives.
pub struct ApiBackend {
    model: String,
    parameters: Map<String, Value>,
    stream_client: Arc<dyn StreamClient>,
    history: Mutex<Conversation>,
    sink: Mutex<Option<EventSink>>,
    initialized: AtomicBool,
    next_turn_id: AtomicU64,
    turn_lock: Mutex<()>,
    cancel: CancellationSignal,
}

impl ApiBackend {
    /// Creates a backend using real HTTP transport.
    pub fn new(config: ApiBackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let model = config.model.trim().to_string();
        let parameters = config.parameters.clone();
        let history = Conversation::with_system_prompt(&config.system_prompt);
        let stream_client = Arc::new(DefaultStreamClient {
            client: ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?,
        });

        Ok(Self::with_parts(model, parameters, history, stream_client))
    }

    fn with_parts(
        model: String,
        parameters: Map<String, Value>,
        history: Conversation,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self {
            model,
            parameters,
            stream_client,
            history: Mutex::new(history),
            sink: Mutex::new(None),
            initialized: AtomicBool::new(false),
            next_turn_id: AtomicU64::new(1),
            turn_lock: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn build_request(&self) -> ChatRequest {
        let messages = lock_unpoisoned(&self.history)
            .messages()
            .iter()
            .map(|message| ChatMessage::new(message.role.as_str(), message.content.clone()))
            .collect();
        ChatRequest::new(self.model.clone(), messages).with_parameters(&self.parameters)
    }

    fn run_turn(&self, sink: &EventSink, turn_id: TurnId) -> Result<String, ChatApiError> {
        let request = self.build_request();
        let mut reply = String::new();

        let summary = self.stream_client.stream(&request, &self.cancel, &mut |event| {
            if let ChatStreamEvent::ContentDelta { text } = event {
                if !self.initialized.swap(true, Ordering::SeqCst) {
                    tracing::info!(model = %self.model, "first content received; model ready");
                    sink(BackendEvent::Initialized);
                }
                reply.push_str(&text);
                sink(BackendEvent::Chunk { turn_id, text });
            }
        })?;

        tracing::debug!(
            turn_id,
            finish_reason = ?summary.finish_reason,
            done = summary.done,
            "chat stream ended"
        );
        Ok(reply)
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        model: &str,
        system_prompt: &str,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self::with_parts(
            model.to_string(),
            Map::new(),
            Conversation::with_system_prompt(system_prompt),
            stream_client,
        )
    }
}

impl ModelBackend for ApiBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: API_BACKEND_ID.to_string(),
            model_id: self.model.clone(),
        }
    }

    fn start(&self, sink: EventSink) -> Result<(), BackendError> {
        let mut slot = lock_unpoisoned(&self.sink);
        if slot.is_some() {
            return Err(BackendError::AlreadyStarted);
        }
        *slot = Some(sink);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn submit(&self, text: &str) -> Result<(), BackendError> {
        let sink = lock_unpoisoned(&self.sink)
            .clone()
            .ok_or(BackendError::NotStarted)?;
        if self.cancel.load(Ordering::Acquire) {
            return Err(BackendError::Exited);
        }

        let _turn = lock_unpoisoned(&self.turn_lock);
        lock_unpoisoned(&self.history).push(ConversationMessage::user(text));
        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        sink(BackendEvent::TurnStarted { turn_id });

        match self.run_turn(&sink, turn_id) {
            Ok(reply) => {
                if !reply.is_empty() {
                    lock_unpoisoned(&self.history).push(ConversationMessage::assistant(reply));
                }
                sink(BackendEvent::TurnFinished { turn_id });
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, turn_id, "chat request failed");
                let message = format!("API request failed: {error}");
                sink(BackendEvent::TurnFailed {
                    turn_id,
                    error: message.clone(),
                });
                Err(BackendError::request(message))
            }
        }
    }

    fn history(&self) -> Vec<ConversationMessage> {
        lock_unpoisoned(&self.history).messages().to_vec()
    }

    fn shutdown(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

fn map_init_error(error: ChatApiError) -> BackendError {
    BackendError::config(format!("failed to initialize api backend: {error}"))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
