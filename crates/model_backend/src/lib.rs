//! Backend-agnostic contract between the console pipeline and a language model.
//!
//! A backend produces raw text chunks through an [`EventSink`], reports when the model has
//! finished initializing, and accepts new user turns through [`ModelBackend::submit`]. How a
//! turn resumes the model (writing to a running process or issuing a new request) is the
//! backend's concern.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Identifier for one model turn.
pub type TurnId = u64;

/// Callback receiving backend events. Called from backend-owned threads.
pub type EventSink = Arc<dyn Fn(BackendEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Append-only, ordered message history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a conversation with a system message, skipped when `prompt` is blank.
    #[must_use]
    pub fn with_system_prompt(prompt: &str) -> Self {
        let mut conversation = Self::new();
        if !prompt.trim().is_empty() {
            conversation.push(ConversationMessage::system(prompt));
        }
        conversation
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Backend-emitted lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Raw output produced while the model is still loading. Not part of any turn.
    Preamble { text: String },
    /// The model finished initializing. Emitted at most once per backend.
    Initialized,
    TurnStarted { turn_id: TurnId },
    Chunk { turn_id: TurnId, text: String },
    TurnFinished { turn_id: TurnId },
    TurnFailed { turn_id: TurnId, error: String },
    /// The backend process or connection is gone.
    Exited { code: Option<i32> },
}

impl BackendEvent {
    /// Returns the turn identifier associated with this event, if any.
    #[must_use]
    pub fn turn_id(&self) -> Option<TurnId> {
        match self {
            Self::TurnStarted { turn_id }
            | Self::Chunk { turn_id, .. }
            | Self::TurnFinished { turn_id }
            | Self::TurnFailed { turn_id, .. } => Some(*turn_id),
            Self::Preamble { .. } | Self::Initialized | Self::Exited { .. } => None,
        }
    }

    /// Returns true when this event ends a turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TurnFinished { .. } | Self::TurnFailed { .. } | Self::Exited { .. }
        )
    }
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    pub backend_id: String,
    pub model_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend has not been started")]
    NotStarted,
    #[error("backend was already started")]
    AlreadyStarted,
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("model did not finish initializing within {}s", .0.as_secs())]
    InitTimeout(Duration),
    #[error("backend process has exited")]
    Exited,
    #[error("backend I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("model request failed: {0}")]
    Request(String),
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    #[must_use]
    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// A running conversation with a model.
pub trait ModelBackend: Send + Sync + 'static {
    /// Returns backend/model identity metadata.
    fn profile(&self) -> BackendProfile;

    /// Connects to the model. Events for the whole session are delivered to `sink`.
    ///
    /// A failure here is fatal to the program.
    fn start(&self, sink: EventSink) -> Result<(), BackendError>;

    /// Whether the model has finished initializing.
    fn is_initialized(&self) -> bool;

    /// Appends a user turn to the conversation and resumes the model.
    ///
    /// Remote backends block until the resulting stream ends; local backends return once the
    /// text is written to the model's input.
    fn submit(&self, text: &str) -> Result<(), BackendError>;

    /// Snapshot of the conversation so far.
    fn history(&self) -> Vec<ConversationMessage>;

    /// Releases the model. Idempotent.
    fn shutdown(&self);
}
