//! Deterministic scripted implementation of the `model_backend` contract.
//!
//! This crate contains no transport logic and is intended for offline runs and pipeline
//! integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use model_backend::{
    BackendError, BackendEvent, BackendProfile, Conversation, ConversationMessage, EventSink,
    ModelBackend,
};

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

/// Reply used once the script runs out.
pub const FALLBACK_REPLY: &str = "Understood.\n";

/// Backend that answers each submitted turn with the next scripted reply.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Vec<String>>>,
    history: Mutex<Conversation>,
    sink: Mutex<Option<EventSink>>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
    next_turn_id: AtomicU64,
    token_delay: Duration,
}

impl ScriptedBackend {
    /// Creates a backend whose replies are given as chunk lists.
    #[must_use]
    pub fn new(replies: Vec<Vec<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            history: Mutex::new(Conversation::new()),
            sink: Mutex::new(None),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            next_turn_id: AtomicU64::new(1),
            token_delay: Duration::ZERO,
        }
    }

    /// Creates a backend from whole reply strings, each streamed token by token.
    #[must_use]
    pub fn from_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| vec![reply.into()]).collect())
    }

    #[must_use]
    pub fn with_system_prompt(self, prompt: &str) -> Self {
        *lock_unpoisoned(&self.history) = Conversation::with_system_prompt(prompt);
        self
    }

    /// Pause between emitted tokens.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Number of scripted replies not yet consumed.
    #[must_use]
    pub fn remaining_replies(&self) -> usize {
        lock_unpoisoned(&self.replies).len()
    }

    fn emit_tokens(&self, sink: &EventSink, turn_id: u64, chunk: &str) {
        let mut pending_token = String::new();
        for ch in chunk.chars() {
            pending_token.push(ch);
            if matches!(ch, ' ' | '\n') {
                sink(BackendEvent::Chunk {
                    turn_id,
                    text: std::mem::take(&mut pending_token),
                });
                self.pause();
            }
        }
        if !pending_token.is_empty() {
            sink(BackendEvent::Chunk {
                turn_id,
                text: pending_token,
            });
            self.pause();
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(vec![
            vec![
                "# Scripted session\n".to_string(),
                "This backend replays a **fixed** script so the pipeline can run *offline*.\n"
                    .to_string(),
                "```bash\n".to_string(),
                "echo \"hello from the scripted backend\"\n".to_string(),
                "```\n".to_string(),
                "The block above runs once the stream goes quiet.\n".to_string(),
            ],
            vec![
                "## Result received\n".to_string(),
                "The command printed its greeting, so the check passed.\n".to_string(),
            ],
        ])
    }
}

impl ModelBackend for ScriptedBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: MOCK_BACKEND_ID.to_string(),
            model_id: "scripted".to_string(),
        }
    }

    fn start(&self, sink: EventSink) -> Result<(), BackendError> {
        let mut slot = lock_unpoisoned(&self.sink);
        if slot.is_some() {
            return Err(BackendError::AlreadyStarted);
        }
        *slot = Some(sink.clone());
        drop(slot);

        self.initialized.store(true, Ordering::SeqCst);
        sink(BackendEvent::Initialized);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn submit(&self, text: &str) -> Result<(), BackendError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(BackendError::Exited);
        }
        let sink = lock_unpoisoned(&self.sink)
            .clone()
            .ok_or(BackendError::NotStarted)?;
        lock_unpoisoned(&self.history).push(ConversationMessage::user(text));

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let reply = lock_unpoisoned(&self.replies)
            .pop_front()
            .unwrap_or_else(|| vec![FALLBACK_REPLY.to_string()]);
        tracing::debug!(turn_id, chunks = reply.len(), "replaying scripted reply");

        sink(BackendEvent::TurnStarted { turn_id });
        for chunk in &reply {
            self.emit_tokens(&sink, turn_id, chunk);
        }
        lock_unpoisoned(&self.history).push(ConversationMessage::assistant(reply.concat()));
        sink(BackendEvent::TurnFinished { turn_id });
        Ok(())
    }

    fn history(&self) -> Vec<ConversationMessage> {
        lock_unpoisoned(&self.history).messages().to_vec()
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(sink) = lock_unpoisoned(&self.sink).take() {
            sink(BackendEvent::Exited { code: Some(0) });
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
