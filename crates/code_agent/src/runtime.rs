//! Wires a model backend to the pipeline.
//!
//! Backend events are applied on whatever thread the backend emits them from: chunks go through
//! the scanner, styled segments are rendered immediately and recognized blocks are queued. An
//! [`IdleMonitor`] starts a batch once the stream goes quiet, and each batch runs on its own
//! thread that executes the blocks, renders their reports and submits the feedback turn.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use code_atlas::{StyledRenderer, StyledSegment, Terminal, TextStyle};
use model_backend::{
    BackendError, BackendEvent, BackendProfile, ConversationMessage, EventSink, ModelBackend,
    TurnId,
};

use crate::executor::Executor;
use crate::feedback::compose_feedback;
use crate::monitor::IdleMonitor;
use crate::pipeline::{ExecutionBatch, Pipeline, DEFAULT_IDLE_THRESHOLD, DEFAULT_POLL_INTERVAL};
use crate::scanner::{ScanOutput, Scanner};

pub const PROMPT: &str = "> ";
pub const LOADING_COMPLETE: &str = "Model loading complete!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub idle_threshold: Duration,
    pub poll_interval: Duration,
    /// Whether the agent draws the `> ` prompt, including after each feedback turn.
    ///
    /// Local models in conversation mode print their own prompt.
    pub render_prompt: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            render_prompt: true,
        }
    }
}

pub struct AgentRuntime<T: Terminal + 'static> {
    backend: Arc<dyn ModelBackend>,
    pipeline: Arc<Pipeline>,
    executor: Executor,
    renderer: Mutex<StyledRenderer<T>>,
    scanner: Mutex<Scanner>,
    monitor: Mutex<Option<IdleMonitor>>,
    active_turn: Mutex<Option<TurnId>>,
    next_batch_id: AtomicU64,
    options: RuntimeOptions,
}

impl<T: Terminal + 'static> AgentRuntime<T> {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        executor: Executor,
        renderer: StyledRenderer<T>,
        options: RuntimeOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            pipeline: Arc::new(Pipeline::new(options.idle_threshold)),
            executor,
            renderer: Mutex::new(renderer),
            scanner: Mutex::new(Scanner::new()),
            monitor: Mutex::new(None),
            active_turn: Mutex::new(None),
            next_batch_id: AtomicU64::new(1),
            options,
        })
    }

    /// Starts the backend and the idle monitor.
    ///
    /// For local backends this blocks until the model has loaded. Errors are fatal to the program.
    pub fn start(self: &Arc<Self>) -> Result<(), BackendError> {
        self.backend.start(weak_sink(self))?;

        let backend = Arc::clone(&self.backend);
        let weak = Arc::downgrade(self);
        let monitor = IdleMonitor::spawn(
            Arc::clone(&self.pipeline),
            self.options.poll_interval,
            move || backend.is_initialized(),
            move |batch| {
                if let Some(runtime) = weak.upgrade() {
                    runtime.spawn_batch(batch);
                }
            },
        )?;
        *lock_unpoisoned(&self.monitor) = Some(monitor);
        Ok(())
    }

    #[must_use]
    pub fn profile(&self) -> BackendProfile {
        self.backend.profile()
    }

    #[must_use]
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.backend.history()
    }

    #[must_use]
    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// True while blocks are queued or a batch is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.pipeline.pending() > 0 || self.pipeline.is_executing()
    }

    /// Sends a user turn typed at the prompt.
    pub fn submit(&self, text: &str) -> Result<(), BackendError> {
        tracing::debug!(bytes = text.len(), "submitting user turn");
        self.backend.submit(text)
    }

    /// Runs `f` with exclusive access to the renderer.
    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut StyledRenderer<T>) -> R) -> R {
        f(&mut lock_unpoisoned(&self.renderer))
    }

    /// Stops the monitor and releases the backend. Idempotent.
    pub fn shutdown(&self) {
        let monitor = lock_unpoisoned(&self.monitor).take();
        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
        self.backend.shutdown();
        self.with_renderer(|renderer| renderer.reset());
    }

    pub fn handle_event(&self, event: BackendEvent) {
        match event {
            BackendEvent::Preamble { text } => {
                self.with_renderer(|renderer| renderer.render(&[StyledSegment::plain(text)]));
            }
            BackendEvent::Initialized => {
                *lock_unpoisoned(&self.scanner) = Scanner::new();
                self.pipeline.record_activity();
                if lock_unpoisoned(&self.active_turn).is_none() {
                    self.with_renderer(|renderer| {
                        renderer.line(LOADING_COMPLETE, TextStyle::Notice);
                    });
                }
            }
            BackendEvent::TurnStarted { turn_id } => {
                *lock_unpoisoned(&self.active_turn) = Some(turn_id);
                self.finish_line();
            }
            BackendEvent::Chunk { turn_id, text } => {
                tracing::trace!(turn_id, bytes = text.len(), "model chunk");
                self.pipeline.record_activity();
                let output = lock_unpoisoned(&self.scanner).feed(&text);
                self.apply(output);
            }
            BackendEvent::TurnFinished { turn_id } => {
                self.finish_line();
                self.end_turn(turn_id);
            }
            BackendEvent::TurnFailed { turn_id, error } => {
                self.finish_line();
                self.end_turn(turn_id);
                self.with_renderer(|renderer| renderer.line(&error, TextStyle::Failure));
            }
            BackendEvent::Exited { code } => {
                self.finish_line();
                *lock_unpoisoned(&self.active_turn) = None;
                let message = match code {
                    Some(code) => format!("Model exited with status {code}."),
                    None => "Model exited.".to_string(),
                };
                self.with_renderer(|renderer| renderer.line(&message, TextStyle::Notice));
            }
        }
    }

    fn finish_line(&self) {
        let mut output = ScanOutput::default();
        lock_unpoisoned(&self.scanner).finish_line(&mut output);
        self.apply(output);
    }

    fn end_turn(&self, turn_id: TurnId) {
        let mut active = lock_unpoisoned(&self.active_turn);
        if *active == Some(turn_id) {
            *active = None;
        }
    }

    fn apply(&self, output: ScanOutput) {
        if !output.segments.is_empty() {
            self.with_renderer(|renderer| renderer.render(&output.segments));
        }
        for block in output.blocks {
            tracing::debug!(
                language = %block.language,
                bytes = block.code.len(),
                "queued code block"
            );
            self.pipeline.push(block);
        }
    }

    fn spawn_batch(self: &Arc<Self>, batch: ExecutionBatch) {
        let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst);
        let runtime = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("code-exec-batch-{batch_id}"))
            .spawn(move || runtime.run_batch(batch_id, batch));
        if let Err(error) = spawned {
            tracing::error!(batch_id, %error, "failed to spawn batch thread; blocks dropped");
        }
    }

    fn run_batch(&self, batch_id: u64, batch: ExecutionBatch) {
        let (blocks, guard) = batch.into_parts();
        tracing::info!(batch_id, blocks = blocks.len(), "batch started");

        let result = catch_unwind(AssertUnwindSafe(|| {
            let report = self.executor.run_batch_with(blocks, |block, outcome| {
                tracing::debug!(
                    batch_id,
                    language = %block.language,
                    success = outcome.success,
                    "block finished"
                );
                let style = if outcome.success {
                    TextStyle::Success
                } else {
                    TextStyle::Failure
                };
                self.with_renderer(|renderer| renderer.line(&outcome.message, style));
            });

            let Some(feedback) = compose_feedback(&report) else {
                return;
            };
            tracing::info!(
                batch_id,
                outcomes = report.outcomes.len(),
                bytes = feedback.len(),
                "batch finished; sending feedback"
            );
            match self.backend.submit(&feedback) {
                Ok(()) => {
                    if self.options.render_prompt {
                        self.with_renderer(|renderer| renderer.prompt(PROMPT));
                    }
                }
                Err(error) => {
                    tracing::warn!(batch_id, %error, "feedback submission failed");
                    let message = format!("Failed to send results: {error}");
                    self.with_renderer(|renderer| renderer.line(&message, TextStyle::Failure));
                }
            }
        }));

        if result.is_err() {
            tracing::error!(batch_id, "batch panicked");
            self.with_renderer(|renderer| {
                renderer.line("Code execution panicked.", TextStyle::Failure);
            });
        }
        drop(guard);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Event sink that forwards to a runtime that may already be gone.
pub fn weak_sink<T: Terminal + 'static>(runtime: &Arc<AgentRuntime<T>>) -> EventSink {
    let weak: Weak<AgentRuntime<T>> = Arc::downgrade(runtime);
    Arc::new(move |event| {
        if let Some(runtime) = weak.upgrade() {
            runtime.handle_event(event);
        }
    })
}
