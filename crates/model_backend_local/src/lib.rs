//! Local-process implementation of the `model_backend` contract.
//!
//! The backend launches a llama.cpp-style CLI in conversation mode and treats its stdout as the
//! model stream. Output produced before the model has echoed the end of the system prompt is
//! reported as [`BackendEvent::Preamble`]; the read that completes that echo is swallowed and
//! marks the backend initialized. Each submitted turn is written to the child's stdin.

mod config;
mod decode;
mod marker;

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use model_backend::{
    BackendError, BackendEvent, BackendProfile, Conversation, ConversationMessage, EventSink,
    ModelBackend,
};

pub use config::{LocalBackendConfig, DEFAULT_INIT_TIMEOUT, DEFAULT_PROGRAM};
pub use decode::Utf8Decoder;
pub use marker::{ready_marker, MarkerDetector, MARKER_WORDS};

/// Stable backend identifier used by startup selection.
pub const LOCAL_BACKEND_ID: &str = "local";

const READ_BUFFER_SIZE: usize = 4096;
const INIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Running {
    child: Child,
    stdin: ChildStdin,
}

/// State shared with the output reader thread.
struct Shared {
    initialized: AtomicBool,
    exited: AtomicBool,
    current_turn: AtomicU64,
    history: Mutex<Conversation>,
    pending_reply: Mutex<String>,
}

impl Shared {
    /// Moves the streamed reply of the previous turn into the history.
    fn commit_reply(&self) {
        let reply = std::mem::take(&mut *lock_unpoisoned(&self.pending_reply));
        if !reply.is_empty() {
            lock_unpoisoned(&self.history).push(ConversationMessage::assistant(reply));
        }
    }
}

/// `ModelBackend` driving a local model process over stdin/stdout.
pub struct LocalBackend {
    config: LocalBackendConfig,
    running: Mutex<Option<Running>>,
    started: AtomicBool,
    shared: Arc<Shared>,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        Ok(Self {
            config,
            running: Mutex::new(None),
            started: AtomicBool::new(false),
            shared: Arc::new(Shared {
                initialized: AtomicBool::new(false),
                exited: AtomicBool::new(false),
                current_turn: AtomicU64::new(0),
                history: Mutex::new(Conversation::new()),
                pending_reply: Mutex::new(String::new()),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &LocalBackendConfig {
        &self.config
    }

    fn spawn_child(&self) -> Result<(Child, ChildStdin, ChildStdout, ChildStderr), BackendError> {
        let program = self.config.program.trim();
        let mut child = Command::new(program)
            .args(self.config.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| BackendError::spawn(program, error))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill_child(&mut child);
            return Err(BackendError::spawn(
                program,
                std::io::Error::other("child pipes were not captured"),
            ));
        };
        Ok((child, stdin, stdout, stderr))
    }

    fn wait_until_initialized(&self) -> Result<(), BackendError> {
        let deadline = Instant::now() + self.config.init_timeout;
        loop {
            if self.shared.initialized.load(Ordering::SeqCst) {
                return Ok(());
            }
            if self.shared.exited.load(Ordering::SeqCst) {
                self.terminate();
                return Err(BackendError::Exited);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = self.config.init_timeout.as_millis() as u64,
                    "model loading timed out"
                );
                self.terminate();
                return Err(BackendError::InitTimeout(self.config.init_timeout));
            }
            thread::sleep(INIT_POLL_INTERVAL);
        }
    }

    fn terminate(&self) {
        if let Some(mut running) = lock_unpoisoned(&self.running).take() {
            drop(running.stdin);
            kill_child(&mut running.child);
        }
    }
}

impl ModelBackend for LocalBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: LOCAL_BACKEND_ID.to_string(),
            model_id: self.config.model.clone(),
        }
    }

    fn start(&self, sink: EventSink) -> Result<(), BackendError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BackendError::AlreadyStarted);
        }

        let (child, stdin, stdout, stderr) = self.spawn_child()?;
        tracing::info!(
            program = %self.config.program,
            model = %self.config.model,
            pid = child.id(),
            "local model process started"
        );
        *lock_unpoisoned(&self.running) = Some(Running { child, stdin });

        let detector = MarkerDetector::new(ready_marker(&self.config.system_prompt));
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("local-model-stdout".to_string())
            .spawn(move || read_stdout(stdout, detector, shared, sink))
            .and_then(|_| {
                thread::Builder::new()
                    .name("local-model-stderr".to_string())
                    .spawn(move || drain_stderr(stderr))
            });
        if let Err(error) = spawned {
            self.terminate();
            return Err(BackendError::Io(error));
        }

        self.wait_until_initialized()
    }

    fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    fn submit(&self, text: &str) -> Result<(), BackendError> {
        let mut running = lock_unpoisoned(&self.running);
        let Some(running) = running.as_mut() else {
            return Err(if self.started.load(Ordering::SeqCst) {
                BackendError::Exited
            } else {
                BackendError::NotStarted
            });
        };
        if self.shared.exited.load(Ordering::SeqCst) {
            return Err(BackendError::Exited);
        }

        self.shared.commit_reply();
        lock_unpoisoned(&self.shared.history).push(ConversationMessage::user(text));

        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        let turn_id = self.shared.current_turn.fetch_add(1, Ordering::SeqCst) + 1;
        running.stdin.write_all(line.as_bytes())?;
        running.stdin.flush()?;
        tracing::debug!(turn_id, bytes = line.len(), "wrote turn to local model");
        Ok(())
    }

    fn history(&self) -> Vec<ConversationMessage> {
        let mut messages = lock_unpoisoned(&self.shared.history).messages().to_vec();
        let pending = lock_unpoisoned(&self.shared.pending_reply);
        if !pending.is_empty() {
            messages.push(ConversationMessage::assistant(pending.clone()));
        }
        messages
    }

    fn shutdown(&self) {
        self.terminate();
    }
}

impl Drop for LocalBackend {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn read_stdout(
    mut stdout: ChildStdout,
    mut detector: MarkerDetector,
    shared: Arc<Shared>,
    sink: EventSink,
) {
    let mut decoder = Utf8Decoder::default();
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut emitted_turn = 0;

    loop {
        let read = match stdout.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => {
                tracing::warn!(%error, "local model stdout read failed");
                break;
            }
        };
        let text = decoder.decode(&buffer[..read]);
        if text.is_empty() {
            continue;
        }

        if !shared.initialized.load(Ordering::SeqCst) {
            if detector.feed(&text) {
                tracing::info!(marker = detector.marker(), "local model initialized");
                sink(BackendEvent::Initialized);
                shared.initialized.store(true, Ordering::SeqCst);
            } else {
                sink(BackendEvent::Preamble { text });
            }
            continue;
        }

        let turn_id = shared.current_turn.load(Ordering::SeqCst);
        if turn_id != emitted_turn {
            emitted_turn = turn_id;
            sink(BackendEvent::TurnStarted { turn_id });
        }
        tracing::trace!(turn_id, bytes = text.len(), "local model chunk");
        lock_unpoisoned(&shared.pending_reply).push_str(&text);
        sink(BackendEvent::Chunk { turn_id, text });
    }

    let rest = decoder.finish();
    if !rest.is_empty() && shared.initialized.load(Ordering::SeqCst) {
        let turn_id = shared.current_turn.load(Ordering::SeqCst);
        lock_unpoisoned(&shared.pending_reply).push_str(&rest);
        sink(BackendEvent::Chunk {
            turn_id,
            text: rest,
        });
    }

    shared.exited.store(true, Ordering::SeqCst);
    tracing::info!("local model output closed");
    sink(BackendEvent::Exited { code: None });
}

fn drain_stderr(stderr: ChildStderr) {
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(line) if !line.trim().is_empty() => {
                tracing::debug!(target: "model_backend_local::stderr", "{line}");
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

fn kill_child(child: &mut Child) {
    if let Err(error) = child.kill() {
        tracing::debug!(%error, "local model process already gone");
    }
    let _ = child.wait();
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
