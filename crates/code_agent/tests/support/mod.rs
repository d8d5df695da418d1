#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use code_agent::executor::{Executor, Interpreter, InterpreterTable};
use code_agent::language::SHELL;
use code_agent::runtime::{AgentRuntime, RuntimeOptions};
use code_atlas::{CaptureTerminal, StyledRenderer};
use model_backend_mock::ScriptedBackend;

pub const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// Shell blocks run through `sh` so tests do not depend on bash.
pub fn sh_executor() -> Executor {
    Executor::new(InterpreterTable::empty().with(SHELL, Interpreter::new("sh", ".sh")))
}

pub fn fast_options() -> RuntimeOptions {
    RuntimeOptions {
        idle_threshold: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
        render_prompt: true,
    }
}

pub struct Harness {
    pub runtime: Arc<AgentRuntime<CaptureTerminal>>,
    pub backend: Arc<ScriptedBackend>,
    pub terminal: CaptureTerminal,
}

impl Harness {
    pub fn new(backend: ScriptedBackend, executor: Executor) -> Self {
        Self::with_options(backend, executor, fast_options())
    }

    pub fn with_options(
        backend: ScriptedBackend,
        executor: Executor,
        options: RuntimeOptions,
    ) -> Self {
        let backend = Arc::new(backend);
        let terminal = CaptureTerminal::new();
        let runtime = AgentRuntime::new(
            Arc::clone(&backend) as Arc<dyn model_backend::ModelBackend>,
            executor,
            StyledRenderer::new(terminal.clone()),
            options,
        );
        Self {
            runtime,
            backend,
            terminal,
        }
    }

    pub fn started(backend: ScriptedBackend, executor: Executor) -> Self {
        Self::new(backend, executor).start()
    }

    pub fn start(self) -> Self {
        self.runtime.start().expect("runtime should start");
        self
    }

    /// Waits until the conversation holds `messages` entries and no batch is pending.
    pub fn wait_for_history(&self, messages: usize) {
        wait_until(|| {
            self.runtime.history().len() >= messages && !self.runtime.is_busy()
        });
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.runtime.shutdown();
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {WAIT_LIMIT:?}");
        thread::sleep(Duration::from_millis(5));
    }
}
