//! Console agent that runs the code a model writes.
//!
//! ## Pipeline
//!
//! Model output is streamed through a character-level [`scanner::Scanner`] that renders
//! markdown-ish styling and recognizes fenced code blocks tagged with a runnable language
//! (`python`, `batch`, `shell`, `powershell` and their aliases). Completed blocks are queued;
//! once the stream has been quiet for the idle threshold (1000 ms by default) the queued blocks
//! run one after another, each through its interpreter on a temporary script file. The results
//! go back to the model as the next user turn:
//!
//! - if the last block succeeded, the concatenated reports of every successful block;
//! - otherwise only the last block's failure report.
//!
//! At most one batch runs at a time.
//!
//! ## Configuration
//!
//! The binary reads a JSON file (`--config`, `CODE_ATLAS_CONFIG`, or `./config.json`):
//!
//! ```json
//! {
//!   "system": { "prompt": "You are a helpful assistant that answers with runnable code." },
//!   "model": { "name": "gpt-4o-mini", "parameters": { "temperature": 0.2 } },
//!   "api": { "enabled": true, "base_url": "https://api.openai.com/v1", "key": "sk-..." },
//!   "local": { "program": "llama-cli", "init_timeout_sec": 30 },
//!   "pipeline": { "idle_threshold_ms": 1000, "poll_interval_ms": 100 },
//!   "interpreters": { "shell": { "program": "sh" } }
//! }
//! ```
//!
//! `api.enabled` picks the remote backend, otherwise a local model process is launched;
//! `--backend mock` replays a fixed script and needs no config file. Unknown fields are rejected.

pub mod app;
pub mod backends;
pub mod block;
pub mod clock;
pub mod commands;
pub mod config;
pub mod executor;
pub mod feedback;
pub mod language;
pub mod monitor;
pub mod pipeline;
pub mod queue;
pub mod runtime;
pub mod scanner;

pub use block::{CodeBlock, ExecutionOutcome};
pub use executor::{BatchReport, Executor, Interpreter, InterpreterTable, ScriptEncoding};
pub use feedback::compose_feedback;
pub use pipeline::{ExecutionBatch, Pipeline};
pub use runtime::{AgentRuntime, RuntimeOptions};
pub use scanner::{ScanOutput, Scanner};
