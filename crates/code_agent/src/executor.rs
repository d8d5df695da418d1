//! Execution dispatcher: runs code blocks through their interpreters.
//!
//! Each block is written to a fresh temporary file with the interpreter's extension and
//! encoding, the interpreter is started on that file with no stdin and captured stdout/stderr,
//! and the exit code alone decides success. Nothing here returns an error to the caller: every
//! failure becomes an unsuccessful [`ExecutionOutcome`].

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use tempfile::TempPath;
use wait_timeout::ChildExt;

use crate::block::{CodeBlock, ExecutionOutcome};
use crate::language::{BATCH, POWERSHELL, PYTHON, SHELL};

pub const TEMP_FILE_PREFIX: &str = "code-atlas-";
pub const SPAWN_FAILED_MESSAGE: &str = "Unable to start the child process.";
pub const TEMP_FILE_FAILED_MESSAGE: &str = "Failed to create temporary code file.";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Text encoding of the temporary script file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptEncoding {
    Utf8,
    /// UTF-16 little endian with a byte-order mark.
    Utf16LeBom,
}

impl ScriptEncoding {
    #[must_use]
    pub fn encode(self, code: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => code.as_bytes().to_vec(),
            Self::Utf16LeBom => {
                let mut bytes = vec![0xFF, 0xFE];
                for unit in code.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes
            }
        }
    }
}

/// How to run scripts of one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    /// Arguments placed before the script path.
    pub args: Vec<String>,
    /// File extension including the leading dot.
    pub extension: String,
    pub encoding: ScriptEncoding,
}

impl Interpreter {
    #[must_use]
    pub fn new(program: impl Into<String>, extension: &str) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            extension: normalize_extension(extension),
            encoding: ScriptEncoding::Utf8,
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = normalize_extension(extension);
        self
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: ScriptEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

fn normalize_extension(extension: &str) -> String {
    if extension.starts_with('.') || extension.is_empty() {
        extension.to_string()
    } else {
        format!(".{extension}")
    }
}

/// Canonical language tag to interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterTable {
    entries: BTreeMap<String, Interpreter>,
}

impl Default for InterpreterTable {
    fn default() -> Self {
        let python = if cfg!(windows) { "python" } else { "python3" };
        let powershell = if cfg!(windows) {
            Interpreter::new("powershell", ".ps1")
                .with_args(["-ExecutionPolicy", "Bypass", "-File"])
        } else {
            Interpreter::new("pwsh", ".ps1").with_args(["-File"])
        };

        Self::empty()
            .with(PYTHON, Interpreter::new(python, ".py"))
            .with(BATCH, Interpreter::new("cmd.exe", ".bat").with_args(["/C"]))
            .with(
                POWERSHELL,
                powershell.with_encoding(ScriptEncoding::Utf16LeBom),
            )
            .with(SHELL, Interpreter::new("bash", ".sh"))
    }
}

impl InterpreterTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, language: &str, interpreter: Interpreter) -> Self {
        self.insert(language, interpreter);
        self
    }

    pub fn insert(&mut self, language: &str, interpreter: Interpreter) {
        self.entries.insert(language.to_lowercase(), interpreter);
    }

    #[must_use]
    pub fn get(&self, language: &str) -> Option<&Interpreter> {
        self.entries.get(&language.to_lowercase())
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Outcomes of one batch, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ExecutionOutcome>,
}

impl BatchReport {
    /// Messages of every successful block, concatenated in order.
    #[must_use]
    pub fn full_output(&self) -> String {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.success)
            .map(|outcome| outcome.message.as_str())
            .collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ExecutionOutcome> {
        self.outcomes.last()
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    interpreters: InterpreterTable,
    timeout: Option<Duration>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(InterpreterTable::default())
    }
}

impl Executor {
    #[must_use]
    pub fn new(interpreters: InterpreterTable) -> Self {
        Self {
            interpreters,
            timeout: None,
        }
    }

    /// Bounds each child's run time. `None` waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn interpreters(&self) -> &InterpreterTable {
        &self.interpreters
    }

    /// Runs `blocks` sequentially, reporting each outcome to `on_outcome` as it completes.
    pub fn run_batch_with<F>(&self, blocks: Vec<CodeBlock>, mut on_outcome: F) -> BatchReport
    where
        F: FnMut(&CodeBlock, &ExecutionOutcome),
    {
        let mut report = BatchReport::default();
        for block in blocks {
            let outcome = self.run_block(&block);
            on_outcome(&block, &outcome);
            report.outcomes.push(outcome);
        }
        report
    }

    pub fn run_batch(&self, blocks: Vec<CodeBlock>) -> BatchReport {
        self.run_batch_with(blocks, |_, _| {})
    }

    pub fn run_block(&self, block: &CodeBlock) -> ExecutionOutcome {
        let Some(interpreter) = self.interpreters.get(&block.language) else {
            tracing::warn!(language = %block.language, "no interpreter for language");
            return ExecutionOutcome::failure(format!(
                "Unsupported language: {}",
                block.language
            ));
        };

        let script = match write_script(interpreter, &block.code) {
            Ok(script) => script,
            Err(error) => {
                tracing::warn!(%error, "failed to write temporary script");
                return ExecutionOutcome::failure(TEMP_FILE_FAILED_MESSAGE);
            }
        };

        let outcome = self.run_script(interpreter, &script);
        if let Err(error) = script.close() {
            tracing::warn!(%error, "failed to remove temporary script");
        }
        outcome
    }

    fn run_script(&self, interpreter: &Interpreter, script: &Path) -> ExecutionOutcome {
        let mut command = Command::new(&interpreter.program);
        command
            .args(&interpreter.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                tracing::warn!(
                    program = %interpreter.program,
                    %error,
                    "failed to start interpreter"
                );
                return ExecutionOutcome::failure(SPAWN_FAILED_MESSAGE);
            }
        };
        tracing::debug!(program = %interpreter.program, pid = child.id(), "interpreter started");

        let stdout = spawn_pipe_reader("code-exec-stdout", child.stdout.take());
        let stderr = spawn_pipe_reader("code-exec-stderr", child.stderr.take());

        let status = match self.wait(&mut child) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let secs = self.timeout.map(|timeout| timeout.as_secs()).unwrap_or_default();
                tracing::warn!(program = %interpreter.program, secs, "interpreter timed out");
                // Readers are left to finish on their own; a surviving grandchild may still
                // hold the pipes open.
                return ExecutionOutcome::failure(format!(
                    "Execution failed: timed out after {secs}s\n"
                ));
            }
            Err(error) => {
                tracing::warn!(%error, "failed waiting for interpreter");
                kill_and_reap(&mut child);
                return ExecutionOutcome::failed(&error.to_string());
            }
        };

        let stdout = join_pipe_reader(stdout);
        let stderr = join_pipe_reader(stderr);
        tracing::debug!(
            program = %interpreter.program,
            code = ?status.code(),
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "interpreter exited"
        );

        if status.success() {
            ExecutionOutcome::succeeded(&stdout)
        } else {
            ExecutionOutcome::failed(&stderr)
        }
    }

    /// `Ok(None)` means the timeout elapsed and the child was killed.
    fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let Some(timeout) = self.timeout else {
            return child.wait().map(Some);
        };
        match child.wait_timeout(timeout)? {
            Some(status) => Ok(Some(status)),
            None => {
                kill_and_reap(child);
                Ok(None)
            }
        }
    }
}

fn write_script(interpreter: &Interpreter, code: &str) -> io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(&interpreter.extension)
        .tempfile()?;
    file.write_all(&interpreter.encoding.encode(code))?;
    file.flush()?;
    // Close the handle so interpreters that lock open files can read the script.
    Ok(file.into_temp_path())
}

fn spawn_pipe_reader<R>(name: &str, pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    let mut pipe = pipe?;
    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut bytes = Vec::new();
        if let Err(error) = pipe.read_to_end(&mut bytes) {
            tracing::debug!(%error, "interpreter pipe read failed");
        }
        bytes
    });
    match spawned {
        Ok(handle) => Some(handle),
        Err(error) => {
            tracing::warn!(%error, "failed to spawn pipe reader");
            None
        }
    }
}

fn join_pipe_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
