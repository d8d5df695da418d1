//! Output sinks for rendered text.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};

/// Minimal terminal interface used by the renderer.
pub trait Terminal: Send {
    /// Write output to the terminal.
    fn write(&mut self, data: &str);

    fn flush(&mut self) {}

    /// Whether the sink understands SGR sequences.
    fn supports_color(&self) -> bool {
        false
    }
}

/// Terminal backed by the process stdout.
#[derive(Debug, Default)]
pub struct ProcessTerminal {
    color: bool,
}

impl ProcessTerminal {
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_terminal(),
        }
    }

    pub fn with_color(mut self, enabled: bool) -> Self {
        self.color = self.color && enabled;
        self
    }
}

impl Terminal for ProcessTerminal {
    fn write(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        let mut stdout = io::stdout().lock();
        if let Err(error) = write_all_with(data.as_bytes(), |buf| stdout.write(buf)) {
            tracing::warn!(%error, "failed to write to stdout");
        }
    }

    fn flush(&mut self) {
        let _ = io::stdout().flush();
    }

    fn supports_color(&self) -> bool {
        self.color
    }
}

/// Retries interrupted and short writes until every byte is written.
fn write_all_with<F>(bytes: &[u8], mut write_once: F) -> io::Result<()>
where
    F: FnMut(&[u8]) -> io::Result<usize>,
{
    let mut written = 0;
    while written < bytes.len() {
        match write_once(&bytes[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(count) => {
                let remaining = bytes.len() - written;
                if count > remaining {
                    return Err(io::Error::other(
                        "write returned more bytes than requested",
                    ));
                }
                written += count;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// In-memory terminal that records everything written. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureTerminal {
    output: Arc<Mutex<String>>,
    color: bool,
}

impl CaptureTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color() -> Self {
        Self {
            output: Arc::default(),
            color: true,
        }
    }

    pub fn output(&self) -> String {
        match self.output.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded output with SGR sequences removed.
    pub fn plain_output(&self) -> String {
        strip_sgr(&self.output())
    }
}

impl Terminal for CaptureTerminal {
    fn write(&mut self, data: &str) {
        match self.output.lock() {
            Ok(mut guard) => guard.push_str(data),
            Err(poisoned) => poisoned.into_inner().push_str(data),
        }
    }

    fn supports_color(&self) -> bool {
        self.color
    }
}

/// Removes `ESC [ ... m` sequences.
pub fn strip_sgr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for inner in chars.by_ref() {
                if inner == 'm' {
                    break;
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}
