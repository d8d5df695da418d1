//! Tracing bootstrap.
//!
//! The console belongs to the rendered conversation, so log output goes to a file when one is
//! configured and to stderr only in debug mode. Otherwise no subscriber is installed and
//! `tracing` macros are no-ops.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
    Disabled,
}

/// Installs the global subscriber described by `config`.
pub fn init(config: &EnvConfig) -> io::Result<LogTarget> {
    init_with(config.log_file.as_deref().map(Path::new), config.debug)
}

pub fn init_with(log_file: Option<&Path>, debug: bool) -> io::Result<LogTarget> {
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let installed = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init()
            .is_ok();
        return Ok(if installed {
            LogTarget::File
        } else {
            LogTarget::Disabled
        });
    }

    if debug {
        let installed = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(io::stderr)
            .try_init()
            .is_ok();
        return Ok(if installed {
            LogTarget::Stderr
        } else {
            LogTarget::Disabled
        });
    }

    Ok(LogTarget::Disabled)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_and_no_debug_installs_nothing() {
        assert_eq!(init_with(None, false).expect("init"), LogTarget::Disabled);
    }

    #[test]
    fn unwritable_log_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing").join("atlas.log");
        assert!(init_with(Some(&missing), false).is_err());
    }
}
