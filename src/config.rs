//! Environment configuration.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_path: PathBuf,
    pub log_file: Option<String>,
    pub no_color: bool,
    pub debug: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            config_path: env_string_opt("CODE_ATLAS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
            log_file: env_string_opt("CODE_ATLAS_LOG_FILE"),
            no_color: env_flag("CODE_ATLAS_NO_COLOR") || env_string_opt("NO_COLOR").is_some(),
            debug: env_flag("CODE_ATLAS_DEBUG"),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
