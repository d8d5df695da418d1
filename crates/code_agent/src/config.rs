//! File configuration for the agent binary.
//!
//! The file is JSON with optional sections; every section has defaults except `model.name`,
//! which the api and local backends require. Unknown fields are rejected so typos surface at
//! startup instead of silently falling back to defaults.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use model_backend_api::{ApiBackendConfig, DEFAULT_BASE_URL};
use model_backend_local::{LocalBackendConfig, DEFAULT_PROGRAM};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::executor::{InterpreterTable, ScriptEncoding};
use crate::language::canonical_tag;

const DEFAULT_INIT_TIMEOUT_SEC: u64 = 30;
const DEFAULT_IDLE_THRESHOLD_MS: u64 = 1000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {path}")]
    Missing { path: PathBuf },

    #[error("I/O error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value {key}: {reason}")]
    Invalid { key: String, reason: &'static str },

    #[error("interpreter override for unknown language '{0}'")]
    UnknownLanguage(String),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: &'static str) -> Self {
        Self::Invalid {
            key: key.into(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub system: SystemSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub local: LocalSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Keyed by canonical tag or alias.
    #[serde(default)]
    pub interpreters: BTreeMap<String, InterpreterOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemSection {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    #[serde(default)]
    pub name: String,
    /// Shared between backends; each one picks the keys it understands.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            key: None,
            timeout_sec: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSection {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_init_timeout_sec")]
    pub init_timeout_sec: u64,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            init_timeout_sec: DEFAULT_INIT_TIMEOUT_SEC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Absent means wait for the interpreter as long as it runs.
    #[serde(default)]
    pub execution_timeout_sec: Option<u64>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            execution_timeout_sec: None,
        }
    }
}

/// Partial replacement for a built-in interpreter entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterpreterOverride {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub encoding: Option<ScriptEncoding>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

fn default_init_timeout_sec() -> u64 {
    DEFAULT_INIT_TIMEOUT_SEC
}

fn default_idle_threshold_ms() -> u64 {
    DEFAULT_IDLE_THRESHOLD_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl AgentConfig {
    /// Reads and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.timeout_sec == Some(0) {
            return Err(ConfigError::invalid("api.timeout_sec", "must be > 0"));
        }
        if self.local.init_timeout_sec == 0 {
            return Err(ConfigError::invalid("local.init_timeout_sec", "must be > 0"));
        }
        if self.local.program.trim().is_empty() {
            return Err(ConfigError::invalid("local.program", "must not be empty"));
        }
        if self.pipeline.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("pipeline.poll_interval_ms", "must be > 0"));
        }
        if self.pipeline.execution_timeout_sec == Some(0) {
            return Err(ConfigError::invalid(
                "pipeline.execution_timeout_sec",
                "must be > 0",
            ));
        }
        for (tag, entry) in &self.interpreters {
            if canonical_tag(tag).is_none() {
                return Err(ConfigError::UnknownLanguage(tag.clone()));
            }
            if entry.program.as_deref().is_some_and(|program| program.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    format!("interpreters.{tag}.program"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.pipeline.idle_threshold_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.pipeline.poll_interval_ms)
    }

    #[must_use]
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.pipeline.execution_timeout_sec.map(Duration::from_secs)
    }

    /// Built-in interpreters with the configured overrides applied.
    #[must_use]
    pub fn interpreter_table(&self) -> InterpreterTable {
        let mut table = InterpreterTable::default();
        for (tag, entry) in &self.interpreters {
            let Some(language) = canonical_tag(tag) else {
                continue;
            };
            let Some(mut interpreter) = table.get(language).cloned() else {
                continue;
            };
            if let Some(program) = &entry.program {
                interpreter.program = program.trim().to_string();
            }
            if let Some(args) = &entry.args {
                interpreter.args = args.clone();
            }
            if let Some(extension) = &entry.extension {
                interpreter = interpreter.with_extension(extension);
            }
            if let Some(encoding) = entry.encoding {
                interpreter.encoding = encoding;
            }
            table.insert(language, interpreter);
        }
        table
    }

    #[must_use]
    pub fn api_backend_config(&self) -> ApiBackendConfig {
        let mut config = ApiBackendConfig::new(self.api.base_url.clone(), self.model.name.clone())
            .with_system_prompt(self.system.prompt.clone())
            .with_parameters(self.model.parameters.clone());
        if let Some(key) = self.api.key.as_deref().filter(|key| !key.trim().is_empty()) {
            config = config.with_api_key(key);
        }
        if let Some(timeout) = self.api.timeout_sec {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        config
    }

    #[must_use]
    pub fn local_backend_config(&self) -> LocalBackendConfig {
        LocalBackendConfig::new(self.model.name.clone())
            .with_program(self.local.program.clone())
            .with_system_prompt(self.system.prompt.clone())
            .with_parameters(self.model.parameters.clone())
            .with_init_timeout(Duration::from_secs(self.local.init_timeout_sec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{POWERSHELL, SHELL};

    fn parse(json: &str) -> Result<AgentConfig, ConfigError> {
        let config: AgentConfig = serde_json::from_str(json).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from("inline.json"),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn empty_object_uses_defaults() {
        let config = parse("{}").expect("config");
        assert_eq!(config, AgentConfig::default());
        assert!(!config.api.enabled);
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.local.program, DEFAULT_PROGRAM);
        assert_eq!(config.idle_threshold(), Duration::from_millis(1000));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.execution_timeout(), None);
    }

    #[test]
    fn full_file_maps_onto_backend_configs() {
        let config = parse(
            r#"{
                "system": {"prompt": "You run code. Reply with fenced blocks only please."},
                "model": {"name": "qwen.gguf", "parameters": {"temperature": 0.2, "top_k": 40}},
                "api": {"enabled": true, "base_url": "http://localhost:8080/v1", "key": "sk-1",
                        "timeout_sec": 90},
                "local": {"program": "llama-run", "init_timeout_sec": 5},
                "pipeline": {"idle_threshold_ms": 250, "poll_interval_ms": 20,
                             "execution_timeout_sec": 10}
            }"#,
        )
        .expect("config");

        let api = config.api_backend_config();
        assert_eq!(api.base_url, "http://localhost:8080/v1");
        assert_eq!(api.api_key.as_deref(), Some("sk-1"));
        assert_eq!(api.model, "qwen.gguf");
        assert_eq!(api.timeout, Some(Duration::from_secs(90)));
        assert_eq!(api.parameters.get("top_k"), Some(&Value::from(40)));

        let local = config.local_backend_config();
        assert_eq!(local.program, "llama-run");
        assert_eq!(local.init_timeout, Duration::from_secs(5));
        assert_eq!(
            local.system_prompt,
            "You run code. Reply with fenced blocks only please."
        );

        assert_eq!(config.idle_threshold(), Duration::from_millis(250));
        assert_eq!(config.execution_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn blank_api_key_is_treated_as_absent() {
        let config = parse(r#"{"api": {"key": "  "}}"#).expect("config");
        assert_eq!(config.api_backend_config().api_key, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = parse(r#"{"pipeline": {"idle_ms": 5}}"#).expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("idle_ms"));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let error = parse(r#"{"pipeline": {"poll_interval_ms": 0}}"#).expect_err("zero poll");
        assert_eq!(
            error.to_string(),
            "invalid config value pipeline.poll_interval_ms: must be > 0"
        );
        assert!(parse(r#"{"api": {"timeout_sec": 0}}"#).is_err());
        assert!(parse(r#"{"pipeline": {"execution_timeout_sec": 0}}"#).is_err());
    }

    #[test]
    fn interpreter_overrides_resolve_aliases() {
        let config = parse(
            r#"{"interpreters": {
                "sh": {"program": "sh"},
                "ps1": {"extension": "ps1", "encoding": "utf8"}
            }}"#,
        )
        .expect("config");

        let table = config.interpreter_table();
        let shell = table.get(SHELL).expect("shell entry");
        assert_eq!(shell.program, "sh");
        assert_eq!(shell.extension, ".sh");

        let powershell = table.get(POWERSHELL).expect("powershell entry");
        assert_eq!(powershell.extension, ".ps1");
        assert_eq!(powershell.encoding, ScriptEncoding::Utf8);
        assert!(!powershell.args.is_empty());
    }

    #[test]
    fn interpreter_override_for_unknown_language_fails() {
        let error = parse(r#"{"interpreters": {"ruby": {"program": "ruby"}}}"#)
            .expect_err("unknown language");
        assert!(matches!(error, ConfigError::UnknownLanguage(tag) if tag == "ruby"));
    }

    #[test]
    fn load_reports_missing_files_distinctly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            AgentConfig::load(&missing),
            Err(ConfigError::Missing { .. })
        ));

        let present = dir.path().join("config.json");
        std::fs::write(&present, r#"{"model": {"name": "m"}}"#).expect("write config");
        assert_eq!(AgentConfig::load(&present).expect("load").model.name, "m");
    }
}
