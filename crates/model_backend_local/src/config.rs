use std::time::Duration;

use model_backend::BackendError;
use serde_json::{Map, Value};

pub const DEFAULT_PROGRAM: &str = "llama-cli";
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameter keys mapped to CLI flags, in argument order. Other keys are ignored.
const PARAMETER_FLAGS: &[(&str, &str)] = &[
    ("max_length", "-n"),
    ("context_window", "-c"),
    ("temperature", "--temp"),
    ("top_k", "--top-k"),
    ("top_p", "--top-p"),
];

/// How to launch the local model process.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBackendConfig {
    pub program: String,
    pub model: String,
    pub system_prompt: String,
    pub parameters: Map<String, Value>,
    pub init_timeout: Duration,
}

impl LocalBackendConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            model: model.into(),
            system_prompt: String::new(),
            parameters: Map::new(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), BackendError> {
        if self.program.trim().is_empty() {
            return Err(BackendError::config("local.program must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(BackendError::config("model.name must not be empty"));
        }
        for (key, flag) in PARAMETER_FLAGS {
            if let Some(value) = self.parameters.get(*key) {
                if flag_value(value).is_none() {
                    return Err(BackendError::config(format!(
                        "model.parameters.{key} must be a number or string (for {flag})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Command-line arguments passed to [`LocalBackendConfig::program`].
    ///
    /// Sampling flags are only emitted for parameters that are present, so the program's own
    /// defaults apply to the rest. `-cnv` (conversation mode) is always last.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model.clone(),
            "-p".to_string(),
            self.system_prompt.clone(),
        ];

        for (key, flag) in PARAMETER_FLAGS {
            if let Some(value) = self.parameters.get(*key).and_then(flag_value) {
                args.push((*flag).to_string());
                args.push(value);
            }
        }

        args.push("-cnv".to_string());
        args
    }
}

fn flag_value(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}
