use std::sync::Arc;
use std::time::Duration;

use model_backend::{BackendError, ModelBackend};
use model_backend_api::{ApiBackend, API_BACKEND_ID};
use model_backend_local::{LocalBackend, LOCAL_BACKEND_ID};
use model_backend_mock::{ScriptedBackend, MOCK_BACKEND_ID};

use crate::config::AgentConfig;
use crate::runtime::RuntimeOptions;

const MOCK_TOKEN_DELAY: Duration = Duration::from_millis(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    Api,
    Local,
    Mock,
}

impl BackendKind {
    /// `api.enabled` selects the remote backend, otherwise the local one.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        if config.api.enabled {
            Self::Api
        } else {
            Self::Local
        }
    }

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Api => API_BACKEND_ID,
            Self::Local => LOCAL_BACKEND_ID,
            Self::Mock => MOCK_BACKEND_ID,
        }
    }

    pub fn from_id(backend_id: &str) -> Result<Self, String> {
        match backend_id.trim() {
            API_BACKEND_ID => Ok(Self::Api),
            LOCAL_BACKEND_ID => Ok(Self::Local),
            MOCK_BACKEND_ID => Ok(Self::Mock),
            unknown => Err(format!(
                "Unsupported backend '{unknown}'. Available backends: \
                 {API_BACKEND_ID}, {LOCAL_BACKEND_ID}, {MOCK_BACKEND_ID}"
            )),
        }
    }
}

pub fn backend_for(
    kind: BackendKind,
    config: &AgentConfig,
) -> Result<Arc<dyn ModelBackend>, BackendError> {
    let backend: Arc<dyn ModelBackend> = match kind {
        BackendKind::Api => Arc::new(ApiBackend::new(config.api_backend_config())?),
        BackendKind::Local => Arc::new(LocalBackend::new(config.local_backend_config())?),
        BackendKind::Mock => {
            let mut backend = ScriptedBackend::default().with_token_delay(MOCK_TOKEN_DELAY);
            if !config.system.prompt.trim().is_empty() {
                backend = backend.with_system_prompt(&config.system.prompt);
            }
            Arc::new(backend)
        }
    };
    tracing::info!(backend = kind.id(), model = %config.model.name, "backend selected");
    Ok(backend)
}

#[must_use]
pub fn runtime_options(kind: BackendKind, config: &AgentConfig) -> RuntimeOptions {
    RuntimeOptions {
        idle_threshold: config.idle_threshold(),
        poll_interval: config.poll_interval(),
        render_prompt: kind != BackendKind::Local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_for_supports_mock_without_a_model() {
        let backend = backend_for(BackendKind::Mock, &AgentConfig::default())
            .expect("mock backend should resolve");
        assert_eq!(backend.profile().backend_id, "mock");
    }

    #[test]
    fn api_backend_requires_a_model_name() {
        let error = match backend_for(BackendKind::Api, &AgentConfig::default()) {
            Ok(_) => panic!("blank model should fail"),
            Err(error) => error,
        };
        assert!(matches!(error, BackendError::Config(_)));
    }

    #[test]
    fn api_flag_selects_the_remote_backend() {
        let mut config = AgentConfig::default();
        assert_eq!(BackendKind::from_config(&config), BackendKind::Local);
        config.api.enabled = true;
        assert_eq!(BackendKind::from_config(&config), BackendKind::Api);
    }

    #[test]
    fn from_id_rejects_unknown_backends() {
        assert_eq!(BackendKind::from_id(" local "), Ok(BackendKind::Local));
        let error = BackendKind::from_id("custom").expect_err("unknown backend");
        assert!(error.contains("Unsupported backend 'custom'"));
    }

    #[test]
    fn local_models_draw_their_own_prompt() {
        let config = AgentConfig::default();
        assert!(!runtime_options(BackendKind::Local, &config).render_prompt);
        assert!(runtime_options(BackendKind::Api, &config).render_prompt);
        assert_eq!(
            runtime_options(BackendKind::Mock, &config).idle_threshold,
            Duration::from_millis(1000)
        );
    }
}
