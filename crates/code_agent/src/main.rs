use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use code_agent::app::{banner, run_repl};
use code_agent::backends::{backend_for, runtime_options, BackendKind};
use code_agent::config::{AgentConfig, ConfigError};
use code_agent::executor::Executor;
use code_agent::runtime::AgentRuntime;
use code_atlas::{
    install_signal_handlers, logging, EnvConfig, ProcessTerminal, StyledRenderer, TextStyle,
};

/// Streams a model's replies to the console and runs the code blocks it writes.
#[derive(Parser)]
#[command(name = "code-atlas")]
#[command(about = "Console agent that executes the model's code blocks", long_about = None)]
struct Cli {
    /// Config file (defaults to $CODE_ATLAS_CONFIG, then ./config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend to use, overriding `api.enabled` from the config file
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Append logs to this file
    #[arg(long)]
    log_file: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env = EnvConfig::from_env();
    if let Some(path) = cli.config {
        env.config_path = path;
    }
    if cli.log_file.is_some() {
        env.log_file = cli.log_file;
    }
    logging::init(&env).context("failed to open the log file")?;

    let config = match AgentConfig::load(&env.config_path) {
        Ok(config) => config,
        Err(ConfigError::Missing { path }) if cli.backend == Some(BackendKind::Mock) => {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            AgentConfig::default()
        }
        Err(error) => return Err(error.into()),
    };
    let kind = cli
        .backend
        .unwrap_or_else(|| BackendKind::from_config(&config));

    let backend = backend_for(kind, &config)?;
    let executor =
        Executor::new(config.interpreter_table()).with_timeout(config.execution_timeout());
    let renderer = StyledRenderer::new(ProcessTerminal::new().with_color(!env.no_color));
    let runtime = AgentRuntime::new(backend, executor, renderer, runtime_options(kind, &config));

    let signal_runtime = Arc::clone(&runtime);
    let _signals = install_signal_handlers(move || {
        signal_runtime.shutdown();
        std::process::exit(130);
    })
    .context("failed to install signal handlers")?;

    runtime.with_renderer(|renderer| renderer.line(&banner(&runtime), TextStyle::Notice));
    if kind == BackendKind::Local {
        runtime.with_renderer(|renderer| renderer.line("Loading model...", TextStyle::Notice));
    }
    runtime
        .start()
        .with_context(|| format!("failed to start the {} backend", kind.id()))?;

    let exit = run_repl(&runtime, io::stdin().lock())?;
    tracing::info!(?exit, "session ended");
    runtime.shutdown();
    Ok(())
}
