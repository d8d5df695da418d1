//! Line-oriented prompt loop.

use std::fmt::Write as _;
use std::io::{self, BufRead};

use code_atlas::{Terminal, TextStyle};
use model_backend::{BackendError, ConversationMessage};

use crate::commands::{parse_input, ReplInput, SlashCommand, HELP_TEXT};
use crate::runtime::{AgentRuntime, PROMPT};

const HISTORY_PREVIEW_CHARS: usize = 60;

/// Why the prompt loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    Quit,
    EndOfInput,
    BackendExited,
}

/// Startup banner: backend identity and runnable languages.
#[must_use]
pub fn banner<T: Terminal + 'static>(runtime: &AgentRuntime<T>) -> String {
    let profile = runtime.profile();
    let languages: Vec<&str> = runtime.executor().interpreters().languages().collect();
    format!(
        "Backend: {} (model: {})\nRunnable languages: {}\nType /help for commands.",
        profile.backend_id,
        if profile.model_id.is_empty() {
            "unspecified"
        } else {
            profile.model_id.as_str()
        },
        languages.join(", ")
    )
}

/// Reads lines from `input` and submits them as user turns until the session ends.
pub fn run_repl<T, R>(runtime: &AgentRuntime<T>, mut input: R) -> io::Result<ReplExit>
where
    T: Terminal + 'static,
    R: BufRead,
{
    let render_prompt = runtime.options().render_prompt;
    let mut line = String::new();
    loop {
        if render_prompt {
            runtime.with_renderer(|renderer| renderer.prompt(PROMPT));
        }
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(ReplExit::EndOfInput);
        }

        match parse_input(&line) {
            ReplInput::Empty => {}
            ReplInput::Command(SlashCommand::Quit) => return Ok(ReplExit::Quit),
            ReplInput::Command(SlashCommand::Help) => notice(runtime, HELP_TEXT),
            ReplInput::Command(SlashCommand::History) => {
                notice(runtime, &format_history(&runtime.history()));
            }
            ReplInput::Command(SlashCommand::Unknown(command)) => {
                notice(runtime, &format!("Unknown command {command}. Type /help."));
            }
            ReplInput::Prompt(text) => match runtime.submit(&text) {
                Ok(()) => {}
                Err(BackendError::Exited) => {
                    failure(runtime, "The model is no longer running.");
                    return Ok(ReplExit::BackendExited);
                }
                Err(error) => {
                    tracing::warn!(%error, "user turn failed");
                    failure(runtime, &error.to_string());
                }
            },
        }
    }
}

fn notice<T: Terminal + 'static>(runtime: &AgentRuntime<T>, text: &str) {
    runtime.with_renderer(|renderer| renderer.line(text, TextStyle::Notice));
}

fn failure<T: Terminal + 'static>(runtime: &AgentRuntime<T>, text: &str) {
    runtime.with_renderer(|renderer| renderer.line(text, TextStyle::Failure));
}

/// One line per message with a short preview of its first line.
#[must_use]
pub fn format_history(messages: &[ConversationMessage]) -> String {
    let mut out = format!("{} message(s) in the conversation", messages.len());
    for message in messages {
        let first_line = message.content.lines().next().unwrap_or_default();
        let mut preview: String = first_line.chars().take(HISTORY_PREVIEW_CHARS).collect();
        if first_line.chars().count() > HISTORY_PREVIEW_CHARS {
            preview.push_str("...");
        }
        let _ = write!(out, "\n  [{}] {preview}", message.role);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn history_lists_roles_with_previews() {
        let long = "x".repeat(80);
        let text = format_history(&[
            ConversationMessage::system("be brief"),
            ConversationMessage::user(format!("{long}\nsecond line")),
        ]);
        assert_eq!(
            text,
            format!(
                "2 message(s) in the conversation\n  [system] be brief\n  [user] {}...",
                "x".repeat(60)
            )
        );
    }

    #[test]
    fn empty_history_has_only_the_count() {
        assert_eq!(format_history(&[]), "0 message(s) in the conversation");
    }
}
