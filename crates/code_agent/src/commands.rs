#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    History,
    Quit,
    Unknown(String),
}

/// One line read at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Command(SlashCommand),
    Prompt(String),
}

pub const HELP_TEXT: &str = "Commands:
  /help     show this list
  /history  show the conversation so far
  /quit     exit (also `quit`, `exit`)
Anything else is sent to the model.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if matches!(trimmed, "quit" | "exit") {
        return Some(SlashCommand::Quit);
    }
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/history" => SlashCommand::History,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

pub fn parse_input(line: &str) -> ReplInput {
    let text = line.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return ReplInput::Empty;
    }
    match parse_slash_command(text) {
        Some(command) => ReplInput::Command(command),
        None => ReplInput::Prompt(text.to_string()),
    }
}
