//! Special commands parser for interactive chat mode
//!
//! This module parses the special commands that can be entered during an
//! interactive chat session. Special commands allow users to:
//! - Start a new conversation
//! - Review the conversation so far
//! - List or submit starter suggestions
//! - View session status and help
//! - Exit the session
//!
//! Commands are prefixed with `/` and are case-insensitive.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
///
/// These commands act on the session rather than being sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Discard the conversation and start over
    ///
    /// The greeting, if configured, is seeded again.
    NewConversation,

    /// Print the conversation so far
    ShowHistory,

    /// List starter suggestions, or submit the numbered one (1-based)
    Suggest(Option<usize>),

    /// Display session status
    ///
    /// Shows provider, model, streaming mode, turn state and history size.
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent to the model as a user turn.
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` if input starts with "/" but is not
/// a valid command, and `CommandError::UnsupportedArgument` if `/suggest`
/// receives something other than a positive number.
///
/// # Examples
///
/// ```
/// use parley::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// let cmd = parse_special_command("/new").unwrap();
/// assert_eq!(cmd, SpecialCommand::NewConversation);
///
/// let cmd = parse_special_command("/suggest 2").unwrap();
/// assert_eq!(cmd, SpecialCommand::Suggest(Some(2)));
///
/// let cmd = parse_special_command("What is a ribosome?").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    // Plain text is a user turn, except the bare exit words
    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    match lower.as_str() {
        "/new" | "/reset" | "/clear" => Ok(SpecialCommand::NewConversation),
        "/history" => Ok(SpecialCommand::ShowHistory),
        "/suggest" | "/suggestions" => Ok(SpecialCommand::Suggest(None)),
        input if input.starts_with("/suggest ") => {
            let arg = input["/suggest ".len()..].trim();
            match arg.parse::<usize>() {
                Ok(index) if index > 0 => Ok(SpecialCommand::Suggest(Some(index))),
                _ => Err(CommandError::UnsupportedArgument {
                    command: "/suggest".to_string(),
                    arg: arg.to_string(),
                }),
            }
        }
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help information for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

CONVERSATION:
  /new            - Start a new conversation (also /reset, /clear)
  /history        - Show the conversation so far
  /suggest        - List starter suggestions
  /suggest <n>    - Ask starter suggestion number n

SESSION INFORMATION:
  /status         - Show provider, model and conversation size
  /help           - Show this help message
  /?              - Same as /help

SESSION CONTROL:
  exit            - Exit interactive mode
  quit            - Same as exit
  Ctrl-C          - Cancel the reply being streamed; at the prompt, exit

NOTES:
  - Commands are case-insensitive
  - Regular text (not starting with /) is sent to the model
  - The whole conversation is sent with every question
"#
    );
}
