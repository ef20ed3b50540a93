/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes two top-level command modules:

- `chat`: Interactive chat mode
- `ask`: Ask a single question and print the reply

Both drive a [`ChatSession`] and render replies through [`render_turn`],
which writes fragments as they arrive and abandons the turn when the
caller's cancel signal fires.
*/

use crate::config::Config;
use crate::error::{classify, ParleyError, Result};
use crate::session::{ChatSession, Message};
use colored::Colorize;
use std::future::Future;
use std::io::Write;

// Special commands parser for the interactive loop
pub mod special_commands;

/// How a rendered turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The reply arrived in full and was committed
    Committed(Message),
    /// The cancel signal fired first; nothing was committed
    Cancelled,
}

/// Sends one user turn and writes the reply to `out` as it arrives
///
/// # Arguments
///
/// * `session` - The session to submit to
/// * `text` - The user turn
/// * `out` - Where fragments are written
/// * `cancel` - Resolves when the user asks to stop the reply
///
/// # Errors
///
/// Returns the session's error when the turn cannot start or the reply
/// fails, and I/O errors from `out`
pub async fn render_turn<W, F>(
    session: &mut ChatSession,
    text: &str,
    out: &mut W,
    cancel: F,
) -> Result<TurnOutcome>
where
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let started = tokio::select! {
        biased;
        turn = session.start_turn(text) => Some(turn),
        _ = &mut cancel => None,
    };
    let mut turn = match started {
        Some(turn) => turn?,
        None => {
            writeln!(out)?;
            return Ok(TurnOutcome::Cancelled);
        }
    };

    loop {
        let step = tokio::select! {
            biased;
            _ = &mut cancel => None,
            fragment = turn.next_fragment() => Some(fragment),
        };

        match step {
            None => {
                drop(turn);
                writeln!(out)?;
                return Ok(TurnOutcome::Cancelled);
            }
            Some(fragment) => match fragment? {
                Some(fragment) => {
                    write!(out, "{}", fragment)?;
                    out.flush()?;
                }
                None => break,
            },
        }
    }

    let message = turn.finish().await?;
    writeln!(out)?;
    Ok(TurnOutcome::Committed(message))
}

/// Prints the user-facing notice for a failed turn
///
/// Completion failures get the generic notice; the detail goes to the log.
fn report_failure(err: &anyhow::Error) {
    match classify(err) {
        Some(ParleyError::InputRejected(_)) => {}
        Some(e) if e.is_completion_failure() => {
            tracing::debug!("Completion failure detail: {:#}", err);
            eprintln!("\n{}\n", e.notice().red());
        }
        _ => eprintln!("{}", format!("Error: {}", err).red()),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Builds a session from configuration and runs a readline-based loop
    //! that streams each reply to the terminal.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::prompts::{
        DEFAULT_SYSTEM_INSTRUCTIONS, INPUT_HINT, PERSONA_NAME, SUGGESTIONS_HEADING,
    };
    use crate::providers::Role;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns error if the session or the line editor cannot be created
    pub async fn run_chat(config: Config) -> Result<()> {
        let mut session = ChatSession::from_config(&config)?;
        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&session);
        print_conversation_start(&session);

        loop {
            let prompt = format!("{} ", "you>".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    let text = match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => trimmed.to_string(),
                        Ok(SpecialCommand::NewConversation) => {
                            match session.request_reset() {
                                Ok(()) => {
                                    println!("{}\n", "Started a new conversation.".cyan());
                                    print_conversation_start(&session);
                                }
                                Err(e) => report_failure(&e),
                            }
                            continue;
                        }
                        Ok(SpecialCommand::ShowHistory) => {
                            print_history(session.get_history());
                            continue;
                        }
                        Ok(SpecialCommand::Suggest(None)) => {
                            print_suggestions(session.suggestions());
                            continue;
                        }
                        Ok(SpecialCommand::Suggest(Some(index))) => {
                            match session.suggestions().get(index - 1) {
                                Some(suggestion) => {
                                    let suggestion = suggestion.clone();
                                    println!("{} {}", "you>".green().bold(), suggestion);
                                    suggestion
                                }
                                None => {
                                    eprintln!(
                                        "{}",
                                        format!(
                                            "No suggestion number {} ({} available)",
                                            index,
                                            session.suggestions().len()
                                        )
                                        .red()
                                    );
                                    continue;
                                }
                            }
                        }
                        Ok(SpecialCommand::ShowStatus) => {
                            print_status_display(&session);
                            continue;
                        }
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::Exit) => break,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    print!("{} ", "parley>".blue().bold());
                    let mut stdout = std::io::stdout();
                    match render_turn(&mut session, &text, &mut stdout, ctrl_c()).await {
                        Ok(TurnOutcome::Committed(_)) => println!(),
                        Ok(TurnOutcome::Cancelled) => {
                            println!("{}\n", "Reply cancelled.".yellow());
                        }
                        Err(e) => report_failure(&e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Display welcome banner at the start of interactive chat mode
    fn print_welcome_banner(session: &ChatSession) {
        let model = session
            .provider()
            .get_current_model()
            .unwrap_or_else(|_| "unknown".to_string());

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              Parley Interactive Chat - Welcome!              ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Model:  {}", model.cyan());
        if session.store().system_instructions() == DEFAULT_SYSTEM_INSTRUCTIONS {
            println!("Persona: {}", PERSONA_NAME.cyan());
            println!("{}", INPUT_HINT.dimmed());
        }
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    /// Print the greeting and, while the conversation is fresh, the starter
    /// suggestions
    fn print_conversation_start(session: &ChatSession) {
        if let Some(greeting) = session.store().conversation().greeting() {
            println!("{} {}\n", "parley>".blue().bold(), greeting);
        }
        let suggestions = session.starter_suggestions();
        if !suggestions.is_empty() {
            print_suggestions(suggestions);
        }
    }

    fn print_suggestions(suggestions: &[String]) {
        if suggestions.is_empty() {
            println!("{}\n", "No suggestions configured.".yellow());
            return;
        }
        println!("{}", SUGGESTIONS_HEADING.bold());
        for (i, suggestion) in suggestions.iter().enumerate() {
            println!("  {} {}", format!("{}.", i + 1).cyan(), suggestion);
        }
        println!("{}\n", "Use '/suggest <n>' to ask one.".dimmed());
    }

    fn print_history(history: &[Message]) {
        if history.is_empty() {
            println!("{}\n", "The conversation is empty.".yellow());
            return;
        }
        println!();
        for message in history {
            let label = match message.role() {
                Role::User => "you".green().bold(),
                Role::Assistant => "parley".blue().bold(),
            };
            match message.timestamp() {
                Some(at) => println!(
                    "{} {}",
                    label,
                    at.format("%H:%M:%S").to_string().dimmed()
                ),
                None => println!("{}", label),
            }
            println!("{}\n", message.content());
        }
    }

    /// Display status information about the current session
    fn print_status_display(session: &ChatSession) {
        let model = session
            .provider()
            .get_current_model()
            .unwrap_or_else(|_| "unknown".to_string());
        let conversation = session.store().conversation();
        let policy = session.store().policy();

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Parley Session Status                     ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Session:           {}", session.id());
        println!("Model:             {}", model.cyan());
        println!(
            "Streaming:         {}",
            if session.is_streaming() { "on" } else { "off" }
        );
        println!("Turn State:        {}", session.state());
        println!("Conversation Size: {} messages", conversation.len());
        println!("Estimated Tokens:  {}", conversation.token_count());
        match (policy.max_turns, policy.max_tokens) {
            (None, None) => println!("Context Window:    full history"),
            (turns, tokens) => println!(
                "Context Window:    {} turns, {} tokens",
                turns.map_or("any".to_string(), |t| t.to_string()),
                tokens.map_or("any".to_string(), |t| t.to_string())
            ),
        }
        println!();
    }
}

// Ask command handler
pub mod ask {
    //! One-shot question handler.

    use super::*;

    /// Ask a single question and print the reply to stdout
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `prompt` - The question
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be created, the reply fails, or
    /// the user cancels it
    pub async fn run_ask(config: Config, prompt: String) -> Result<()> {
        let mut session = ChatSession::from_config(&config)?;
        let mut stdout = std::io::stdout();

        match render_turn(&mut session, &prompt, &mut stdout, ctrl_c()).await {
            Ok(TurnOutcome::Committed(message)) => {
                tracing::debug!("Reply of {} bytes printed", message.content().len());
                Ok(())
            }
            Ok(TurnOutcome::Cancelled) => Err(anyhow::anyhow!("Reply cancelled")),
            Err(e) => {
                report_failure(&e);
                Err(e)
            }
        }
    }
}
