//! Command-line interface definition for Parley
//!
//! This module defines the CLI structure using clap's derive API,
//! providing an interactive chat command and a one-shot ask command.

use clap::{Parser, Subcommand};

/// Parley - terminal chat with a hosted language model
///
/// Keeps one conversation per session, resends its history with every
/// question and streams replies as they are generated.
#[derive(Parser, Debug, Clone)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to $PARLEY_CONFIG, then the
    /// platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Parley
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Override the provider from config (groq, ollama)
        #[arg(long)]
        provider: Option<String>,

        /// Override the model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Wait for whole replies instead of streaming them
        #[arg(long)]
        no_stream: bool,
    },

    /// Ask a single question and print the reply
    Ask {
        /// The question to ask
        #[arg(short, long)]
        prompt: String,

        /// Override the provider from config (groq, ollama)
        #[arg(long)]
        provider: Option<String>,

        /// Override the model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
}

/// Per-command overrides applied on top of the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOverrides<'a> {
    /// Provider type override
    pub provider: Option<&'a str>,
    /// Model override for the selected provider
    pub model: Option<&'a str>,
    /// Disable streaming
    pub no_stream: bool,
}

impl Commands {
    /// Overrides carried by this command
    pub fn overrides(&self) -> SessionOverrides<'_> {
        match self {
            Commands::Chat {
                provider,
                model,
                no_stream,
            }
            | Commands::Ask {
                provider,
                model,
                no_stream,
                ..
            } => SessionOverrides {
                provider: provider.as_deref(),
                model: model.as_deref(),
                no_stream: *no_stream,
            },
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            verbose: false,
            json_logs: false,
            command: Commands::Chat {
                provider: None,
                model: None,
                no_stream: false,
            },
        }
    }
}
