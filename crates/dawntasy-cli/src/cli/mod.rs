//! CLI command definitions for the `dawntasy` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod chats;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Chat with the Dawntasy assistant from your terminal.
#[derive(Parser)]
#[command(name = "dawntasy", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Owner id the session acts as.
    #[arg(long, global = true, env = "DAWNTASY_USER", default_value = "local")]
    pub user: String,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs as JSON lines (stderr).
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List your chats, most recently updated first.
    #[command(alias = "ls")]
    Chats,

    /// Create an empty chat.
    New,

    /// Show a chat with all its messages.
    Show {
        /// Chat id.
        id: Uuid,
    },

    /// Send one message and print the reply.
    Ask {
        /// Continue this chat instead of starting a new one.
        #[arg(long)]
        chat: Option<Uuid>,

        /// The message to send.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Start an interactive chat (`/exit` to leave).
    Chat {
        /// Continue this chat instead of starting a new one.
        #[arg(long)]
        chat: Option<Uuid>,
    },
}

impl Cli {
    /// Default log filter for the chosen verbosity; `RUST_LOG` overrides it.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,dawntasy=debug",
            _ => "trace",
        }
    }
}
