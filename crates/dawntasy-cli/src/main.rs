//! Dawntasy command-line chat client.
//!
//! Binary name: `dawntasy`
//!
//! Parses CLI arguments, sets up tracing, opens the data directory and
//! database, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use dawntasy_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        default_filter: cli.log_filter().to_string(),
        json: cli.log_json,
        enable_otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;
    let result = run(&cli, &state).await;

    state.shutdown().await;
    shutdown_tracing();
    result
}

async fn run(cli: &Cli, state: &AppState) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Chats => cli::chats::list_chats(state, &cli.user, cli.json).await,
        Commands::New => cli::chats::new_chat(state, &cli.user, cli.json).await,
        Commands::Show { id } => cli::chats::show_chat(state, &cli.user, *id, cli.json).await,
        Commands::Ask { chat, message } => {
            cli::chat::ask(state, &cli.user, *chat, &message.join(" "), cli.json).await
        }
        Commands::Chat { chat } => cli::chat::run_chat_loop(state, &cli.user, *chat).await,
    }
}
