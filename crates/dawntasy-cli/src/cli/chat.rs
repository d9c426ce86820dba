//! Sending messages: one-shot `ask` and the interactive chat loop.
//!
//! Both open (or create) a chat through a `SessionCache`, so the reply is
//! streamed to the terminal while it is assembled and the open chat stays
//! in sync with writes from other sessions.

use std::io::Write;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

use dawntasy_types::chat::ChatMessage;
use dawntasy_types::error::ChatError;

use crate::state::{AppState, ConcreteSession};

/// Typed in the interactive loop to leave it.
const EXIT_COMMAND: &str = "/exit";

/// Send a single message and print the reply.
///
/// # Examples
///
/// ```bash
/// dawntasy ask What is the Rift?
/// dawntasy ask --chat <chat-id> And who guards it?
/// ```
pub async fn ask(state: &AppState, user: &str, chat: Option<Uuid>, message: &str, json: bool) -> Result<()> {
    let mut session = state.session(user)?;
    let chat_id = open_or_create(&mut session, chat).await?;

    let result = if json {
        session.send_message(message, |_: &str| {}).await
    } else {
        stream_reply(&session, message).await
    };
    let reply = result?;

    if json {
        let output = serde_json::json!({
            "chat_id": chat_id,
            "reply": reply,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    session.close().await;
    Ok(())
}

/// Run the interactive chat loop until `/exit` or end of input.
pub async fn run_chat_loop(state: &AppState, user: &str, chat: Option<Uuid>) -> Result<()> {
    let mut session = state.session(user)?;
    let chat_id = open_or_create(&mut session, chat).await?;

    let title = session
        .current_chat()
        .await
        .map(|c| c.title)
        .unwrap_or_default();
    print_banner(&title, chat_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  {} ", style("You >").green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!("\n  {}", style("Session ended.").dim());
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == EXIT_COMMAND {
            println!("  {}", style("Goodbye.").dim());
            break;
        }

        match stream_reply(&session, line).await {
            Ok(_) => {}
            Err(ChatError::Stream(e)) => {
                // The question is stored; the user can simply ask again.
                eprintln!("\n  {} No reply: {e}", style("!").yellow().bold());
            }
            Err(e) => {
                warn!(error = %e, "Message not sent");
                eprintln!("\n  {} {e}", style("✗").red().bold());
            }
        }
    }

    session.close().await;
    info!(chat_id = %chat_id, "Chat loop finished");
    Ok(())
}

/// Open `chat` if given, else create a fresh chat and open that.
async fn open_or_create(session: &mut ConcreteSession, chat: Option<Uuid>) -> Result<Uuid, ChatError> {
    let chat_id = match chat {
        Some(id) => id,
        None => session.create_chat().await?,
    };
    session.open_chat(chat_id).await?;
    Ok(chat_id)
}

/// Send `message`, printing reply fragments as they arrive.
async fn stream_reply(session: &ConcreteSession, message: &str) -> Result<ChatMessage, ChatError> {
    let spinner = thinking_spinner();
    let mut started = false;

    let result = session
        .send_message(message, |delta: &str| {
            if !started {
                spinner.finish_and_clear();
                print!("  {} ", style("Dawntasy >").cyan().bold());
                started = true;
            }
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .await;

    spinner.finish_and_clear();
    if started {
        println!();
        println!();
    }
    result
}

fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

fn print_banner(title: &str, chat_id: Uuid) {
    println!();
    println!("  {}", style(title).cyan().bold());
    println!("  {}", style(format!("chat {chat_id}")).dim());
    println!(
        "  {}",
        style(format!("Type {EXIT_COMMAND} to leave.")).dim()
    );
    println!();
}
