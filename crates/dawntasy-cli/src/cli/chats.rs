//! Chat browsing commands: list, new, show.
//!
//! These only touch the chat store, so they work without an API key.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use dawntasy_core::chat::store::ChatStore;
use dawntasy_types::chat::{Chat, MessageRole};
use dawntasy_types::error::ChatError;

use crate::state::AppState;

/// Longest title shown in the chat table before it is cut.
const TITLE_COLUMN_CHARS: usize = 40;

/// List the user's chats with title, last update and message count.
///
/// # Examples
///
/// ```bash
/// dawntasy chats
/// dawntasy chats --json
/// ```
pub async fn list_chats(state: &AppState, user: &str, json: bool) -> Result<()> {
    let chats = state.store.list_chats(user).await.map_err(ChatError::Fetch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
        return Ok(());
    }

    if chats.is_empty() {
        println!();
        println!(
            "  {} No chats yet. Start one with: {}",
            style("i").blue().bold(),
            style("dawntasy chat").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Title").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Id").fg(Color::White),
    ]);

    for chat in &chats {
        table.add_row(vec![
            Cell::new(shorten(&chat.title, TITLE_COLUMN_CHARS)).fg(Color::Cyan),
            Cell::new(chat.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::White),
            Cell::new(chat.messages.len().to_string()).fg(Color::White),
            Cell::new(chat.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} chat{}",
        style(chats.len()).bold(),
        if chats.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// Create an empty chat and print its id.
pub async fn new_chat(state: &AppState, user: &str, json: bool) -> Result<()> {
    let chat = Chat::new(user, state.config.chat.default_title.clone());
    state
        .store
        .create_chat(&chat)
        .await
        .map_err(ChatError::Persistence)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
    } else {
        println!();
        println!(
            "  {} Created chat {}",
            style("✓").green().bold(),
            style(chat.id).cyan()
        );
        println!(
            "  Continue it with: {}",
            style(format!("dawntasy chat --chat {}", chat.id)).yellow()
        );
        println!();
    }
    Ok(())
}

/// Print one chat with its full transcript.
pub async fn show_chat(state: &AppState, user: &str, chat_id: Uuid, json: bool) -> Result<()> {
    let chat = state
        .store
        .get_chat(&chat_id, user)
        .await
        .map_err(|e| ChatError::from_fetch(chat_id, e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&chat.title).cyan().bold());
    println!(
        "  {}",
        style(format!(
            "{} · created {} · {} messages",
            chat.id,
            chat.created_at.format("%Y-%m-%d %H:%M"),
            chat.messages.len()
        ))
        .dim()
    );
    println!();

    for message in &chat.messages {
        let speaker = match message.role {
            MessageRole::User => style("You").green().bold(),
            MessageRole::Assistant => style("Dawntasy").cyan().bold(),
            MessageRole::System => style("System").dim(),
        };
        println!("  {speaker} {}", style(message.timestamp.format("%H:%M")).dim());
        for line in message.content.lines() {
            println!("    {line}");
        }
        println!();
    }

    Ok(())
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_keeps_short_titles() {
        assert_eq!(shorten("What is the Rift?", 40), "What is the Rift?");
    }

    #[test]
    fn test_shorten_counts_chars_not_bytes() {
        assert_eq!(shorten("épéeépée", 6), "épé...");
    }
}
