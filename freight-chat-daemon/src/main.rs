//! Freight Chat
//!
//! Terminal client for the freight marketplace chat: joins a conversation
//! over the live STOMP channel and falls back to REST for history.

mod config;
mod diagnostics;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use diagnostics::{Cli, Command};
use freight_chat_protocol::{
    factory_for, merge, ApiClient, ChatClient, ChatRoom, ConversationId, MessageStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use view::ChatView;

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_from(&path).context("Failed to load configuration")?;
    config.override_token(cli.token.clone());
    Ok(config)
}

/// Interactive chat loop
async fn run_chat(config: &Config, conversation: ConversationId) -> Result<()> {
    let api = config.api_client()?;
    let chat_config = config.chat_config()?;
    info!(
        "Chat endpoint {} via {}",
        chat_config.endpoint, chat_config.transport
    );

    let factory = factory_for(chat_config.transport);
    let client = ChatClient::new(chat_config, factory);
    let room = ChatRoom::new(client, Arc::new(api), config.api.token.clone());
    let mut updates = room.updates();
    let mut view = ChatView::new();

    if let Err(e) = room.connect().await {
        warn!("Live chat unavailable: {}", e);
        eprintln!("Live chat unavailable: {}", e.user_message());
        if let Some(hint) = view::connect_hint(&e) {
            eprintln!("{}", hint);
        }
    }
    room.select_conversation(conversation)
        .await
        .with_context(|| format!("Failed to open conversation {}", conversation))?;

    println!("Conversation #{} (/reconnect, /quit)", conversation);
    print_lines(view.render(&room.snapshot()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            snapshot = updates.changed() => match snapshot {
                Some(snapshot) => print_lines(view.render(&snapshot)),
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "/reconnect" => {
                        room.disconnect();
                        if let Err(e) = room.connect().await {
                            eprintln!("Reconnect failed: {}", e.user_message());
                            if let Some(hint) = view::connect_hint(&e) {
                                eprintln!("{}", hint);
                            }
                        }
                    }
                    text => {
                        if let Err(e) = room.send(text).await {
                            eprintln!("Message not sent: {}", e.user_message());
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    room.disconnect();
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

async fn print_history(api: &ApiClient, conversation: ConversationId) -> Result<()> {
    let records = api
        .fetch_history(conversation)
        .await
        .with_context(|| format!("Failed to fetch history of conversation {}", conversation))?;
    let messages = merge(&records, &[]);
    if messages.is_empty() {
        println!("No messages in conversation #{}", conversation);
    }
    for message in &messages {
        println!("{}", view::format_message(message));
    }
    Ok(())
}

async fn list_conversations(api: &ApiClient) -> Result<()> {
    let conversations = api
        .fetch_conversations()
        .await
        .context("Failed to fetch conversations")?;
    if conversations.is_empty() {
        println!("No conversations");
    }
    for conversation in &conversations {
        println!("{}", view::format_conversation(conversation));
    }
    Ok(())
}

fn dump_config(config: &Config, show_sensitive: bool) -> Result<()> {
    let chat = config.chat_config()?;

    println!("\n=== Chat Configuration ===");
    println!("\n[API]");
    println!("Base URL: {}", config.api.base_url);
    println!("Timeout: {} seconds", config.api.timeout_secs);
    if let Some(user_id) = config.api.user_id {
        println!("User ID: {}", user_id);
    }
    if show_sensitive {
        println!("Token: {}", config.api.token.as_deref().unwrap_or("(not set)"));
    } else {
        println!("Token: {}", diagnostics::redact(config.api.token.as_deref()));
    }

    println!("\n[Chat]");
    println!("Endpoint: {}", chat.endpoint);
    println!("Transport: {}", chat.transport);
    println!("Connect timeout: {} ms", chat.connect_timeout.as_millis());
    println!(
        "Reconnect: {} attempts, base delay {} ms",
        chat.max_reconnect_attempts,
        chat.reconnect_base_delay.as_millis()
    );
    println!("Heart-beat: {}", chat.heart_beat().to_header());
    println!("Topic prefix: {}", chat.topic_prefix);
    println!("Send prefix: {}", chat.send_prefix);
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    let config = load_config(&cli)?;

    match cli.command {
        Command::Chat { conversation } => run_chat(&config, ConversationId(conversation)).await,
        Command::History { conversation } => {
            print_history(&config.api_client()?, ConversationId(conversation)).await
        }
        Command::Conversations => list_conversations(&config.api_client()?).await,
        Command::DumpConfig { show_sensitive } => dump_config(&config, show_sensitive),
    }
}
