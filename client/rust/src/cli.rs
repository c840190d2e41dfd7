//! CLI interface for the campus chat client
//!
//! Provides command parsing, text rendering of the store, and the async loop
//! that interleaves stdin with periodic redraws of whatever the pollers changed.

use crate::client::MessagingClient;
use crate::error::{ClientError, Result};
use crate::models::{Conversation, ConversationKey, Message, MessageStatus, UserId, UserSummary};
use crate::store::{ChatState, Notice, NoticeLevel};
use crate::sync::SendOutcome;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const RENDER_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Open(ConversationKey),
    Chat(UserId),
    Search(String),
    Block,
    Report,
    Close,
    Resend,
    Help,
    Message(String),
    Quit,
}

/// Parse a conversation reference: a user id, or `group:<id>`
pub fn parse_key(input: &str) -> ConversationKey {
    match input.trim().strip_prefix("group:") {
        Some(group_id) => ConversationKey::Group(group_id.trim().to_string()),
        None => ConversationKey::Direct(UserId::from(input)),
    }
}

/// Parse a command from user input
pub fn parse_command(input: &str) -> Result<Command> {
    let input = input.trim();
    if !input.starts_with('/') {
        return Ok(Command::Message(input.to_string()));
    }

    let (name, arg) = match input.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (input, ""),
    };
    let required = |usage: &str| {
        if arg.is_empty() {
            Err(ClientError::InvalidCommand(format!("Usage: {}", usage)))
        } else {
            Ok(arg.to_string())
        }
    };

    match name {
        "/list" => Ok(Command::List),
        "/open" => required("/open <user-id | group:id>").map(|a| Command::Open(parse_key(&a))),
        "/chat" => required("/chat <user-id>").map(|a| Command::Chat(UserId::from(a))),
        // An empty query is meaningful: it clears the results
        "/search" => Ok(Command::Search(arg.to_string())),
        "/block" => Ok(Command::Block),
        "/report" => Ok(Command::Report),
        "/close" => Ok(Command::Close),
        "/resend" => Ok(Command::Resend),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        _ => Err(ClientError::InvalidCommand(format!("Unknown command: {}", name))),
    }
}

/// Format one conversation list row
pub fn format_conversation(conversation: &Conversation) -> String {
    let mut line = format!("[{}] {}", conversation.key, conversation.display_name);
    if conversation.online {
        line.push_str(" *");
    }
    if conversation.unread_count > 0 {
        line.push_str(&format!(" ({} unread)", conversation.unread_count));
    }
    if conversation.reported {
        line.push_str(" [reported]");
    }
    if conversation.placeholder {
        line.push_str(" [offline]");
    }
    if !conversation.last_message.is_empty() {
        line.push_str(&format!(": {}", conversation.last_message));
    }
    line
}

/// Format a message for display
pub fn format_message(message: &Message, other_name: &str) -> String {
    let author = if message.is_mine() { "me" } else { other_name };
    let mut line = format!(
        "{} <{}> {}",
        message.timestamp.format("%H:%M"),
        author,
        message.content
    );
    match message.status {
        MessageStatus::Sending => line.push_str(" (sending)"),
        MessageStatus::Failed => line.push_str(" (failed, /resend to retry)"),
        MessageStatus::Sent | MessageStatus::Seen => {}
    }
    line
}

/// Format one search result
pub fn format_user(user: &UserSummary) -> String {
    let mut line = format!("  {}  {}", user.id, user.display_name());
    if !user.email.is_empty() {
        line.push_str(&format!(" <{}>", user.email));
    }
    if !user.role.is_empty() {
        line.push_str(&format!(" ({})", user.role));
    }
    line
}

pub fn format_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("!! {}: {}", tag, notice.text)
}

/// Rejected commands read as a plain hint; anything that reached the network is an error
pub fn format_error(error: &ClientError) -> String {
    if error.is_rejection() {
        format!("Not sent: {}", error)
    } else {
        format!("Error: {}", error)
    }
}

/// Async stdin reader that yields one line at a time
///
/// # Returns
/// - `Ok(Some(line))` - User entered a line
/// - `Ok(None)` - EOF reached (Ctrl+D)
/// - `Err(e)` - I/O error
pub async fn read_line_async(reader: &mut BufReader<tokio::io::Stdin>) -> Result<Option<String>> {
    let mut line = String::new();
    match reader.read_line(&mut line).await? {
        0 => Ok(None),
        _ => Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string())),
    }
}

/// Read stdin on its own task so a redraw never interrupts a partial line
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut reader = BufReader::new(tokio::io::stdin());
        loop {
            match read_line_async(&mut reader).await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

/// Tracks what has been printed so each redraw only shows changes
#[derive(Default)]
struct Renderer {
    epoch: u64,
    shown: HashMap<String, MessageStatus>,
    search_generation: u64,
}

impl Renderer {
    fn message_key(message: &Message) -> String {
        match &message.client_ref {
            Some(temp_id) => temp_id.to_string(),
            None => message.id.to_string(),
        }
    }

    /// Lines for everything that changed since the previous call
    fn changes(&mut self, state: &ChatState) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(thread) = &state.thread {
            if thread.epoch != self.epoch {
                self.epoch = thread.epoch;
                self.shown.clear();
            }
            let other_name = state
                .conversation(&thread.key)
                .map(|c| c.display_name.clone())
                .unwrap_or_else(|| thread.key.to_string());
            for message in thread.display_order() {
                let key = Self::message_key(message);
                if self.shown.get(&key) != Some(&message.status) {
                    self.shown.insert(key, message.status);
                    lines.push(format_message(message, &other_name));
                }
            }
        }

        let search = &state.search;
        if !search.in_flight && search.generation != self.search_generation {
            self.search_generation = search.generation;
            if !search.query.is_empty() {
                lines.push(format!("Search results for '{}':", search.query));
                if search.results.is_empty() {
                    lines.push("  (no matches)".to_string());
                }
                lines.extend(search.results.iter().map(format_user));
            }
        }

        lines
    }
}

async fn print_conversations(client: &MessagingClient) {
    let conversations = client.conversations().await;
    if conversations.is_empty() {
        println!("No conversations yet. /search for someone to /chat with.");
    }
    for conversation in &conversations {
        println!("{}", format_conversation(conversation));
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /list                     show conversations");
    println!("  /open <user-id|group:id>  open a conversation");
    println!("  /search <query>           find people to chat with");
    println!("  /chat <user-id>           start a chat with a search result");
    println!("  /block, /report           moderate the open conversation");
    println!("  /resend                   resend the last failed message");
    println!("  /close, /quit");
    println!("Anything else is sent to the open conversation.");
}

/// Execute one command; returns false when the loop should end
async fn handle_command(client: &MessagingClient, command: Command) -> Result<bool> {
    match command {
        Command::List => print_conversations(client).await,
        Command::Open(key) => {
            client.open(&key).await?;
            println!("Opened {}", key);
        }
        Command::Chat(user_id) => {
            let user = client
                .search_results()
                .await
                .into_iter()
                .find(|u| u.id == user_id)
                .unwrap_or(UserSummary {
                    id: user_id,
                    name: String::new(),
                    email: String::new(),
                    role: String::new(),
                    is_active: true,
                });
            let conversation = client.start_chat(&user).await?;
            println!("Chatting with {}", conversation.display_name);
        }
        Command::Search(query) => client.search(&query).await,
        Command::Block => {
            let key = require_open(client).await?;
            client.block(&key).await?;
            println!("Blocked {}", key);
        }
        Command::Report => {
            let key = require_open(client).await?;
            client.report(&key).await?;
            println!("Reported {}", key);
        }
        Command::Close => client.close().await,
        Command::Resend => {
            let temp_id = client
                .last_failed()
                .await
                .ok_or_else(|| ClientError::MessageNotFound("no failed message".to_string()))?;
            report_outcome(client.resend(&temp_id).await?);
        }
        Command::Help => print_help(),
        Command::Message(text) => report_outcome(client.send(&text).await?),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

async fn require_open(client: &MessagingClient) -> Result<ConversationKey> {
    client
        .active_conversation()
        .await
        .map(|c| c.key)
        .ok_or_else(|| ClientError::ConversationNotFound("no conversation is open".to_string()))
}

fn report_outcome(outcome: SendOutcome) {
    if let SendOutcome::Failed { error, .. } = outcome {
        log::debug!("Send failed: {}", error);
    }
}

/// Run the interactive loop until `/quit` or EOF
pub async fn run_client_loop(client: &MessagingClient) -> Result<()> {
    println!("Campus chat as user {}. Type /help for commands.", client.config().user_id);

    let mut lines = spawn_stdin_reader();
    let mut renderer = Renderer::default();
    let mut redraw = tokio::time::interval(RENDER_INTERVAL);
    let mut listed = false;
    prompt()?;

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    prompt()?;
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => match handle_command(client, command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            if !e.is_rejection() {
                                log::warn!("Command failed: {}", e);
                            }
                            println!("{}", format_error(&e));
                        }
                    },
                    Err(e) => println!("{}", e),
                }
                prompt()?;
            }
            _ = redraw.tick() => {
                let state = client.snapshot().await;
                if !listed && state.list_applied_seq > 0 {
                    listed = true;
                    print_conversations(client).await;
                }
                let mut output = renderer.changes(&state);
                output.extend(client.take_notices().await.iter().map(format_notice));
                if !output.is_empty() {
                    println!();
                    for line in output {
                        println!("{}", line);
                    }
                    prompt()?;
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TempId;
    use crate::store::ThreadState;

    #[test]
    fn test_parse_open_command() {
        assert_eq!(
            parse_command("/open 42").unwrap(),
            Command::Open(ConversationKey::Direct(UserId::from(42)))
        );
        assert_eq!(
            parse_command("/open group:7").unwrap(),
            Command::Open(ConversationKey::Group("7".to_string()))
        );
    }

    #[test]
    fn test_parse_list_command() {
        assert_eq!(parse_command("/list").unwrap(), Command::List);
    }

    #[test]
    fn test_parse_regular_message() {
        assert_eq!(
            parse_command("Hello world").unwrap(),
            Command::Message("Hello world".to_string())
        );
    }

    #[test]
    fn test_parse_search_allows_empty_query() {
        assert_eq!(parse_command("/search ken").unwrap(), Command::Search("ken".to_string()));
        assert_eq!(parse_command("/search").unwrap(), Command::Search(String::new()));
    }

    #[test]
    fn test_missing_argument_rejected() {
        assert!(matches!(parse_command("/chat"), Err(ClientError::InvalidCommand(_))));
        assert!(matches!(parse_command("/open   "), Err(ClientError::InvalidCommand(_))));
    }

    #[test]
    fn test_invalid_command() {
        assert!(parse_command("/unknown").is_err());
    }

    #[test]
    fn test_format_message_status() {
        let mut message = Message::provisional("hi");
        assert!(format_message(&message, "Ana").ends_with("<me> hi (sending)"));
        message.status = MessageStatus::Failed;
        assert!(format_message(&message, "Ana").contains("(failed"));
    }

    #[test]
    fn test_format_conversation() {
        let user = UserSummary {
            id: UserId::from(3),
            name: "Ben".to_string(),
            email: String::new(),
            role: String::new(),
            is_active: true,
        };
        let mut conversation = Conversation::started_with(&user);
        conversation.unread_count = 2;
        conversation.last_message = "yo".to_string();
        assert_eq!(format_conversation(&conversation), "[3] Ben (2 unread): yo");
    }

    #[test]
    fn test_renderer_prints_status_changes_once() {
        let mut state = ChatState::default();
        let key = ConversationKey::Direct(UserId::from(2));
        let mut thread = ThreadState::new(key, Some(UserId::from(2)), 1);
        let mut message = Message::provisional_as(TempId::new(), "hi");
        thread.messages.push(message.clone());
        state.thread = Some(thread);

        let mut renderer = Renderer::default();
        assert_eq!(renderer.changes(&state).len(), 1);
        assert!(renderer.changes(&state).is_empty());

        message.status = MessageStatus::Sent;
        if let Some(thread) = state.thread.as_mut() {
            thread.messages = vec![message];
        }
        assert_eq!(renderer.changes(&state).len(), 1);
    }

    #[test]
    fn test_format_error_distinguishes_rejections() {
        assert_eq!(
            format_error(&ClientError::EmptyMessage),
            "Not sent: Cannot send an empty message"
        );
        let failure = ClientError::Server {
            status: 503,
            message: "down".to_string(),
        };
        assert!(format_error(&failure).starts_with("Error: "));
    }
}
