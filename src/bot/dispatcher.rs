//! Command dispatcher: drives the session and renders chat replies

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::command::{BotCommand, MENU};
use crate::session::{Session, StopOutcome, StreamStart};

pub const GREETING: &str = "🐾 CatVision is ready to watch the cat!";
pub const HELP: &str =
    "Use the buttons below, or send /photo, /stream or /stop.";

/// A reply to send back to the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Text with the reply keyboard
    Menu {
        text: String,
        buttons: Vec<&'static str>,
    },
    Photo {
        path: PathBuf,
        caption: String,
    },
}

impl Reply {
    fn menu(text: impl Into<String>) -> Self {
        Self::Menu {
            text: text.into(),
            buttons: MENU.to_vec(),
        }
    }
}

/// Maps chat commands onto session operations
#[derive(Clone)]
pub struct CommandDispatcher {
    session: Arc<Session>,
}

impl CommandDispatcher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Parse and handle raw message text
    pub async fn handle_text(&self, text: &str) -> Reply {
        self.handle(BotCommand::parse(text)).await
    }

    /// Handle a command. Failures become text replies.
    pub async fn handle(&self, command: BotCommand) -> Reply {
        info!(?command, "Handling command");

        match command {
            BotCommand::Start => Reply::menu(GREETING),
            BotCommand::Unknown => Reply::menu(HELP),

            BotCommand::Photo => match self.session.snapshot().await {
                Ok(path) => {
                    let caption = path
                        .file_name()
                        .map(|name| format!("📷 {}", name.to_string_lossy()))
                        .unwrap_or_else(|| "📷".to_string());
                    Reply::Photo { path, caption }
                }
                Err(e) => {
                    warn!("Snapshot failed: {}", e);
                    Reply::Text(format!("❌ Could not take a photo: {}", e))
                }
            },

            BotCommand::Stream => match self.session.start_stream().await {
                Ok(StreamStart::Started(url)) => {
                    Reply::Text(format!("🔴 Live stream available at:\n{}", url))
                }
                Ok(StreamStart::AlreadyStreaming(url)) => {
                    Reply::Text(format!("🔴 Already streaming:\n{}", url))
                }
                Err(e) => {
                    warn!("Stream start failed: {}", e);
                    Reply::Text(format!("❌ Could not get a stream link: {}", e))
                }
            },

            BotCommand::Stop => match self.session.stop().await {
                StopOutcome::Stopped { .. } => Reply::Text("🛑 Stream stopped".to_string()),
                StopOutcome::Noop => Reply::Text("🛑 Nothing was running".to_string()),
            },
        }
    }
}
