//! Telegram front end
//!
//! Long-polls the Bot API with teloxide, feeds every text message through the
//! [`CommandDispatcher`] and renders the reply. Updates from the same chat are
//! handled one at a time.

use teloxide::prelude::*;
use teloxide::types::{InputFile, KeyboardButton, KeyboardMarkup};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::{CommandDispatcher, Reply, GREETING};
use super::command::MENU;

/// Telegram bot bound to a dispatcher
pub struct TelegramBot {
    bot: Bot,
    dispatcher: CommandDispatcher,
    notify_chat: Option<ChatId>,
    cancel_token: CancellationToken,
}

impl TelegramBot {
    pub fn new(token: &str, dispatcher: CommandDispatcher, notify_chat: Option<i64>) -> Self {
        Self {
            bot: Bot::new(token),
            dispatcher,
            notify_chat: notify_chat.map(ChatId),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Poll for updates until cancelled
    pub async fn run(&self) {
        if let Some(chat) = self.notify_chat {
            let greeting = Reply::Menu {
                text: GREETING.to_string(),
                buttons: MENU.to_vec(),
            };
            if let Err(e) = send_reply(&self.bot, chat, greeting).await {
                warn!("Failed to greet chat {}: {}", chat.0, e);
            }
        }

        let dispatcher = self.dispatcher.clone();
        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let dispatcher = dispatcher.clone();
            async move {
                let Some(text) = msg.text() else {
                    return Ok(());
                };
                debug!(chat = msg.chat.id.0, text, "Message received");

                let reply = dispatcher.handle_text(text).await;
                send_reply(&bot, msg.chat.id, reply).await
            }
        });

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|_| async {})
            .build();

        let shutdown_token = dispatcher.shutdown_token();
        let cancel = self.cancel_token.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Ok(done) = shutdown_token.shutdown() {
                done.await;
            }
        });

        info!("Telegram bot polling");
        dispatcher.dispatch().await;
        info!("Telegram bot stopped");
    }
}

/// Build a one-row reply keyboard
pub fn keyboard(buttons: &[&str]) -> KeyboardMarkup {
    let row: Vec<KeyboardButton> = buttons
        .iter()
        .map(|label| KeyboardButton::new(*label))
        .collect();
    KeyboardMarkup::new(vec![row]).resize_keyboard()
}

/// Render a dispatcher reply into Telegram messages
pub async fn send_reply(bot: &Bot, chat: ChatId, reply: Reply) -> ResponseResult<()> {
    match reply {
        Reply::Text(text) => {
            bot.send_message(chat, text).await?;
        }
        Reply::Menu { text, buttons } => {
            bot.send_message(chat, text)
                .reply_markup(keyboard(&buttons))
                .await?;
        }
        Reply::Photo { path, caption } => {
            bot.send_photo(chat, InputFile::file(path))
                .caption(caption)
                .await?;
        }
    }
    Ok(())
}
