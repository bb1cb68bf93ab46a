//! Chat bot: command parsing, dispatch, and the Telegram transport

pub mod command;
pub mod dispatcher;
pub mod telegram;

pub use command::BotCommand;
pub use dispatcher::{CommandDispatcher, Reply};
pub use telegram::TelegramBot;
