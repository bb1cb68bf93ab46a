//! Chat command parsing

/// Reply keyboard label for a photo
pub const PHOTO_LABEL: &str = "📷 Photo";
/// Reply keyboard label for the live stream
pub const STREAM_LABEL: &str = "📺 Stream";
/// Reply keyboard label for stopping the stream
pub const STOP_LABEL: &str = "🛑 Stop";

/// Keyboard rows shown with the greeting
pub const MENU: [&str; 3] = [PHOTO_LABEL, STREAM_LABEL, STOP_LABEL];

/// A command received from the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Photo,
    Stream,
    Stop,
    Unknown,
}

impl BotCommand {
    /// Parse message text.
    ///
    /// Accepts keyboard labels, slash commands (with an optional `@botname`
    /// suffix) and bare words, case-insensitively.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text {
            PHOTO_LABEL => return Self::Photo,
            STREAM_LABEL => return Self::Stream,
            STOP_LABEL => return Self::Stop,
            _ => {}
        }

        let word = text.strip_prefix('/').unwrap_or(text);
        let word = word.split('@').next().unwrap_or(word);

        match word.to_ascii_lowercase().as_str() {
            "start" | "help" => Self::Start,
            "photo" | "snapshot" => Self::Photo,
            "stream" | "live" => Self::Stream,
            "stop" => Self::Stop,
            _ => Self::Unknown,
        }
    }
}
