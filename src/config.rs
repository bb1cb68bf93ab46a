//! Runtime configuration from environment variables and argv
//!
//! `TG_TOKEN` and `CHAT_ID` are accepted as fallbacks for the bot token and
//! the notify chat. A `.env` file in the working directory is loaded first;
//! variables already set in the process environment win over it.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use tokio::time::Duration;

use crate::capture::{FrameSourceConfig, TestSourceConfig, VideoCaptureConfig};
use crate::core::DEFAULT_WEB_PORT;
use crate::session::SessionConfig;
use crate::storage::PhotoStoreConfig;
use crate::tunnel::{TunnelConfig, DEFAULT_TUNNEL_COMMAND};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub bot_token: String,
    /// Chat greeted on startup
    pub notify_chat: Option<i64>,
    /// Web server port
    pub web_port: u16,
    /// Photo directory and naming
    pub photos: PhotoStoreConfig,
    /// Capture process settings
    pub video: VideoCaptureConfig,
    /// Snapshot and live feed timing
    pub source: FrameSourceConfig,
    /// Tunnel command and URL wait
    pub tunnel: TunnelConfig,
    /// Use the synthetic source instead of a real camera
    pub test_source: bool,
}

/// Load `.env` from the working directory or its parents, if present
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Load a specific environment file without overriding variables already set
pub fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path(path)
        .with_context(|| format!("Failed to load environment file {}", path.display()))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_lookup(|key| std::env::var(key).ok(), &args)
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>, args: &[String]) -> Result<Self> {
        let bot_token = var("CATVISION_BOT_TOKEN")
            .or_else(|| var("TG_TOKEN"))
            .filter(|token| !token.trim().is_empty())
            .context("CATVISION_BOT_TOKEN (or TG_TOKEN) environment variable not set")?;

        let notify_chat = match var("CATVISION_CHAT_ID").or_else(|| var("CHAT_ID")) {
            Some(id) if !id.trim().is_empty() => Some(
                id.trim()
                    .parse::<i64>()
                    .context(format!("Invalid chat id: {}", id))?,
            ),
            _ => None,
        };

        let web_port = parse_or(&var, "CATVISION_WEB_PORT", DEFAULT_WEB_PORT)?;

        let defaults = PhotoStoreConfig::default();
        let photos = PhotoStoreConfig {
            root_path: var("CATVISION_PHOTO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.root_path),
            prefix: var("CATVISION_PHOTO_PREFIX").unwrap_or(defaults.prefix),
        };

        let defaults = VideoCaptureConfig::default();
        let video = VideoCaptureConfig {
            program: var("CATVISION_CAPTURE_PROGRAM").unwrap_or(defaults.program),
            input_format: var("CATVISION_INPUT_FORMAT").unwrap_or(defaults.input_format),
            device: var("CATVISION_DEVICE").unwrap_or(defaults.device),
            width: parse_or(&var, "CATVISION_WIDTH", defaults.width)?,
            height: parse_or(&var, "CATVISION_HEIGHT", defaults.height)?,
            fps: parse_or(&var, "CATVISION_FPS", defaults.fps)?,
            quality: defaults.quality,
        };

        let defaults = FrameSourceConfig::default();
        let source = FrameSourceConfig {
            warmup: Duration::from_millis(parse_or(
                &var,
                "CATVISION_WARMUP_MS",
                defaults.warmup.as_millis() as u64,
            )?),
            open_timeout: Duration::from_secs(parse_or(
                &var,
                "CATVISION_OPEN_TIMEOUT_SECS",
                defaults.open_timeout.as_secs(),
            )?),
            feed_capacity: defaults.feed_capacity,
        };

        let template =
            var("CATVISION_TUNNEL_CMD").unwrap_or_else(|| DEFAULT_TUNNEL_COMMAND.to_string());
        let mut tunnel = TunnelConfig::from_command_line(&template, web_port);
        tunnel.url_timeout = Duration::from_secs(parse_or(
            &var,
            "CATVISION_TUNNEL_TIMEOUT_SECS",
            tunnel.url_timeout.as_secs(),
        )?);

        let test_source = args.iter().any(|arg| arg == "--test-source");

        Ok(Self {
            bot_token,
            notify_chat,
            web_port,
            photos,
            video,
            source,
            tunnel,
            test_source,
        })
    }

    /// Session settings: bind on all interfaces at the web port
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.web_port)),
            tunnel: self.tunnel.clone(),
        }
    }

    /// Synthetic source matching the configured capture size
    pub fn test_source_config(&self) -> TestSourceConfig {
        TestSourceConfig {
            fps: self.video.fps,
            width: self.video.width,
            height: self.video.height,
            ..Default::default()
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .context(format!("Invalid {}: {}", key, value)),
        None => Ok(default),
    }
}
