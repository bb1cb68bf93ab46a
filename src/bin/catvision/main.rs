//! CatVision Binary
//!
//! Telegram bot that takes photos with a webcam and publishes a live stream
//! through localtunnel.
//!
//! ## Usage
//!
//! ```bash
//! export CATVISION_BOT_TOKEN=<telegram-bot-token>
//! # (or put CATVISION_BOT_TOKEN=... in a .env file)
//!
//! # Run with a real webcam (ffmpeg + v4l2)
//! catvision
//!
//! # Run with the synthetic test source (development)
//! catvision --test-source
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use catvision::{
    CameraBackend, CommandDispatcher, Config, FrameSource, PhotoStore, ProcessCamera, Session,
    TelegramBot, TestCamera,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present, before the log filter and config read the environment
    let env_file = catvision::load_dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("catvision=info".parse()?),
        )
        .init();

    if let Some(path) = &env_file {
        info!(path = %path.display(), "Loaded environment file");
    }

    // Load configuration
    let config = Config::from_env()?;

    let tunnel_program = config
        .tunnel
        .resolve()
        .context("Tunnel command cannot be started (set CATVISION_TUNNEL_CMD)")?;

    info!("CatVision starting");
    info!("  Web port: {}", config.web_port);
    info!("  Photos: {:?}", config.photos.root_path);
    info!("  Tunnel: {:?}", tunnel_program);
    info!("  Test source: {}", config.test_source);

    let backend: Arc<dyn CameraBackend> = if config.test_source {
        Arc::new(TestCamera::new(config.test_source_config()))
    } else {
        Arc::new(ProcessCamera::new(config.video.clone()))
    };
    info!("  Camera: {}", backend.describe());

    let source = FrameSource::new(
        backend,
        PhotoStore::new(config.photos.clone()),
        config.source.clone(),
    );
    let session = Session::new(Arc::new(source), config.session());

    let bot = TelegramBot::new(
        &config.bot_token,
        CommandDispatcher::new(Arc::clone(&session)),
        config.notify_chat,
    );
    let bot_cancel = bot.cancel_token();

    let tracker = TaskTracker::new();
    let bot_task = tracker.spawn(async move { bot.run().await });
    tracker.close();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down...");
        }
        _ = bot_task => {
            info!("Bot exited");
        }
    }

    bot_cancel.cancel();
    session.shutdown().await;
    tracker.wait().await;

    info!("CatVision stopped");
    Ok(())
}
