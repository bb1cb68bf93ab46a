//! CatVision - remote webcam driven from a Telegram chat
//!
//! This crate provides everything needed to run the bot:
//! - Capture: webcam frames via ffmpeg, or a synthetic test source
//! - Storage: timestamped photo files
//! - Web: MJPEG live stream over HTTP
//! - Tunnel: public URL for the web server via localtunnel
//! - Session: the Idle/Streaming state and everything it owns
//! - Bot: command parsing, dispatch, and the Telegram transport
//!
//! # Example
//!
//! ```ignore
//! use catvision::{FrameSource, PhotoStore, ProcessCamera, Session, SessionConfig};
//!
//! let source = FrameSource::new(
//!     Arc::new(ProcessCamera::new(VideoCaptureConfig::default())),
//!     PhotoStore::new(PhotoStoreConfig::default()),
//!     FrameSourceConfig::default(),
//! );
//! let session = Session::new(Arc::new(source), SessionConfig::default());
//!
//! let photo = session.snapshot().await?;
//! let url = session.start_stream().await?;
//! ```

// Core types and protocol
pub mod core;

// Error types
pub mod error;

// Webcam capture and the shared live feed
pub mod capture;

// Photo files
pub mod storage;

// HTTP stream server
pub mod web;

// Public URL via an external tunnel client
pub mod tunnel;

// Session state
pub mod session;

// Chat front end
pub mod bot;

// Environment configuration
pub mod config;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use core::JpegFrame;
pub use error::{CaptureError, SessionError, TunnelError};

pub use capture::{
    CameraBackend, FrameSequence, FrameSource, FrameSourceConfig, ProcessCamera, TestCamera,
    TestSourceConfig, VideoCapture, VideoCaptureConfig,
};
pub use storage::{PhotoStore, PhotoStoreConfig};
pub use web::{StreamControl, StreamServer, StreamStatus};
pub use tunnel::{Tunnel, TunnelConfig, UrlDiscovery};
pub use session::{Session, SessionConfig, SessionState, StopOutcome, StreamStart};
pub use bot::{BotCommand, CommandDispatcher, Reply, TelegramBot};
pub use config::{load_dotenv, load_env_file, Config};
