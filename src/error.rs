//! Error types for capture, tunnel and session operations

use std::path::PathBuf;

/// Frame source errors
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to capture a frame: {0}")]
    CaptureFailed(String),

    #[error("Failed to write photo {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tunnel process errors
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Tunnel command is empty")]
    EmptyCommand,

    #[error("Tunnel command not found on PATH: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn tunnel process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Session-level errors reported back to the chat
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("Stream server failed to start: {0}")]
    Server(String),

    #[error("Public stream URL unavailable: {0}")]
    StreamUnreachable(String),
}
