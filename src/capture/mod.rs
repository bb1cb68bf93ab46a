//! Capture module for webcam frames
//!
//! This module handles everything that touches the camera:
//! - MJPEG capture via an external process (ffmpeg)
//! - A synthetic test source for development without hardware
//! - MJPEG stream parsing
//! - The frame source shared by snapshots and live viewers

pub mod jpeg;
pub mod source;
pub mod test_source;
pub mod video;

// Re-export commonly used types
pub use source::{FrameSequence, FrameSource, FrameSourceConfig, SourceStats};
pub use test_source::{TestCamera, TestSourceConfig};
pub use video::{CameraBackend, ProcessCamera, VideoCapture, VideoCaptureConfig};
