//! Synthetic camera for development and tests without hardware
//!
//! Renders a gradient with a moving bar and encodes it to JPEG in-process.

use std::io::Cursor;
use std::time::Instant;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::video::{frame_at, CameraBackend, VideoCapture};
use crate::core::JpegFrame;
use crate::error::CaptureError;

/// Configuration for the synthetic camera
#[derive(Debug, Clone)]
pub struct TestSourceConfig {
    /// Frames per second
    pub fps: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Stop after this many frames (emulates a device that drops out)
    pub max_frames: Option<u64>,
    /// Refuse to open (emulates a missing device)
    pub fail_open: bool,
}

impl Default for TestSourceConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            width: 320,
            height: 240,
            max_frames: None,
            fail_open: false,
        }
    }
}

/// Camera that produces synthetic JPEG frames
pub struct TestCamera {
    config: TestSourceConfig,
}

impl TestCamera {
    pub fn new(config: TestSourceConfig) -> Self {
        Self { config }
    }

    /// A camera that always fails to open
    pub fn unavailable() -> Self {
        Self::new(TestSourceConfig {
            fail_open: true,
            ..Default::default()
        })
    }
}

impl CameraBackend for TestCamera {
    fn describe(&self) -> String {
        format!(
            "test source ({}x{} @ {}fps)",
            self.config.width, self.config.height, self.config.fps
        )
    }

    fn start(&self) -> Result<(VideoCapture, mpsc::Receiver<JpegFrame>), CaptureError> {
        if self.config.fail_open {
            return Err(CaptureError::DeviceUnavailable(
                "test source configured as unavailable".to_string(),
            ));
        }

        let config = self.config.clone();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(config.fps.max(1) as usize);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_micros(1_000_000 / config.fps.max(1) as u64));
            let start = Instant::now();
            let mut seq = 0u64;

            info!(
                "Test video source started: {}x{} @ {}fps",
                config.width, config.height, config.fps
            );

            loop {
                if config.max_frames.is_some_and(|max| seq >= max) {
                    debug!("Test source reached its frame limit");
                    break;
                }

                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let payload = match render_frame(config.width, config.height, seq) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Test source failed to encode frame: {}", e);
                        break;
                    }
                };

                if tx.send(frame_at(seq, start, payload)).await.is_err() {
                    info!("Test source receiver dropped");
                    break;
                }
                seq += 1;
            }

            info!("Test video source stopped after {} frames", seq);
        });

        Ok((VideoCapture::from_task(cancel), rx))
    }
}

/// Render one synthetic frame and encode it to JPEG
pub fn render_frame(width: u32, height: u32, seq: u64) -> Result<Bytes, image::ImageError> {
    let bar_x = (seq * 4 % width.max(1) as u64) as u32;
    let image = RgbImage::from_fn(width, height, |x, y| {
        if x.abs_diff(bar_x) < 4 {
            Rgb([245, 197, 66])
        } else {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 96])
        }
    });

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, 80).encode_image(&image)?;
    Ok(Bytes::from(out.into_inner()))
}
