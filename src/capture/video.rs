//! Video capture module
//!
//! Provides MJPEG capture from a webcam by running an external capture
//! command (ffmpeg by default) and splitting its stdout into JPEG frames.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::jpeg::JpegParser;
use crate::core::JpegFrame;
use crate::error::CaptureError;

/// A camera that can be opened to produce JPEG frames.
///
/// Opening returns the capture handle together with the frame receiver.
/// The receiver yields `None` once the device stops producing frames.
pub trait CameraBackend: Send + Sync {
    /// Human-readable backend description for logs
    fn describe(&self) -> String;

    /// Open the device and start producing frames
    fn start(&self) -> Result<(VideoCapture, mpsc::Receiver<JpegFrame>), CaptureError>;
}

/// Video capture configuration
#[derive(Debug, Clone)]
pub struct VideoCaptureConfig {
    /// Capture program (resolved on PATH)
    pub program: String,
    /// Input format passed to `-f` (e.g. `v4l2`, `avfoundation`, `dshow`)
    pub input_format: String,
    /// Device path or name passed to `-i`
    pub device: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: u32,
    /// JPEG quality scale (2 = best, 31 = worst)
    pub quality: u8,
}

impl Default for VideoCaptureConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            input_format: "v4l2".to_string(),
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 15,
            quality: 5,
        }
    }
}

impl VideoCaptureConfig {
    /// Command line arguments for the capture program
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        if !self.input_format.is_empty() {
            args.push("-f".to_string());
            args.push(self.input_format.clone());
        }

        args.extend([
            "-video_size".to_string(),
            format!("{}x{}", self.width, self.height),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            self.device.clone(),
            "-f".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            self.quality.to_string(),
            "-".to_string(), // Output to stdout
        ]);

        args
    }
}

/// Camera backed by an external capture process
pub struct ProcessCamera {
    config: VideoCaptureConfig,
}

impl ProcessCamera {
    pub fn new(config: VideoCaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VideoCaptureConfig {
        &self.config
    }
}

impl CameraBackend for ProcessCamera {
    fn describe(&self) -> String {
        format!(
            "{} {} ({}x{} @ {}fps)",
            self.config.program,
            self.config.device,
            self.config.width,
            self.config.height,
            self.config.fps
        )
    }

    fn start(&self) -> Result<(VideoCapture, mpsc::Receiver<JpegFrame>), CaptureError> {
        VideoCapture::start_process(&self.config)
    }
}

/// Handle to a running video capture.
///
/// Stopping (or dropping) the handle releases the device: the capture
/// process is killed and the frame receiver drains to `None`.
pub struct VideoCapture {
    child: Option<Child>,
    cancel: CancellationToken,
}

impl VideoCapture {
    /// Wrap a capture driven by an in-process task that watches `cancel`
    pub(crate) fn from_task(cancel: CancellationToken) -> Self {
        Self { child: None, cancel }
    }

    /// Start capture by spawning the configured capture program
    fn start_process(
        config: &VideoCaptureConfig,
    ) -> Result<(Self, mpsc::Receiver<JpegFrame>), CaptureError> {
        let (tx, rx) = mpsc::channel(config.fps.max(1) as usize); // Buffer ~1 second

        let args = config.args();
        info!(
            "Starting {}: {} @ {}x{} {}fps",
            config.program, config.device, config.width, config.height, config.fps
        );
        debug!("{} args: {:?}", config.program, args);

        let mut child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!(
                    "failed to spawn {}: {}",
                    config.program, e
                ))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("no stdout from {}", config.program))
        })?;

        if let Some(stderr) = child.stderr.take() {
            let program = config.program.clone();
            tokio::task::spawn_blocking(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(program = %program, "{}", line);
                }
            });
        }

        tokio::task::spawn_blocking(move || {
            Self::read_video_stream(stdout, tx);
        });

        Ok((
            Self {
                child: Some(child),
                cancel: CancellationToken::new(),
            },
            rx,
        ))
    }

    /// Read the MJPEG stream from stdout and send frames to the channel
    fn read_video_stream<R: Read>(mut reader: R, tx: mpsc::Sender<JpegFrame>) {
        let mut buf = vec![0u8; 65536];
        let mut parser = JpegParser::new();
        let start = Instant::now();
        let mut seq = 0u64;
        let mut total_bytes = 0u64;

        'read: loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    info!("Video stream ended (EOF)");
                    break;
                }
                Ok(n) => {
                    total_bytes += n as u64;
                    for image in parser.feed(&buf[..n]) {
                        let frame = frame_at(seq, start, image);
                        seq += 1;

                        if seq % 300 == 0 {
                            debug!("Video capture: {} frames, {} bytes total", seq, total_bytes);
                        }

                        if tx.blocking_send(frame).is_err() {
                            info!("Video receiver dropped, stopping capture");
                            break 'read;
                        }
                    }
                }
                Err(e) => {
                    error!("Error reading video stream: {}", e);
                    break;
                }
            }
        }

        info!("Video capture finished: {} frames, {} bytes", seq, total_bytes);
    }

    /// Whether the capture has not been stopped yet
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop capture and release the device
    pub fn stop(&mut self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping video capture");
            self.cancel.cancel();
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wrap raw encoded bytes in a frame with the given sequence number
pub(crate) fn frame_at(seq: u64, start: Instant, payload: Bytes) -> JpegFrame {
    JpegFrame::new(seq, start.elapsed().as_micros() as u64, payload)
}
