//! Frame source: snapshots and the shared live feed
//!
//! The live camera is a single slot. While it is open, every `/video` viewer
//! and every snapshot reads from the same broadcast feed, so the device is
//! never opened twice. The slot is released when:
//! - `release()` is called (stop command or stop button)
//! - the last viewer disconnects
//! - the device stops producing frames
//!
//! A snapshot taken while no live camera is open keeps the slot locked for the
//! whole single-shot capture, so new viewers wait for it. `stats()` and
//! `is_live()` read a gauge kept beside the slot and never wait.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::video::{CameraBackend, VideoCapture};
use crate::core::{JpegFrame, LIVE_FEED_CAPACITY};
use crate::error::CaptureError;
use crate::storage::PhotoStore;

/// Lazily produced sequence of live frames.
///
/// Ends (without error) when the live camera is released or the device fails.
pub type FrameSequence = BoxStream<'static, JpegFrame>;

/// Frame source timing configuration
#[derive(Debug, Clone)]
pub struct FrameSourceConfig {
    /// Delay after opening before a snapshot is taken (exposure/focus settle)
    pub warmup: Duration,
    /// Maximum wait for the first frame after opening the device
    pub open_timeout: Duration,
    /// Live feed buffer; slower viewers skip frames
    pub feed_capacity: usize,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(500),
            open_timeout: Duration::from_secs(10),
            feed_capacity: LIVE_FEED_CAPACITY,
        }
    }
}

/// Statistics about the frame source
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Whether the live camera is currently open
    pub live: bool,
    /// Connected live viewers
    pub viewers: usize,
    /// Frames forwarded to the live feed since startup
    pub frames_captured: u64,
    /// Snapshots written since startup
    pub snapshots_taken: u64,
}

/// The open live camera
struct LiveCamera {
    id: u64,
    capture: VideoCapture,
    feed: broadcast::Sender<JpegFrame>,
    cancel: CancellationToken,
}

impl LiveCamera {
    fn shutdown(mut self) {
        self.cancel.cancel();
        self.capture.stop();
    }
}

type LiveSlot = Arc<Mutex<Option<LiveCamera>>>;

/// Slot occupancy, updated under the slot lock and read without it
#[derive(Debug, Default)]
struct LiveGauge {
    open: AtomicBool,
    viewers: AtomicUsize,
}

/// Counts one live viewer for as long as its sequence exists
struct ViewerGuard(Arc<LiveGauge>);

impl ViewerGuard {
    fn new(gauge: &Arc<LiveGauge>) -> Self {
        gauge.viewers.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(gauge))
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.0.viewers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Camera access for snapshots and the live stream
pub struct FrameSource {
    backend: Arc<dyn CameraBackend>,
    store: PhotoStore,
    config: FrameSourceConfig,
    live: LiveSlot,
    gauge: Arc<LiveGauge>,
    next_id: AtomicU64,
    stats: Arc<RwLock<SourceStats>>,
}

impl FrameSource {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        store: PhotoStore,
        config: FrameSourceConfig,
    ) -> Self {
        Self {
            backend,
            store,
            config,
            live: Arc::new(Mutex::new(None)),
            gauge: Arc::new(LiveGauge::default()),
            next_id: AtomicU64::new(0),
            stats: Arc::new(RwLock::new(SourceStats::default())),
        }
    }

    /// Photo store used for snapshots
    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    /// Get current statistics
    pub async fn stats(&self) -> SourceStats {
        let mut stats = self.stats.read().await.clone();
        stats.live = self.gauge.open.load(Ordering::Acquire);
        stats.viewers = self.gauge.viewers.load(Ordering::Relaxed);
        stats
    }

    /// Whether the live camera is open
    pub async fn is_live(&self) -> bool {
        self.gauge.open.load(Ordering::Acquire)
    }

    /// Capture one photo and save it to the photo directory.
    ///
    /// While the live camera is open the next live frame is used instead of
    /// opening the device a second time.
    pub async fn capture_snapshot(&self) -> Result<PathBuf, CaptureError> {
        let live = self.live.lock().await;
        let feed = live.as_ref().map(|cam| cam.feed.subscribe());
        let frame = match feed {
            Some(rx) => {
                drop(live);
                debug!("Snapshot from live feed");
                self.next_live_frame(rx).await?
            }
            None => {
                // Keep the slot locked so a viewer cannot open the device meanwhile
                let frame = self.capture_single().await;
                drop(live);
                frame?
            }
        };

        let path = self.store.save(&frame.payload).await?;
        self.stats.write().await.snapshots_taken += 1;
        Ok(path)
    }

    /// Open the device, wait for it to settle, read one frame, close it
    async fn capture_single(&self) -> Result<JpegFrame, CaptureError> {
        let (mut capture, mut rx, _first) = self.open().await?;

        let settle = Instant::now() + self.config.warmup;
        loop {
            tokio::select! {
                _ = sleep_until(settle) => break,
                frame = rx.recv() => {
                    if frame.is_none() {
                        capture.stop();
                        return Err(CaptureError::CaptureFailed(
                            "device stopped during warm-up".to_string(),
                        ));
                    }
                }
            }
        }

        let frame = timeout(self.config.open_timeout, rx.recv()).await;
        capture.stop();

        match frame {
            Ok(Some(frame)) => {
                debug!(bytes = frame.len(), "Snapshot frame captured");
                Ok(frame)
            }
            Ok(None) => Err(CaptureError::CaptureFailed(
                "device returned no frame".to_string(),
            )),
            Err(_) => Err(CaptureError::CaptureFailed(format!(
                "no frame within {:?}",
                self.config.open_timeout
            ))),
        }
    }

    async fn next_live_frame(
        &self,
        mut rx: broadcast::Receiver<JpegFrame>,
    ) -> Result<JpegFrame, CaptureError> {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(frame) => return Some(frame),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        match timeout(self.config.open_timeout, wait).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(CaptureError::CaptureFailed(
                "live camera closed".to_string(),
            )),
            Err(_) => Err(CaptureError::CaptureFailed(format!(
                "no live frame within {:?}",
                self.config.open_timeout
            ))),
        }
    }

    /// Start the backend and wait for the first frame
    async fn open(
        &self,
    ) -> Result<(VideoCapture, mpsc::Receiver<JpegFrame>, JpegFrame), CaptureError> {
        debug!(camera = %self.backend.describe(), "Opening camera");
        let (mut capture, mut rx) = self.backend.start()?;

        match timeout(self.config.open_timeout, rx.recv()).await {
            Ok(Some(first)) => Ok((capture, rx, first)),
            Ok(None) => {
                capture.stop();
                Err(CaptureError::DeviceUnavailable(
                    "device closed before producing a frame".to_string(),
                ))
            }
            Err(_) => {
                capture.stop();
                Err(CaptureError::DeviceUnavailable(format!(
                    "no frame within {:?}",
                    self.config.open_timeout
                )))
            }
        }
    }

    /// Subscribe to the live feed, opening the camera if needed
    pub async fn frame_sequence(&self) -> Result<FrameSequence, CaptureError> {
        let mut live = self.live.lock().await;

        if let Some(cam) = live.as_ref() {
            return Ok(into_sequence(cam.feed.subscribe(), &self.gauge));
        }

        let (capture, rx, first) = self.open().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (feed, feed_rx) = broadcast::channel(self.config.feed_capacity);
        let cancel = CancellationToken::new();

        tokio::spawn(pump(
            id,
            first,
            rx,
            feed.clone(),
            cancel.clone(),
            Arc::clone(&self.live),
            Arc::clone(&self.gauge),
            Arc::clone(&self.stats),
        ));

        info!(camera = %self.backend.describe(), "Live camera opened");
        *live = Some(LiveCamera {
            id,
            capture,
            feed,
            cancel,
        });
        self.gauge.open.store(true, Ordering::Release);

        Ok(into_sequence(feed_rx, &self.gauge))
    }

    /// Release the live camera.
    ///
    /// Returns false when nothing was open.
    pub async fn release(&self) -> bool {
        let mut live = self.live.lock().await;
        match live.take() {
            Some(cam) => {
                self.gauge.open.store(false, Ordering::Release);
                cam.shutdown();
                info!("Camera released");
                true
            }
            None => false,
        }
    }
}

/// Forward frames from the capture into the live feed until released
async fn pump(
    id: u64,
    first: JpegFrame,
    mut rx: mpsc::Receiver<JpegFrame>,
    feed: broadcast::Sender<JpegFrame>,
    cancel: CancellationToken,
    live: LiveSlot,
    gauge: Arc<LiveGauge>,
    stats: Arc<RwLock<SourceStats>>,
) {
    let mut next = Some(first);

    loop {
        let frame = match next.take() {
            Some(frame) => frame,
            None => tokio::select! {
                _ = cancel.cancelled() => break,
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        warn!("Camera stopped producing frames");
                        release_if(&live, &gauge, id, |_| true).await;
                        break;
                    }
                },
            },
        };

        stats.write().await.frames_captured += 1;

        if feed.send(frame).is_err()
            && release_if(&live, &gauge, id, |cam| cam.feed.receiver_count() == 0).await
        {
            info!("Last viewer left, camera released");
            break;
        }
    }

    debug!(id, "Live feed pump finished");
}

/// Release the slot if it still holds camera `id` and `check` agrees
async fn release_if(
    live: &LiveSlot,
    gauge: &LiveGauge,
    id: u64,
    check: impl Fn(&LiveCamera) -> bool,
) -> bool {
    let mut slot = live.lock().await;
    let matches = slot.as_ref().is_some_and(|cam| cam.id == id && check(cam));
    if matches {
        gauge.open.store(false, Ordering::Release);
        if let Some(cam) = slot.take() {
            cam.shutdown();
        }
    }
    matches
}

fn into_sequence(rx: broadcast::Receiver<JpegFrame>, gauge: &Arc<LiveGauge>) -> FrameSequence {
    let viewer = ViewerGuard::new(gauge);
    stream::unfold((rx, viewer), |(mut rx, viewer)| async move {
        loop {
            match rx.recv().await {
                Ok(frame) => return Some((frame, (rx, viewer))),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(missed = n, "Viewer lagged, skipping frames");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
