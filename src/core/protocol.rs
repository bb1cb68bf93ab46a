//! Protocol constants for CatVision

/// Default port for the local stream server
pub const DEFAULT_WEB_PORT: u16 = 5000;

/// Multipart boundary used by the `/video` feed
pub const MULTIPART_BOUNDARY: &str = "frame";

/// Content type of the `/video` response
pub const VIDEO_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Content type of each part of the `/video` feed
pub const FRAME_CONTENT_TYPE: &str = "image/jpeg";

/// Phrase localtunnel prints right before the public URL
pub const TUNNEL_URL_MARKER: &str = "your url is:";

/// Placeholder substituted with the stream port in the tunnel command line
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Timestamp format used in photo file names (second resolution)
pub const PHOTO_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// File extension for captured photos
pub const PHOTO_EXTENSION: &str = "jpg";

/// Maximum size of a single JPEG frame (8 MB, generous for 4K MJPEG)
pub const MAX_JPEG_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Broadcast capacity for the live frame feed (~2s at 15fps)
pub const LIVE_FEED_CAPACITY: usize = 32;
