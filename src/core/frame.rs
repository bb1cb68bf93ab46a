//! Frame type for captured JPEG images

use bytes::Bytes;

/// JPEG start-of-image marker
pub(crate) const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub(crate) const EOI: [u8; 2] = [0xFF, 0xD9];

/// A single encoded camera frame.
///
/// The payload is one complete JPEG image (SOI through EOI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegFrame {
    /// Sequence number since the capture was opened
    pub seq: u64,
    /// Timestamp in microseconds since the capture was opened
    pub timestamp_us: u64,
    /// Encoded JPEG bytes
    pub payload: Bytes,
}

impl JpegFrame {
    /// Create a frame from an encoded JPEG payload
    pub fn new(seq: u64, timestamp_us: u64, payload: Bytes) -> Self {
        Self {
            seq,
            timestamp_us,
            payload,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Check that the payload is framed by SOI/EOI markers
    pub fn is_complete_jpeg(&self) -> bool {
        self.payload.len() >= 4 && self.payload.starts_with(&SOI) && self.payload.ends_with(&EOI)
    }
}
