//! MJPEG byte stream parsing
//!
//! Splits a raw MJPEG byte stream (concatenated JPEG images, as emitted by
//! `ffmpeg -f mjpeg -`) into individual images by scanning for the
//! start-of-image (`FF D8`) and end-of-image (`FF D9`) markers.

use bytes::{Bytes, BytesMut};

use crate::core::{EOI, MAX_JPEG_FRAME_SIZE, SOI};

/// Incremental parser for MJPEG byte streams
///
/// Data can be fed in arbitrary chunks; images split across reads are
/// reassembled. Bytes before the first SOI marker are discarded.
pub struct JpegParser {
    buffer: BytesMut,
    /// Offset from which to resume the EOI search
    scan_from: usize,
}

impl JpegParser {
    /// Create a new JPEG parser
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            scan_from: 0,
        }
    }

    /// Feed data into the parser and extract complete JPEG images
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);
        let images = self.extract_images();
        if self.buffer.len() > MAX_JPEG_FRAME_SIZE {
            tracing::warn!(
                "JPEG parser buffer exceeded {} bytes, resetting",
                MAX_JPEG_FRAME_SIZE
            );
            self.buffer.clear();
            self.scan_from = 0;
        }
        images
    }

    /// Number of buffered bytes not yet emitted as an image
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extract all complete images from the buffer
    fn extract_images(&mut self) -> Vec<Bytes> {
        let mut images = Vec::new();

        loop {
            let start = match find_marker(&self.buffer, SOI, 0) {
                Some(pos) => pos,
                None => {
                    // Keep a trailing 0xFF in case it starts a split SOI
                    let keep = usize::from(self.buffer.last() == Some(&0xFF));
                    let drop = self.buffer.len() - keep;
                    let _ = self.buffer.split_to(drop);
                    self.scan_from = 0;
                    break;
                }
            };

            if start > 0 {
                let _ = self.buffer.split_to(start);
                self.scan_from = 0;
            }

            let search_from = self.scan_from.max(SOI.len());
            match find_marker(&self.buffer, EOI, search_from) {
                Some(end) => {
                    let image = self.buffer.split_to(end + EOI.len()).freeze();
                    self.scan_from = 0;
                    images.push(image);
                }
                None => {
                    // Resume just before the end so a split marker is found next time
                    self.scan_from = self.buffer.len().saturating_sub(1);
                    break;
                }
            }
        }

        images
    }
}

impl Default for JpegParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buf: &[u8], marker: [u8; 2], offset: usize) -> Option<usize> {
    if buf.len() < offset + 2 {
        return None;
    }
    buf[offset..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + offset)
}
