//! multipart/x-mixed-replace framing for the live feed
//!
//! Each JPEG becomes one part:
//! `--frame\r\nContent-Type: image/jpeg\r\n\r\n<bytes>\r\n`

use std::convert::Infallible;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{Stream, StreamExt};

use crate::capture::FrameSequence;
use crate::core::{JpegFrame, FRAME_CONTENT_TYPE, MULTIPART_BOUNDARY};

/// Encode one frame as a multipart body part
pub fn encode_part(frame: &JpegFrame) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: {}\r\n\r\n",
        MULTIPART_BOUNDARY, FRAME_CONTENT_TYPE
    );
    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(&frame.payload);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Turn a frame sequence into response body chunks
pub fn multipart_stream(
    frames: FrameSequence,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    frames.map(|frame| Ok(encode_part(&frame)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn frame(seq: u64, body: &'static [u8]) -> JpegFrame {
        JpegFrame::new(seq, 0, Bytes::from_static(body))
    }

    #[test]
    fn part_layout() {
        let part = encode_part(&frame(0, b"\xFF\xD8abc\xFF\xD9"));
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8abc\xFF\xD9\r\n"
        );
    }

    #[tokio::test]
    async fn stream_emits_one_part_per_frame() {
        let frames = stream::iter(vec![frame(0, b"a"), frame(1, b"b")]).boxed();
        let parts: Vec<_> = multipart_stream(frames).collect().await;

        assert_eq!(parts.len(), 2);
        for part in parts {
            let part = part.unwrap();
            assert!(part.starts_with(b"--frame\r\n"));
            assert!(part.ends_with(b"\r\n"));
        }
    }
}
