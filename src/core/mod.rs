//! Core types and protocol definitions for CatVision
//!
//! This module contains foundational types used throughout the system:
//! - JPEG frame type shared by capture, storage and web
//! - Protocol constants (ports, multipart boundary, tunnel marker)

mod frame;
mod protocol;

pub(crate) use frame::{EOI, SOI};
pub use frame::JpegFrame;
pub use protocol::*;
