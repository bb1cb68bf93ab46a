//! Storage module for persisting captured photos
//!
//! Snapshots are written to a local directory, one JPEG file per photo.

pub mod local;

pub use local::{photo_timestamp, PhotoStore, PhotoStoreConfig};
