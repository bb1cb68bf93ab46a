//! Local filesystem photo store
//!
//! Stores captured snapshots as JPEG files named after their capture time:
//! `{root}/{prefix}_{YYYY-MM-DD_HH-MM-SS}.jpg`. Files are never modified or
//! removed once written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::{PHOTO_EXTENSION, PHOTO_TIMESTAMP_FORMAT};
use crate::error::CaptureError;

/// Attempts at finding a free file name within the same second
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Configuration for the photo store
#[derive(Debug, Clone)]
pub struct PhotoStoreConfig {
    /// Directory photos are written to (created on first save)
    pub root_path: PathBuf,
    /// File name prefix
    pub prefix: String,
}

impl Default for PhotoStoreConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("photos"),
            prefix: "photo".to_string(),
        }
    }
}

/// Writes snapshots to the photo directory
#[derive(Debug, Clone)]
pub struct PhotoStore {
    config: PhotoStoreConfig,
}

impl PhotoStore {
    pub fn new(config: PhotoStoreConfig) -> Self {
        Self { config }
    }

    /// Photo directory
    pub fn root(&self) -> &Path {
        &self.config.root_path
    }

    /// File name for a photo taken at `taken_at`, with an optional collision suffix
    pub fn file_name<Tz: TimeZone>(&self, taken_at: &DateTime<Tz>, attempt: u32) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let stamp = taken_at.format(PHOTO_TIMESTAMP_FORMAT);
        if attempt == 0 {
            format!("{}_{}.{}", self.config.prefix, stamp, PHOTO_EXTENSION)
        } else {
            format!(
                "{}_{}_{}.{}",
                self.config.prefix, stamp, attempt, PHOTO_EXTENSION
            )
        }
    }

    /// Save a JPEG image, returning the path it was written to
    pub async fn save(&self, jpeg: &[u8]) -> Result<PathBuf, CaptureError> {
        self.save_at(jpeg, &Local::now()).await
    }

    /// Save a JPEG image as taken at `taken_at`
    ///
    /// Never overwrites: a second photo in the same second gets a `_N` suffix.
    pub async fn save_at(
        &self,
        jpeg: &[u8],
        taken_at: &DateTime<Local>,
    ) -> Result<PathBuf, CaptureError> {
        let root = &self.config.root_path;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| CaptureError::Io {
                path: root.clone(),
                source,
            })?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = root.join(self.file_name(taken_at, attempt));
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            let mut file = match file {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Photo {:?} exists, trying next name", path);
                    continue;
                }
                Err(source) => return Err(CaptureError::Io { path, source }),
            };

            let written = async {
                file.write_all(jpeg).await?;
                file.flush().await
            }
            .await;

            if let Err(source) = written {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(CaptureError::Io { path, source });
            }

            info!(path = %path.display(), bytes = jpeg.len(), "Photo saved");
            return Ok(path);
        }

        Err(CaptureError::Io {
            path: root.clone(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no free photo file name for this second",
            ),
        })
    }
}

/// Recover the capture time encoded in a photo file name
pub fn photo_timestamp(path: &Path, prefix: &str) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    // "YYYY-MM-DD_HH-MM-SS" is 19 characters; anything after is a collision suffix
    let stamp = rest.get(..19)?;
    NaiveDateTime::parse_from_str(stamp, PHOTO_TIMESTAMP_FORMAT).ok()
}
