use std::time::Duration;

use {async_trait::async_trait, tokio_util::sync::CancellationToken};

use crate::{
    error::{Error, Result},
    link::VideoLink,
};

/// What a probe learns about a video before anything is downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration: Duration,
    /// Every stream itag the video offers, audio or not.
    pub itags: Vec<u32>,
}

impl VideoInfo {
    /// Reject videos longer than `limit`.
    pub fn ensure_duration_within(&self, limit: Duration) -> Result<()> {
        if self.duration > limit {
            return Err(Error::TooLong {
                duration: self.duration,
                limit,
            });
        }
        Ok(())
    }
}

/// A converted audio file, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Where audio comes from.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Look up the video's metadata. Stops early when `cancel` fires.
    async fn probe(&self, link: &VideoLink, cancel: CancellationToken)
    -> anyhow::Result<VideoInfo>;

    /// Download stream `itag` and convert it to audio. Stops early when
    /// `cancel` fires.
    async fn fetch(
        &self,
        link: &VideoLink,
        itag: u32,
        cancel: CancellationToken,
    ) -> anyhow::Result<AudioFile>;
}

/// Replace characters that are not allowed in file names with spaces.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let sanitized: String = name
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { ' ' } else { c })
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "audio".to_string()
    } else {
        trimmed.to_string()
    }
}
