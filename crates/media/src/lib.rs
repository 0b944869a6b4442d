//! Media backend: link recognition, the audio format catalog, and
//! downloading audio through `yt-dlp`.

pub mod error;
pub mod formats;
pub mod link;
pub mod source;
pub mod ytdlp;

pub use {
    error::{Error, Result},
    formats::{AUDIO_FORMATS, AudioFormat},
    link::VideoLink,
    source::{AudioFile, AudioSource, VideoInfo, sanitize_file_name},
    ytdlp::YtDlp,
};
