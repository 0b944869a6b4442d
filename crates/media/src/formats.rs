//! Audio formats offered to the user, keyed by YouTube itag.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub itag: u32,
    pub label: &'static str,
}

/// Known audio-only streams, lowest bitrate first.
pub const AUDIO_FORMATS: [AudioFormat; 4] = [
    AudioFormat {
        itag: 139,
        label: "MP3 48kbps",
    },
    AudioFormat {
        itag: 140,
        label: "MP3 128kbps (Standard)",
    },
    AudioFormat {
        itag: 171,
        label: "MP3 192kbps",
    },
    AudioFormat {
        itag: 141,
        label: "MP3 256kbps",
    },
];

#[must_use]
pub fn lookup(itag: u32) -> Option<&'static AudioFormat> {
    AUDIO_FORMATS.iter().find(|f| f.itag == itag)
}

/// The known formats among `itags`, in catalog order. Unknown itags are
/// ignored.
#[must_use]
pub fn available(itags: &[u32]) -> Vec<&'static AudioFormat> {
    AUDIO_FORMATS
        .iter()
        .filter(|f| itags.contains(&f.itag))
        .collect()
}

/// Parse a button value back into a known itag.
pub fn parse_itag(value: &str) -> Result<u32> {
    let itag: u32 = value
        .parse()
        .map_err(|_| Error::invalid_input(format!("not an itag: {value}")))?;
    match lookup(itag) {
        Some(format) => Ok(format.itag),
        None => Err(Error::FormatUnavailable { itag }),
    }
}
