//! Recognizing video links in free-form text.

use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::error::{Error, Result};

const LINK_PATTERN: &str = r"^(https?://)?(www\.youtube\.com|youtu\.?be)/.+$";

static LINK: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(LINK_PATTERN));

/// A message text that looks like a YouTube video link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLink(String);

impl VideoLink {
    /// Accept `text` if it matches the link pattern, ignoring surrounding
    /// whitespace.
    pub fn parse(text: &str) -> Result<Self> {
        let re = LINK
            .as_ref()
            .map_err(|e| Error::external("compile link pattern", e.clone()))?;
        let text = text.trim();
        if re.is_match(text) {
            Ok(Self(text.to_string()))
        } else {
            Err(Error::invalid_input(format!("not a video link: {text}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
