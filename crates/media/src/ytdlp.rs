//! [`AudioSource`] backed by the `yt-dlp` command-line tool.

use std::{path::PathBuf, process::Stdio, time::Duration};

use {
    async_trait::async_trait,
    serde::Deserialize,
    tokio::process::Command,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use crate::{
    error::{Context, Error, Result},
    link::VideoLink,
    source::{AudioFile, AudioSource, VideoInfo, sanitize_file_name},
};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    id: String,
    title: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<FormatEntry>,
}

#[derive(Debug, Deserialize)]
struct FormatEntry {
    format_id: String,
}

impl From<ProbeOutput> for VideoInfo {
    fn from(out: ProbeOutput) -> Self {
        Self {
            id: out.id,
            title: out.title,
            duration: out
                .duration
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or_default(),
            itags: out
                .formats
                .iter()
                .filter_map(|f| f.format_id.parse().ok())
                .collect(),
        }
    }
}

/// Runs `yt-dlp` as a child process per request.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    output_dir: PathBuf,
    audio_format: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            output_dir: output_dir.into(),
            audio_format: "mp3".to_string(),
        }
    }

    #[must_use]
    pub fn with_audio_format(mut self, audio_format: impl Into<String>) -> Self {
        self.audio_format = audio_format.into();
        self
    }

    /// Run the binary to completion and return its stdout. The child is
    /// killed if `cancel` fires first.
    async fn run(&self, args: &[&str], cancel: &CancellationToken) -> Result<Vec<u8>> {
        let binary = self.binary.display().to_string();
        debug!(%binary, ?args, "spawning downloader");
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::external(format!("failed to start {binary}"), e))?;

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(%binary, "download canceled, killing downloader");
                return Err(Error::Canceled);
            },
            output = child.wait_with_output() => {
                output.map_err(|e| Error::external(format!("failed to wait for {binary}"), e))?
            },
        };

        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();
        Err(Error::Process {
            binary,
            status: output.status.to_string(),
            stderr,
        })
    }

    async fn probe_info(&self, link: &VideoLink, cancel: &CancellationToken) -> Result<VideoInfo> {
        let stdout = self
            .run(&["-J", "--no-playlist", "--no-warnings", link.as_str()], cancel)
            .await?;
        let parsed: ProbeOutput = serde_json::from_slice(&stdout)
            .map_err(|e| Error::external("failed to parse video metadata", e))?;
        let info = VideoInfo::from(parsed);
        debug!(id = %info.id, itags = ?info.itags, "video probed");
        Ok(info)
    }

    /// Download and convert into a uniquely named file, read it back, and
    /// remove everything the run left under that name, whatever the outcome.
    async fn fetch_audio(
        &self,
        link: &VideoLink,
        itag: u32,
        cancel: &CancellationToken,
    ) -> Result<AudioFile> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Error::external("failed to create output directory", e))?;

        let stem = Uuid::new_v4().to_string();
        let result = self.convert(link, itag, &stem, cancel).await;
        self.remove_outputs(&stem).await;
        result
    }

    async fn convert(
        &self,
        link: &VideoLink,
        itag: u32,
        stem: &str,
        cancel: &CancellationToken,
    ) -> Result<AudioFile> {
        let template = self.output_dir.join(format!("{stem}.%(ext)s"));
        let template = template.to_string_lossy();
        let format = itag.to_string();

        let result = self
            .run(
                &[
                    "--no-playlist",
                    "--no-warnings",
                    "--no-simulate",
                    "--print",
                    "title",
                    "-f",
                    format.as_str(),
                    "-x",
                    "--audio-format",
                    self.audio_format.as_str(),
                    "-o",
                    &*template,
                    link.as_str(),
                ],
                cancel,
            )
            .await;
        let stdout = match result {
            Ok(stdout) => stdout,
            Err(Error::Process { stderr, .. }) if stderr.contains("Requested format is not available") => {
                return Err(Error::FormatUnavailable { itag });
            },
            Err(e) => return Err(e),
        };

        let path = self.output_dir.join(format!("{stem}.{}", self.audio_format));
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read converted file {}", path.display()))?;

        let stdout = String::from_utf8_lossy(&stdout);
        let title = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        let file_name = format!("{}.{}", sanitize_file_name(title), self.audio_format);
        info!(%file_name, size = bytes.len(), "audio downloaded");
        Ok(AudioFile { file_name, bytes })
    }

    /// Delete `<stem>.*` from the output directory: the converted file and
    /// any partial downloads of a killed or failed run.
    async fn remove_outputs(&self, stem: &str) {
        let prefix = format!("{stem}.");
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.output_dir.display(), error = %e, "failed to list output directory");
                return;
            },
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.output_dir.display(), error = %e, "failed to list output directory");
                    break;
                },
            };
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove download output");
            }
        }
    }
}

#[async_trait]
impl AudioSource for YtDlp {
    async fn probe(
        &self,
        link: &VideoLink,
        cancel: CancellationToken,
    ) -> anyhow::Result<VideoInfo> {
        Ok(self.probe_info(link, &cancel).await?)
    }

    async fn fetch(
        &self,
        link: &VideoLink,
        itag: u32,
        cancel: CancellationToken,
    ) -> anyhow::Result<AudioFile> {
        Ok(self.fetch_audio(link, itag, &cancel).await?)
    }
}
