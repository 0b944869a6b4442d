/// Config schema types (telegram, sessions, choice, download, messages).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TunegrabConfig {
    pub telegram: TelegramConfig,
    pub sessions: SessionsConfig,
    pub choice: ChoiceConfig,
    pub download: DownloadConfig,
    pub messages: Messages,
}

/// Telegram bot credentials and polling behaviour.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-polling timeout passed to `getUpdates` (seconds).
    pub poll_timeout_secs: u32,

    /// Bot API base URL, for a self-hosted Bot API server. Defaults to
    /// `https://api.telegram.org`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 30,
            api_url: None,
        }
    }
}

impl TelegramConfig {
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Session registry sizing and idle eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Sessions idle longer than this are evicted.
    pub idle_timeout_secs: u64,
    /// How often the reaper sweeps the registry.
    pub sweep_interval_secs: u64,
    /// Capacity of each session's button-press queue.
    pub callback_buffer: usize,
    /// Upper bound on concurrently running message handlers. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_handlers: Option<usize>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
            callback_buffer: 5,
            max_concurrent_handlers: None,
        }
    }
}

impl SessionsConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// How long a quality prompt waits for a button press.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceConfig {
    pub wait_secs: u64,
}

impl Default for ChoiceConfig {
    fn default() -> Self {
        Self { wait_secs: 10 }
    }
}

impl ChoiceConfig {
    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

/// Download backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Deadline for a single download + conversion.
    pub timeout_secs: u64,
    /// `yt-dlp` binary name or path.
    pub binary: String,
    /// Scratch directory for converted files.
    pub output_dir: String,
    /// Videos longer than this are refused.
    pub max_duration_secs: u64,
    /// Target audio container passed to `--audio-format`.
    pub audio_format: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            binary: "yt-dlp".into(),
            output_dir: "mp3".into(),
            max_duration_secs: 600,
            audio_format: "mp3".into(),
        }
    }
}

impl DownloadConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// User-facing message catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Messages {
    pub start: String,
    pub cancel: String,
    pub download: String,
    pub timeout: String,
    pub send: String,
    pub no_choice: String,
    pub quality: String,
    pub internal: String,
    pub unknown_command: String,
    pub invalid_link: String,
    pub make_choice: String,
    pub no_format: String,
    /// Sent when an idle session is evicted. Nothing is sent when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_expired: Option<String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            start: "Hello, send the YouTube link you want to download as mp3".into(),
            cancel: "Canceled".into(),
            download: "Downloading video...".into(),
            timeout: "Timeout! Can't download the video. Send the link again".into(),
            send: "Mp3 downloaded, sending to you...".into(),
            no_choice: "Timeout! No choice was made. Send the link again".into(),
            quality: "Available quality for this video:".into(),
            internal: "Something went wrong, try again".into(),
            unknown_command: "Unknown command, please enter /start".into(),
            invalid_link: "Bad link. Please send a YouTube link".into(),
            make_choice: "Please make the previous choice or cancel it and send the link again"
                .into(),
            no_format: "Can't find an audio format for this video".into(),
            session_expired: None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bot_constants() {
        let cfg = TunegrabConfig::default();
        assert_eq!(cfg.sessions.idle_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.sessions.sweep_interval(), Duration::from_secs(60));
        assert_eq!(cfg.sessions.callback_buffer, 5);
        assert_eq!(cfg.choice.wait(), Duration::from_secs(10));
        assert_eq!(cfg.download.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.download.max_duration(), Duration::from_secs(600));
        assert!(!cfg.telegram.has_token());
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramConfig {
            token: Secret::new("123:ABC".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("123:ABC"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn partial_messages_keep_defaults() {
        let toml = r#"
            [messages]
            start = "Hi!"
            session_expired = "Bye"
        "#;
        let cfg: TunegrabConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.messages.start, "Hi!");
        assert_eq!(cfg.messages.session_expired.as_deref(), Some("Bye"));
        assert_eq!(cfg.messages.cancel, Messages::default().cancel);
    }

    #[test]
    fn serialize_roundtrip_keeps_token() {
        let cfg = TunegrabConfig {
            telegram: TelegramConfig {
                token: Secret::new("tok".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TunegrabConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.telegram.token.expose_secret(), "tok");
    }
}
