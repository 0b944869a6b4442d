//! Configuration validation.
//!
//! Checks a loaded [`TunegrabConfig`] for values that would make the bot
//! unusable (missing token, zero deadlines) and for risky combinations.

use crate::schema::TunegrabConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "choice.wait_secs"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Validate a loaded config.
#[must_use]
pub fn validate(config: &TunegrabConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !config.telegram.has_token() {
        result.push(
            Severity::Error,
            "telegram.token",
            "bot token is required (set it in the config or TUNEGRAB_TELEGRAM_TOKEN)",
        );
    }

    let zero_checks: [(&'static str, u64); 4] = [
        ("sessions.idle_timeout_secs", config.sessions.idle_timeout_secs),
        ("sessions.sweep_interval_secs", config.sessions.sweep_interval_secs),
        ("choice.wait_secs", config.choice.wait_secs),
        ("download.timeout_secs", config.download.timeout_secs),
    ];
    for (path, value) in zero_checks {
        if value == 0 {
            result.push(Severity::Error, path, "must be greater than zero");
        }
    }

    if config.sessions.callback_buffer == 0 {
        result.push(
            Severity::Error,
            "sessions.callback_buffer",
            "must hold at least one button press",
        );
    }

    if config.sessions.max_concurrent_handlers == Some(0) {
        result.push(
            Severity::Error,
            "sessions.max_concurrent_handlers",
            "must be greater than zero when set",
        );
    }

    if config.choice.wait_secs >= config.sessions.idle_timeout_secs {
        result.push(
            Severity::Warning,
            "choice.wait_secs",
            "choice wait is not shorter than the idle timeout; pending prompts delay eviction",
        );
    }

    if config.download.binary.trim().is_empty() {
        result.push(Severity::Error, "download.binary", "must name a yt-dlp binary");
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn valid_config() -> TunegrabConfig {
        let mut cfg = TunegrabConfig::default();
        cfg.telegram.token = Secret::new("123:ABC".into());
        cfg
    }

    #[test]
    fn defaults_with_token_are_clean() {
        let result = validate(&valid_config());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = validate(&TunegrabConfig::default());
        assert!(result.has_errors());
        assert!(result.diagnostics.iter().any(|d| d.path == "telegram.token"));
    }

    #[test]
    fn zero_durations_and_buffer_are_errors() {
        let mut cfg = valid_config();
        cfg.choice.wait_secs = 0;
        cfg.download.timeout_secs = 0;
        cfg.sessions.callback_buffer = 0;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 3);
    }

    #[test]
    fn long_choice_wait_is_a_warning() {
        let mut cfg = valid_config();
        cfg.choice.wait_secs = 600;
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
        assert!(result.diagnostics[0].to_string().starts_with("warning [choice.wait_secs]"));
    }
}
