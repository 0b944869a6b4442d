//! Configuration loading, validation, and env substitution.
//!
//! Config files: `tunegrab.toml`, `tunegrab.yaml`, or `tunegrab.json`
//! Searched in `./` then `~/.config/tunegrab/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values; the bot token can
//! also come from `TUNEGRAB_TELEGRAM_TOKEN` (or `TOKEN`).

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        ChoiceConfig, DownloadConfig, Messages, SessionsConfig, TelegramConfig, TunegrabConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
