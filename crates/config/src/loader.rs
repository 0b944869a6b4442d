use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::TunegrabConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "tunegrab.toml",
    "tunegrab.yaml",
    "tunegrab.yml",
    "tunegrab.json",
];

/// Environment variables that override `telegram.token`, highest priority first.
const TOKEN_ENV_VARS: &[&str] = &["TUNEGRAB_TELEGRAM_TOKEN", "TOKEN"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<TunegrabConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tunegrab.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tunegrab/tunegrab.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TunegrabConfig::default()` if no config file is found or it fails
/// to parse. Env overrides are applied in both cases.
pub fn discover_and_load() -> TunegrabConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            match load_config(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    TunegrabConfig::default()
                },
            }
        },
        None => {
            debug!("no config file found, using defaults");
            TunegrabConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut TunegrabConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut TunegrabConfig, lookup: impl Fn(&str) -> Option<String>) {
    for var in TOKEN_ENV_VARS {
        if let Some(token) = lookup(var).filter(|t| !t.trim().is_empty()) {
            info!(var, "telegram token taken from environment");
            config.telegram.token = Secret::new(token);
            return;
        }
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir().ok()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/tunegrab/`).
pub fn config_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "tunegrab")
        .map(|d| d.config_dir().to_path_buf())
        .context("could not determine home directory")
}

fn parse_config(raw: &str, path: &Path) -> Result<TunegrabConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
