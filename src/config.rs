//! Configuration sources merged into the settings a session runs with.
//!
//! Precedence, highest first: command line, JSON config file, MPD environment
//! variables (`MPD_HOST`, `MPD_PORT`, `MPD_PASSWORD`), built-in defaults.

use crate::Config;
use crate::mpd::events::RECONNECT_INTERVAL;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MPD_HOST: &str = "localhost";
pub const DEFAULT_MPD_PORT: u16 = 6600;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Optional JSON config file. Every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub mpd_address: Option<String>,
    pub mpd_password: Option<String>,
    pub lastfm_user: Option<String>,
    pub lastfm_password_hash: Option<String>,
    pub reconnect_secs: Option<u64>,
}

impl FileConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Resolved configuration for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mpd_address: String,
    pub mpd_password: Option<String>,
    pub lastfm_user: Option<String>,
    pub lastfm_password_hash: Option<String>,
    pub reconnect_interval: Duration,
}

/// Reads the config file named on the command line (if any) and resolves the settings.
pub async fn load_settings(cli: &Config) -> Result<Settings, ConfigError> {
    let file = match cli.config.as_deref() {
        Some(path) => FileConfig::load(path).await?,
        None => FileConfig::default(),
    };
    Ok(resolve(cli, &file, |key| std::env::var(key).ok()))
}

/// Merges the sources. `env` looks up an environment variable.
pub fn resolve(cli: &Config, file: &FileConfig, env: impl Fn(&str) -> Option<String>) -> Settings {
    let (env_address, env_password) = mpd_from_env(&env);
    let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());

    Settings {
        mpd_address: non_empty(&cli.address)
            .or_else(|| non_empty(&file.mpd_address))
            .or(env_address)
            .unwrap_or_else(|| format!("{DEFAULT_MPD_HOST}:{DEFAULT_MPD_PORT}")),
        mpd_password: non_empty(&cli.password)
            .or_else(|| non_empty(&file.mpd_password))
            .or(env_password),
        lastfm_user: non_empty(&cli.lastfm_user).or_else(|| non_empty(&file.lastfm_user)),
        lastfm_password_hash: non_empty(&cli.lastfm_password_hash)
            .or_else(|| non_empty(&file.lastfm_password_hash)),
        reconnect_interval: Duration::from_secs(
            cli.reconnect_secs
                .or(file.reconnect_secs)
                .unwrap_or(RECONNECT_INTERVAL.as_secs())
                .max(1),
        ),
    }
}

/// Address and password from the standard MPD variables. `MPD_HOST` may
/// carry a password as `password@host`.
fn mpd_from_env(env: &impl Fn(&str) -> Option<String>) -> (Option<String>, Option<String>) {
    let host = env("MPD_HOST").filter(|h| !h.is_empty());
    let port = env("MPD_PORT").and_then(|p| p.trim().parse::<u16>().ok());
    let mut password = env("MPD_PASSWORD").filter(|p| !p.is_empty());

    // A leading '@' is an abstract socket, not an empty password.
    let host = host.and_then(|h| {
        let host = match h.split_once('@') {
            Some((pw, host)) if !pw.is_empty() => {
                password = Some(pw.to_string());
                host.to_string()
            }
            _ => h,
        };
        tcp_host(&host)
    });

    let address = match (host, port) {
        (None, None) => None,
        (host, port) => {
            let host = host.unwrap_or_else(|| DEFAULT_MPD_HOST.to_string());
            let port = port.unwrap_or(DEFAULT_MPD_PORT);
            Some(format!("{host}:{port}"))
        }
    };
    (address, password)
}

/// Host part usable in a TCP address. Local socket forms are dropped with a
/// warning; bare IPv6 literals get brackets.
fn tcp_host(host: &str) -> Option<String> {
    if host.starts_with(['/', '~', '@']) {
        tracing::warn!(host, "MPD_HOST names a local socket, only TCP is supported; ignoring it");
        return None;
    }
    if host.contains(':') && !host.starts_with('[') {
        return Some(format!("[{host}]"));
    }
    Some(host.to_string())
}
