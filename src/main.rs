mod config;
mod context;
mod event;
mod machine;
mod mpd;
mod state;
mod timer;
mod transitions;

use crate::config::Settings;
use crate::context::Context;
use crate::mpd::MpdDialer;
use crate::transitions::LogScrobbler;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Application configuration from CLI
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about)]
pub struct Config {
    /// MPD address as host:port. Falls back to MPD_HOST / MPD_PORT, then localhost:6600.
    #[arg(long, value_name = "HOST:PORT")]
    pub address: Option<String>,
    /// MPD password. Falls back to MPD_PASSWORD or a password@host MPD_HOST.
    #[arg(long)]
    pub password: Option<String>,
    /// last.fm user name
    #[arg(long)]
    pub lastfm_user: Option<String>,
    /// MD5 hash of the last.fm password
    #[arg(long)]
    pub lastfm_password_hash: Option<String>,
    /// Seconds between MPD reconnect attempts (default 15)
    #[arg(long, value_name = "SECS")]
    pub reconnect_secs: Option<u64>,
    /// JSON config file. Reloaded on SIGHUP.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Enable debug logging to stderr (RUST_LOG overrides)
    #[arg(long)]
    pub debug_log: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Shutdown,
    Reload,
}

fn init_tracing(debug: bool) {
    let default = if debug { "mpdscrobble=debug" } else { "mpdscrobble=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn start(settings: &Settings) -> Context {
    tracing::info!(
        address = %settings.mpd_address,
        user = settings.lastfm_user.as_deref().unwrap_or("-"),
        has_credentials = settings.lastfm_password_hash.is_some(),
        "starting scrobbler"
    );
    let dialer = MpdDialer::new(settings.mpd_address.clone(), settings.mpd_password.clone());
    let scrobbler = LogScrobbler { user: settings.lastfm_user.clone() };
    Context::init(dialer, Box::new(scrobbler), settings.reconnect_interval)
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<Signal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;
    let sig = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            Signal::Shutdown
        }
        _ = term.recv() => Signal::Shutdown,
        _ = hup.recv() => Signal::Reload,
    };
    Ok(sig)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<Signal> {
    tokio::signal::ctrl_c().await?;
    Ok(Signal::Shutdown)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Config::parse();
    init_tracing(cli.debug_log);

    let mut settings = config::load_settings(&cli).await?;
    loop {
        let mut ctx = start(&settings);
        let signal = wait_for_signal().await;
        ctx.stop().await;

        match signal? {
            Signal::Shutdown => {
                tracing::info!("shutting down");
                return Ok(());
            }
            Signal::Reload => match config::load_settings(&cli).await {
                Ok(reloaded) => {
                    tracing::info!("configuration reloaded");
                    settings = reloaded;
                }
                Err(e) => tracing::warn!(error = %e, "reload failed, keeping previous configuration"),
            },
        }
    }
}
