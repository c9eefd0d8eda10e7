//! Reconnecting listener that turns MPD player changes into state machine inputs.

use crate::mpd::connection::{Dialer, MpdError, PlayerClient, Subsystem};
use crate::mpd::song::{input_type_for, song_from_fields};
use crate::state::Input;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default pause between failed connection attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle to the background listen loop.
///
/// The loop owns the player connection for its whole life: it dials until a
/// session is up, idles on the player subsystem, publishes one input per change
/// and drops back to dialing on any error.
#[derive(Debug)]
pub struct Listener {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    /// Spawns the listen loop. Cancelling `shutdown` has the same effect as [`Listener::stop`].
    pub fn start<D: Dialer>(
        dialer: D,
        sink: mpsc::Sender<Input>,
        reconnect_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let listen = ListenLoop { dialer, sink, reconnect_interval, shutdown: shutdown.clone() };
        let handle = tokio::spawn(listen.run());
        Self { shutdown, handle: Some(handle) }
    }

    /// Stops the loop, waking it from any idle, dial or reconnect sleep, and
    /// waits until the connection is released. Safe to call more than once.
    pub async fn stop(&mut self) {
        tracing::debug!("stopping MPD listener");
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "MPD listener task failed");
        }
        tracing::trace!("MPD listener stopped");
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

struct ListenLoop<D: Dialer> {
    dialer: D,
    sink: mpsc::Sender<Input>,
    reconnect_interval: Duration,
    shutdown: CancellationToken,
}

impl<D: Dialer> ListenLoop<D> {
    async fn run(self) {
        let mut client: Option<D::Client> = None;
        while !self.shutdown.is_cancelled() {
            let Some(conn) = client.as_mut() else {
                client = self.connect().await;
                continue;
            };

            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = listen_for_event(conn) => event,
            };
            match event {
                Ok(Some(input)) => {
                    if !self.publish(input).await {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "lost connection to MPD");
                    if let Some(conn) = client.take() {
                        conn.close().await;
                    }
                }
            }
        }
        if let Some(conn) = client.take() {
            conn.close().await;
        }
    }

    /// Dials until a session is up. `None` once shutdown is requested.
    async fn connect(&self) -> Option<D::Client> {
        loop {
            tracing::debug!(address = %self.dialer.target(), "connecting to MPD");
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                attempt = self.dialer.dial() => attempt,
            };
            match attempt {
                Ok(client) => {
                    tracing::info!(address = %self.dialer.target(), "established connection to MPD");
                    return Some(client);
                }
                Err(e) => {
                    tracing::debug!(error = %e, retry_in = ?self.reconnect_interval, "error connecting to MPD");
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(self.reconnect_interval) => {}
                    }
                }
            }
        }
    }

    /// Blocks on the bus when it is full. Returns false when the loop should end.
    async fn publish(&self, input: Input) -> bool {
        tracing::debug!(kind = ?input.kind, song = %input.payload, "player event");
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            sent = self.sink.send(input) => {
                if sent.is_err() {
                    tracing::debug!("event bus closed, listener exiting");
                }
                sent.is_ok()
            }
        }
    }
}

/// Waits for one player change and reads it back as an input.
async fn listen_for_event<C: PlayerClient>(client: &mut C) -> Result<Option<Input>, MpdError> {
    if !client.idle(Subsystem::Player).await? {
        return Ok(None);
    }
    let status = client.status().await?;
    let fields = client.current_song().await?;
    let song = song_from_fields(&fields);
    let kind = input_type_for(&status, &song);
    Ok(Some(Input::new(kind, Arc::new(song))))
}
