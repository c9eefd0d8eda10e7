use crate::state::{Input, InputType, Song};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fixed threshold for streamed sources, whose duration is unknown or unbounded.
pub const HTTP_SONG_THRESHOLD: Duration = Duration::from_secs(15);
/// Upper bound for local songs: half the song, but never more than four minutes.
pub const MAX_SONG_THRESHOLD: Duration = Duration::from_secs(4 * 60);

/// Listening time after which `song` counts as played.
pub fn scrobble_threshold(song: &Song) -> Duration {
    if song.is_http() {
        HTTP_SONG_THRESHOLD
    } else {
        MAX_SONG_THRESHOLD.min(song.duration / 2)
    }
}

/// A single armed countdown. The waiter task lives until the token is cancelled
/// or the event is published.
#[derive(Debug)]
struct Countdown {
    token: CancellationToken,
    /// Monotonic instant the countdown was armed (start or resume).
    armed_at: Instant,
}

/// Publishes `ThresholdReached` once a song has been playing long enough.
///
/// Listening time is tracked across pauses: `stop` folds the time since the
/// last `start`/`resume` into the accumulated elapsed time and `resume`
/// arms a countdown for whatever is left of the target.
#[derive(Debug)]
pub struct ThresholdTimer {
    sink: mpsc::Sender<Input>,
    /// Parent of every countdown token; cancelling it kills all waiters.
    shutdown: CancellationToken,
    current_song: Option<Arc<Song>>,
    elapsed: Duration,
    target: Duration,
    countdown: Option<Countdown>,
}

impl ThresholdTimer {
    pub fn new(sink: mpsc::Sender<Input>, shutdown: CancellationToken) -> Self {
        Self {
            sink,
            shutdown,
            current_song: None,
            elapsed: Duration::ZERO,
            target: Duration::ZERO,
            countdown: None,
        }
    }

    /// Re-targets the timer at `song` and arms a fresh countdown.
    pub fn start(&mut self, song: Arc<Song>) {
        self.cancel();
        self.elapsed = Duration::ZERO;
        self.target = scrobble_threshold(&song);
        tracing::debug!(song = %song, threshold = ?self.target, "starting threshold timer");
        self.current_song = Some(song);
        self.arm(self.target);
    }

    /// Cancels the live countdown, if any, and records the listening time so far.
    pub fn stop(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.token.cancel();
            self.elapsed += countdown.armed_at.elapsed();
            tracing::debug!(elapsed = ?self.elapsed, threshold = ?self.target, "threshold timer stopped");
        }
    }

    /// Arms a countdown for the remaining listening time.
    pub fn resume(&mut self) {
        if self.countdown.is_some() || self.current_song.is_none() {
            return;
        }
        let remaining = self.remaining();
        tracing::debug!(?remaining, "resuming threshold timer");
        self.arm(remaining);
    }

    /// Time left before the threshold fires. Zero means due now.
    pub fn remaining(&self) -> Duration {
        let running = self
            .countdown
            .as_ref()
            .map(|c| c.armed_at.elapsed())
            .unwrap_or_default();
        self.target.saturating_sub(self.elapsed + running)
    }

    pub fn target(&self) -> Duration {
        self.target
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.countdown.is_some()
    }

    fn cancel(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.token.cancel();
        }
    }

    fn arm(&mut self, delay: Duration) {
        let Some(song) = self.current_song.clone() else {
            return;
        };
        let token = self.shutdown.child_token();
        let waiter = token.clone();
        let sink = self.sink.clone();
        // The deadline is fixed here, not when the waiter first gets polled.
        let armed_at = Instant::now();
        let deadline = armed_at + delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = waiter.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }
            tracing::debug!(song = %song, "scrobble threshold reached");
            let input = Input::new(InputType::ThresholdReached, song);
            tokio::select! {
                biased;
                _ = waiter.cancelled() => {}
                res = sink.send(input) => {
                    if res.is_err() {
                        tracing::trace!("event bus closed before threshold could be published");
                    }
                }
            }
        });
        self.countdown = Some(Countdown { token, armed_at });
    }
}
