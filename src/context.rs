// context.rs: Wires the listener, the threshold timer and the state machine around one event bus

use crate::event::{consume_events, event_bus};
use crate::mpd::connection::Dialer;
use crate::mpd::events::Listener;
use crate::timer::ThresholdTimer;
use crate::transitions::{Effects, PlaybackMachine, Scrobbler, playback_machine};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns every long-running task of one session.
///
/// The listener and the timer publish onto the bus; a single consumer task
/// drains it into the state machine. Everything hangs off one root
/// cancellation token so `stop` tears it all down at once.
#[derive(Debug)]
pub struct Context {
    shutdown: CancellationToken,
    listener: Listener,
    consumer: Option<JoinHandle<PlaybackMachine>>,
}

impl Context {
    pub fn init<D: Dialer>(dialer: D, scrobbler: Box<dyn Scrobbler>, reconnect_interval: Duration) -> Self {
        tracing::debug!("initializing context");
        let shutdown = CancellationToken::new();
        let (tx, rx) = event_bus();

        let listener = Listener::start(dialer, tx.clone(), reconnect_interval, shutdown.child_token());
        let timer = ThresholdTimer::new(tx, shutdown.child_token());
        let consumer = tokio::spawn(consume_events(
            playback_machine(),
            Effects::new(timer, scrobbler),
            rx,
            shutdown.child_token(),
        ));

        tracing::trace!("initialized context");
        Self { shutdown, listener, consumer: Some(consumer) }
    }

    /// Stops the listener, cancels the timer and closes the bus. Returns the
    /// final state machine the first time it is called.
    pub async fn stop(&mut self) -> Option<PlaybackMachine> {
        self.shutdown.cancel();
        self.listener.stop().await;
        let machine = match self.consumer.take() {
            Some(handle) => match handle.await {
                Ok(machine) => Some(machine),
                Err(e) => {
                    tracing::warn!(error = %e, "event consumer task failed");
                    None
                }
            },
            None => None,
        };
        tracing::debug!("stopped context");
        machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpd::connection::{Fields, MpdError, PlayerClient, Subsystem};
    use crate::mpd::status::{PlayState, PlayerStatus};
    use crate::state::State;
    use crate::transitions::tests::{Call, RecordingScrobbler};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Plays back a fixed list of statuses, one per idle, each after `gap`.
    struct ScriptClient {
        script: VecDeque<(Duration, PlayerStatus)>,
        current: PlayerStatus,
    }

    impl PlayerClient for ScriptClient {
        async fn idle(&mut self, _subsystem: Subsystem) -> Result<bool, MpdError> {
            match self.script.pop_front() {
                Some((gap, status)) => {
                    tokio::time::sleep(gap).await;
                    self.current = status;
                    Ok(true)
                }
                None => std::future::pending().await,
            }
        }

        async fn status(&mut self) -> Result<PlayerStatus, MpdError> {
            Ok(self.current)
        }

        async fn current_song(&mut self) -> Result<Fields, MpdError> {
            Ok([("file", "music/song.flac"), ("Title", "Song"), ("Time", "240")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect())
        }

        async fn close(self) {}
    }

    struct ScriptDialer(Mutex<Option<VecDeque<(Duration, PlayerStatus)>>>);

    impl Dialer for ScriptDialer {
        type Client = ScriptClient;

        async fn dial(&self) -> Result<ScriptClient, MpdError> {
            let script = self.0.lock().unwrap().take().ok_or(MpdError::Closed)?;
            Ok(ScriptClient { script, current: PlayerStatus::default() })
        }

        fn target(&self) -> String {
            "script".into()
        }
    }

    fn status(state: PlayState, elapsed: f64) -> PlayerStatus {
        PlayerStatus { state, elapsed }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_end_to_end() {
        let secs = Duration::from_secs;
        // Start, pause after 60s, resume after a long break, stop well after the threshold.
        let script = VecDeque::from(vec![
            (secs(1), status(PlayState::Playing, 0.0)),
            (secs(60), status(PlayState::Paused, 60.0)),
            (secs(600), status(PlayState::Playing, 60.0)),
            (secs(90), status(PlayState::Stopped, 0.0)),
        ]);
        let scrobbler = RecordingScrobbler::default();
        let mut ctx = Context::init(
            ScriptDialer(Mutex::new(Some(script))),
            Box::new(scrobbler.clone()),
            Duration::from_secs(15),
        );

        tokio::time::sleep(secs(1000)).await;
        let machine = ctx.stop().await.unwrap();
        assert_eq!(machine.current(), State::Stopped);
        assert_eq!(
            scrobbler.calls(),
            vec![Call::NowPlaying("Song".into()), Call::Scrobble("Song".into())]
        );
        assert!(ctx.stop().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_before_threshold_never_scrobbles() {
        let secs = Duration::from_secs;
        let script = VecDeque::from(vec![
            (secs(1), status(PlayState::Playing, 0.0)),
            (secs(100), status(PlayState::Stopped, 0.0)),
        ]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = Context::init(
            ScriptDialer(Mutex::new(Some(script))),
            Box::new(RecordingScrobbler(calls.clone())),
            Duration::from_secs(15),
        );

        tokio::time::sleep(secs(1000)).await;
        let machine = ctx.stop().await.unwrap();
        assert_eq!(machine.current(), State::Stopped);
        assert_eq!(*calls.lock().unwrap(), vec![Call::NowPlaying("Song".into())]);
    }
}
