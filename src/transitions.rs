//! Playback transition table and the side effects it drives.

use crate::machine::{SideEffect, StateMachine, Transition};
use crate::state::{Input, InputType, Song, State};
use crate::timer::ThresholdTimer;
use std::sync::Arc;

/// The playback state machine: inputs carry the song they concern.
pub type PlaybackMachine = StateMachine<State, InputType, Arc<Song>, Effects>;

/// Hook for the scrobbling service.
pub trait Scrobbler: Send {
    fn now_playing(&mut self, song: &Song);
    fn scrobble(&mut self, song: &Song);
}

/// Scrobbler that only logs. Stands in until a service client is wired up.
#[derive(Debug, Default, Clone)]
pub struct LogScrobbler {
    pub user: Option<String>,
}

impl Scrobbler for LogScrobbler {
    fn now_playing(&mut self, song: &Song) {
        tracing::info!(user = self.user.as_deref().unwrap_or("-"), song = %song, "now playing");
    }

    fn scrobble(&mut self, song: &Song) {
        tracing::info!(user = self.user.as_deref().unwrap_or("-"), song = %song, "scrobble");
    }
}

/// Everything a side effect is allowed to touch.
pub struct Effects {
    pub timer: ThresholdTimer,
    pub scrobbler: Box<dyn Scrobbler>,
}

impl Effects {
    pub fn new(timer: ThresholdTimer, scrobbler: Box<dyn Scrobbler>) -> Self {
        Self { timer, scrobbler }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    NowPlaying,
    StartTimer,
    PauseTimer,
    StopTimer,
    ResumeTimer,
    Scrobble,
}

impl Action {
    fn run(self, fx: &mut Effects, song: Arc<Song>, state: State) {
        match self {
            Action::NowPlaying => {
                tracing::debug!(?state, song = %song, "sending now playing");
                fx.scrobbler.now_playing(&song);
            }
            Action::StartTimer => {
                fx.timer.start(song);
                tracing::debug!(?state, threshold = ?fx.timer.target(), "started scrobble timer for new song");
            }
            Action::PauseTimer => {
                tracing::debug!(?state, song = %song, "pausing scrobble timer");
                fx.timer.stop();
            }
            Action::StopTimer => {
                tracing::debug!(?state, song = %song, "stopping scrobble timer");
                fx.timer.stop();
            }
            Action::ResumeTimer => {
                tracing::debug!(?state, song = %song, "resuming scrobble timer");
                fx.timer.resume();
            }
            Action::Scrobble => {
                tracing::debug!(?state, song = %song, "scrobbling");
                fx.scrobbler.scrobble(&song);
            }
        }
    }
}

/// Transition to `next` running `actions` against the input's song.
fn to(next: State, actions: &'static [Action]) -> Transition<State, InputType, Arc<Song>, Effects> {
    Box::new(move |input: &Input| {
        let effects = actions
            .iter()
            .map(|&action| {
                let song = input.payload.clone();
                let effect: SideEffect<State, Effects> =
                    Box::new(move |fx: &mut Effects, state| action.run(fx, song, state));
                effect
            })
            .collect();
        (next, effects)
    })
}

const START: &[Action] = &[Action::NowPlaying, Action::StartTimer];

/// Builds the machine in `Stopped` with the full playback table.
pub fn playback_machine() -> PlaybackMachine {
    let mut sm = StateMachine::new(State::Stopped);

    sm.add_transition(State::Playing, InputType::PlayFromStart, to(State::Playing, START));
    sm.add_transition(State::Playing, InputType::Pause, to(State::Paused, &[Action::PauseTimer]));
    sm.add_transition(State::Playing, InputType::Stop, to(State::Stopped, &[Action::StopTimer]));
    sm.add_transition(State::Playing, InputType::ThresholdReached, to(State::Scrobbled, &[Action::Scrobble]));

    sm.add_transition(State::Paused, InputType::Play, to(State::Playing, &[Action::ResumeTimer]));
    sm.add_transition(State::Paused, InputType::PlayFromStart, to(State::Playing, START));
    sm.add_transition(State::Paused, InputType::Stop, to(State::Stopped, &[Action::StopTimer]));

    sm.add_transition(State::Stopped, InputType::PlayFromStart, to(State::Playing, START));

    sm.add_transition(State::Scrobbled, InputType::PlayFromStart, to(State::Playing, START));
    sm.add_transition(State::Scrobbled, InputType::Stop, to(State::Stopped, &[]));

    sm
}
