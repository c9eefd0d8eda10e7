// state.rs: Playback data model shared by the listener, the timer and the state machine

use crate::machine::Ordinal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// High-level playback state tracked by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Playing,
    Paused,
    Stopped,
    Scrobbled,
}

impl State {
    pub const ALL: [State; 4] = [State::Playing, State::Paused, State::Stopped, State::Scrobbled];
}

impl Ordinal for State {
    const COUNT: usize = Self::ALL.len();

    fn ordinal(self) -> usize {
        self as usize
    }
}

/// Kind of input fed to the state machine. Produced by the listener or the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    PlayFromStart,
    Play,
    Pause,
    Stop,
    ThresholdReached,
}

impl InputType {
    pub const ALL: [InputType; 5] = [
        InputType::PlayFromStart,
        InputType::Play,
        InputType::Pause,
        InputType::Stop,
        InputType::ThresholdReached,
    ];
}

impl Ordinal for InputType {
    const COUNT: usize = Self::ALL.len();

    fn ordinal(self) -> usize {
        self as usize
    }
}

/// Input as it travels over the event bus. The song is shared, never mutated.
pub type Input = crate::machine::Input<InputType, Arc<Song>>;

/// Track metadata captured from a single status read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Locator as reported by the player (relative path or stream URL).
    pub file: String,
    /// Known play length. Always zero for streamed sources.
    pub duration: Duration,
}

impl Song {
    /// True when the song comes from a network stream rather than a local file.
    pub fn is_http(&self) -> bool {
        self.file.starts_with("http")
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (_, true) => write!(f, "{}", self.file),
            (true, false) => write!(f, "{}", self.title),
            (false, false) => write!(f, "{} - {}", self.artist, self.title),
        }
    }
}
