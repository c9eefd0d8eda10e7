//! Minimal playback status as reported by the MPD `status` command.

use crate::mpd::connection::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerStatus {
    pub state: PlayState,
    /// Seconds into the current song.
    pub elapsed: f64,
}

impl PlayerStatus {
    /// Builds a status from the raw response. Unknown or missing values fall
    /// back to stopped / zero rather than failing.
    pub fn from_fields(fields: &Fields) -> Self {
        let state = match fields.get("state").map(String::as_str) {
            Some("play") => PlayState::Playing,
            Some("pause") => PlayState::Paused,
            _ => PlayState::Stopped,
        };
        Self { state, elapsed: parse_elapsed(fields) }
    }
}

fn parse_elapsed(fields: &Fields) -> f64 {
    // Older servers only send `time: <elapsed>:<total>`.
    let raw = fields
        .get("elapsed")
        .map(String::as_str)
        .or_else(|| fields.get("time").and_then(|t| t.split(':').next()));
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|e| e.is_finite() && *e >= 0.0)
        .unwrap_or(0.0)
}
