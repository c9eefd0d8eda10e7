//! Translation of raw MPD responses into the playback data model.

use crate::mpd::connection::Fields;
use crate::mpd::status::{PlayState, PlayerStatus};
use crate::state::{InputType, Song};
use std::time::Duration;

/// Builds a `Song` from `currentsong` fields. Missing keys read as empty.
///
/// The duration is only taken for local files; a stream's `Time` is not a
/// play length. Unparsable durations read as zero.
pub fn song_from_fields(fields: &Fields) -> Song {
    let field = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let file = field("file");
    let mut song = Song {
        title: field("Title"),
        artist: field("Artist"),
        album: field("Album"),
        file,
        duration: Duration::ZERO,
    };
    if !song.is_http() {
        song.duration = parse_duration(fields);
    }
    song
}

fn parse_duration(fields: &Fields) -> Duration {
    if let Some(time) = fields.get("Time") {
        return time
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .unwrap_or_default();
    }
    // Newer servers also send a fractional `duration`.
    fields
        .get("duration")
        .and_then(|d| d.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or_default()
}

/// Maps a status read onto the input fed to the state machine.
///
/// Streams always count as starting over, as does anything within the
/// first second of playback.
pub fn input_type_for(status: &PlayerStatus, song: &Song) -> InputType {
    match status.state {
        PlayState::Playing if status.elapsed < 1.0 || song.is_http() => InputType::PlayFromStart,
        PlayState::Playing => InputType::Play,
        PlayState::Paused => InputType::Pause,
        PlayState::Stopped => InputType::Stop,
    }
}
