//! Fanitude score formulas.
//!
//! Two intentionally distinct formulas live here. `rank_score` is the live
//! multi-signal ranking used to order the displayed artist list.
//! `listening_minutes` is the narrower value persisted on every sync: it is
//! reset to the current listening window each time (1 point = 1 minute) so
//! stored scores stay directly comparable across users.

use crate::spotify::SignalCounts;

/// Weight of one occurrence in the recently-played window.
pub const RECENT_PLAY_WEIGHT: u32 = 10;
/// Weight of one occurrence among saved tracks.
pub const SAVED_TRACK_WEIGHT: u32 = 5;
/// Weight of one occurrence among playlist tracks.
pub const PLAYLIST_TRACK_WEIGHT: u32 = 3;
/// Flat bonus for being in the followed-artists set.
pub const FOLLOWED_BONUS: u32 = 100;

/// Minutes credited per recently-played occurrence when persisting points.
/// Roughly one typical track length.
pub const MINUTES_PER_RECENT_PLAY: u32 = 3;

/// Live ranking score. Deterministic and side-effect-free.
pub fn rank_score(counts: &SignalCounts) -> u32 {
    let mut score = counts.recent_plays * RECENT_PLAY_WEIGHT
        + counts.saved_tracks * SAVED_TRACK_WEIGHT
        + counts.playlist_tracks * PLAYLIST_TRACK_WEIGHT;
    if counts.followed {
        score += FOLLOWED_BONUS;
    }
    score
}

/// Current-window listening minutes, persisted as fanitude points on sync.
pub fn listening_minutes(recent_plays: u32) -> u32 {
    recent_plays * MINUTES_PER_RECENT_PLAY
}
