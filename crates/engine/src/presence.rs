//! Presence payload formatting.

use serde::{Deserialize, Serialize};
use vlc_presence_core::text::{clamp, MAX_PRESENCE_LEN};
use vlc_presence_core::{AssetsConfig, MediaKind, TrackState};
use vlc_presence_coverart::ImageReference;

pub const ACTIVITY_LISTENING: u8 = 2;
pub const ACTIVITY_WATCHING: u8 = 3;

/// Discord renders no countdown past 24h; such end timestamps are dropped.
const MAX_TIMESTAMP_SPAN_SECS: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub activity_type: u8,
    pub name: String,
    pub details: String,
    pub state: String,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
    pub large_image: Option<String>,
    pub large_text: Option<String>,
    pub small_image: Option<String>,
    pub small_text: Option<String>,
}

/// Render a track into the payload the presence service receives.
///
/// Timestamps are only attached while playing: `start` back-dates the
/// activity by the current position so the elapsed counter is right, and
/// `end` adds the remaining-time countdown when the duration is sane.
pub fn build(
    track: &TrackState,
    art: Option<&ImageReference>,
    assets: &AssetsConfig,
    now_epoch: i64,
) -> PresenceUpdate {
    let watching = track.kind == MediaKind::Video;
    let title = if track.title.is_empty() {
        "Unknown"
    } else {
        &track.title
    };

    let state = if !track.artist.is_empty() {
        if !track.album.is_empty() {
            format!("by {} • {}", track.artist, track.album)
        } else {
            format!("by {}", track.artist)
        }
    } else if !track.album.is_empty() {
        format!("from {}", track.album)
    } else if track.is_paused {
        "Paused".to_string()
    } else if watching {
        "Now watching".to_string()
    } else {
        "Now listening".to_string()
    };

    let (start_timestamp, end_timestamp) = if track.is_paused {
        (None, None)
    } else {
        let start = now_epoch - track.position_secs as i64;
        let end = (track.duration_secs > 0 && track.duration_secs < MAX_TIMESTAMP_SPAN_SECS)
            .then(|| start + track.duration_secs as i64);
        (Some(start), end)
    };

    let mut small_text = if track.is_paused {
        "Paused".to_string()
    } else {
        "Playing".to_string()
    };
    if let Some(video) = &track.video {
        small_text.push_str(&format!(" • {}x{}", video.width, video.height));
    }

    PresenceUpdate {
        activity_type: if watching {
            ACTIVITY_WATCHING
        } else {
            ACTIVITY_LISTENING
        },
        name: if watching { "Watching" } else { "Listening" }.to_string(),
        details: clamp(title, MAX_PRESENCE_LEN),
        state: clamp(&state, MAX_PRESENCE_LEN),
        start_timestamp,
        end_timestamp,
        large_image: art
            .map(|image| image.url().to_string())
            .or_else(|| assets.large_image.clone()),
        large_text: assets.large_text.clone(),
        small_image: if track.is_paused {
            assets.paused_image.clone()
        } else {
            assets.playing_image.clone()
        },
        small_text: Some(small_text),
    }
}
