use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    None,
}

/// Video stream dimensions, reported alongside the small presence text.
/// Not part of track identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
}

/// Canonical "what is currently playing" value. Missing metadata folds to the
/// empty string so two snapshots of the same track always compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackState {
    pub kind: MediaKind,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub position_secs: u64,
    pub duration_secs: u64,
    pub is_paused: bool,
    pub video: Option<VideoInfo>,
}

impl TrackState {
    /// The "nothing playing" state a stopped or empty snapshot maps to.
    pub fn none() -> Self {
        Self {
            kind: MediaKind::None,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            position_secs: 0,
            duration_secs: 0,
            is_paused: false,
            video: None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == MediaKind::None
    }

    /// Same logical track regardless of position drift or pause flips.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlayerReachability {
    Reachable,
    Unreachable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection and playback status exposed to the tray/UI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoreStatus {
    pub player: PlayerReachability,
    pub session: SessionPhase,
    pub track: Option<TrackState>,
}

impl Default for CoreStatus {
    fn default() -> Self {
        Self {
            player: PlayerReachability::Unreachable,
            session: SessionPhase::Disconnected,
            track: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaKind, TrackState};

    fn track(title: &str, position: u64) -> TrackState {
        TrackState {
            kind: MediaKind::Audio,
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            position_secs: position,
            duration_secs: 300,
            is_paused: false,
            video: None,
        }
    }

    #[test]
    fn identity_ignores_position_and_pause() {
        let a = track("Song", 10);
        let mut b = track("Song", 200);
        b.is_paused = true;

        assert!(a.same_identity(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn identity_distinguishes_titles() {
        assert!(!track("Song A", 0).same_identity(&track("Song B", 0)));
    }

    #[test]
    fn none_state_is_none() {
        assert!(TrackState::none().is_none());
        assert!(!track("Song", 0).is_none());
    }
}
