use vlc_presence_core::TrackState;

/// Deterministic cache key over whichever of `{artist, album, title}` are
/// present, so repeated lookups for the same track are free.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtKey(String);

impl ArtKey {
    pub fn for_track(state: &TrackState) -> Option<Self> {
        let mut parts = Vec::new();
        for (field, value) in [
            ("artist", &state.artist),
            ("album", &state.album),
            ("title", &state.title),
        ] {
            if !value.is_empty() {
                parts.push(format!("{field}:{}", value.to_lowercase()));
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(Self(parts.join("|")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::ArtKey;
    use vlc_presence_core::{MediaKind, TrackState};

    fn track(artist: &str, album: &str, title: &str) -> TrackState {
        TrackState {
            kind: MediaKind::Audio,
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            position_secs: 0,
            duration_secs: 0,
            is_paused: false,
            video: None,
        }
    }

    #[test]
    fn key_is_deterministic_and_case_insensitive() {
        let a = ArtKey::for_track(&track("Pink Floyd", "The Wall", "Mother"));
        let b = ArtKey::for_track(&track("pink floyd", "the wall", "mother"));
        assert_eq!(a, b);
    }

    #[test]
    fn key_skips_missing_fields() {
        let key = ArtKey::for_track(&track("Pink Floyd", "", "Mother")).expect("key");
        assert_eq!(key.as_str(), "artist:pink floyd|title:mother");
    }

    #[test]
    fn no_metadata_means_no_key() {
        assert!(ArtKey::for_track(&track("", "", "")).is_none());
    }
}
