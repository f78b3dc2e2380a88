//! Pure mapping from a raw VLC snapshot to the canonical [`TrackState`].
//!
//! Deterministic and side-effect free: missing metadata folds to empty
//! strings, never to `None`, so value comparison in the engine stays simple.
//! A stopped or empty snapshot maps to `MediaKind::None`; deciding whether
//! the player actually stopped is the engine's debounce, not ours.

use crate::dto::StatusSnapshot;
use vlc_presence_core::{MediaKind, TrackState, VideoInfo};

pub fn normalize(snapshot: &StatusSnapshot) -> TrackState {
    if snapshot.state == "stopped" || snapshot.state.is_empty() || snapshot.information.is_none() {
        return TrackState::none();
    }

    let kind = if snapshot.has_video_stream() {
        MediaKind::Video
    } else {
        MediaKind::Audio
    };

    let raw_title = snapshot
        .meta_field("title")
        .or_else(|| snapshot.meta_field("filename"))
        .unwrap_or_default();
    let title = match kind {
        MediaKind::Video => clean_video_title(raw_title),
        _ => raw_title.to_string(),
    };

    TrackState {
        kind,
        title,
        artist: snapshot.meta_field("artist").unwrap_or_default().to_string(),
        album: snapshot.meta_field("album").unwrap_or_default().to_string(),
        position_secs: snapshot.time.max(0) as u64,
        duration_secs: snapshot.length.max(0) as u64,
        is_paused: snapshot.state == "paused",
        video: snapshot
            .video_resolution()
            .map(|(width, height)| VideoInfo { width, height }),
    }
}

const CONTAINER_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".ts",
];

const RELEASE_TAGS: &[&str] = &[
    "x264", "x265", "h264", "h265", "hevc", "bluray", "brrip", "webrip", "web-dl", "webdl",
    "hdtv", "dvdrip", "aac", "dts", "10bit", "hdr",
];

/// Video files rarely carry tags, so the title is usually a release-style
/// filename. Strip bracketed group names, the container extension, and
/// everything from the first quality tag onwards.
fn clean_video_title(raw: &str) -> String {
    let mut text = raw.to_string();

    while let (Some(open), Some(close)) = (text.find('['), text.find(']')) {
        if close <= open {
            break;
        }
        text.replace_range(open..=close, " ");
    }

    let lowered = text.to_ascii_lowercase();
    if let Some(ext) = CONTAINER_EXTENSIONS
        .iter()
        .find(|ext| lowered.ends_with(*ext))
    {
        text.truncate(text.len() - ext.len());
    }

    let tokens: Vec<&str> = text
        .split(['.', '_', ' '])
        .filter(|token| !token.is_empty())
        .collect();
    let keep = tokens
        .iter()
        .position(|token| is_release_tag(token))
        .unwrap_or(tokens.len());

    let cleaned = tokens[..keep].join(" ").trim().to_string();
    if cleaned.is_empty() {
        raw.to_string()
    } else {
        cleaned
    }
}

fn is_release_tag(token: &str) -> bool {
    let token = token.to_ascii_lowercase();
    if RELEASE_TAGS
        .iter()
        .any(|tag| token == *tag || token.starts_with(&format!("{tag}-")))
    {
        return true;
    }
    // Resolution markers: 480p, 720p, 1080p, 2160p.
    token.len() >= 4
        && token.ends_with('p')
        && token[..token.len() - 1].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::{clean_video_title, normalize};
    use crate::dto::StatusSnapshot;
    use vlc_presence_core::MediaKind;

    fn snapshot(json: &str) -> StatusSnapshot {
        serde_json::from_str(json).expect("parse status fixture")
    }

    #[test]
    fn stopped_maps_to_none() {
        let state = normalize(&snapshot(r#"{"state": "stopped"}"#));
        assert_eq!(state.kind, MediaKind::None);
    }

    #[test]
    fn empty_snapshot_maps_to_none() {
        let state = normalize(&snapshot(r#"{"state": "playing"}"#));
        assert_eq!(state.kind, MediaKind::None);
    }

    #[test]
    fn audio_with_full_meta() {
        let state = normalize(&snapshot(
            r#"{
                "state": "playing",
                "time": 42,
                "length": 300,
                "information": {"category": {
                    "meta": {"title": "Money", "artist": "Pink Floyd", "album": "The Dark Side of the Moon"},
                    "Stream 0": {"Type": "Audio"}
                }}
            }"#,
        ));

        assert_eq!(state.kind, MediaKind::Audio);
        assert_eq!(state.title, "Money");
        assert_eq!(state.artist, "Pink Floyd");
        assert_eq!(state.position_secs, 42);
        assert!(!state.is_paused);
    }

    #[test]
    fn missing_meta_folds_to_empty_strings() {
        let state = normalize(&snapshot(
            r#"{
                "state": "playing",
                "information": {"category": {"meta": {"filename": "unnamed.flac"}}}
            }"#,
        ));

        assert_eq!(state.title, "unnamed.flac");
        assert_eq!(state.artist, "");
        assert_eq!(state.album, "");
    }

    #[test]
    fn video_stream_sets_kind_and_resolution() {
        let state = normalize(&snapshot(
            r#"{
                "state": "paused",
                "time": -1,
                "length": 5400,
                "information": {"category": {
                    "meta": {"filename": "Inception.2010.1080p.BluRay.x264-SPARKS.mkv"},
                    "Stream 0": {"Type": "Video", "Video_resolution": "1920x800"}
                }}
            }"#,
        ));

        assert_eq!(state.kind, MediaKind::Video);
        assert_eq!(state.title, "Inception 2010");
        assert_eq!(state.position_secs, 0);
        assert!(state.is_paused);
        assert_eq!(state.video.map(|v| (v.width, v.height)), Some((1920, 800)));
    }

    #[test]
    fn cleans_tv_release_filenames() {
        assert_eq!(
            clean_video_title("The.Office.S03E10.720p.HDTV.x264-DIMENSION.mkv"),
            "The Office S03E10"
        );
        assert_eq!(
            clean_video_title("[HorribleSubs] Attack on Titan - 03 [1080p].mkv"),
            "Attack on Titan - 03"
        );
        assert_eq!(clean_video_title("holiday_video.mp4"), "holiday video");
    }
}
