//! Typed view of VLC's `/requests/status.json` response.
//!
//! VLC groups stream details and tag metadata under `information.category`:
//! a `meta` object plus one object per elementary stream, whose `Type` field
//! distinguishes audio from video. Values inside a category are loosely typed
//! (mostly strings, occasionally numbers), so categories stay as JSON maps
//! with accessors on top.

use serde::Deserialize;
use std::collections::HashMap;

pub type Category = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub state: String,
    /// Elapsed seconds. VLC reports -1 for some inputs.
    #[serde(default)]
    pub time: i64,
    /// Total length in seconds; 0 or -1 for live streams.
    #[serde(default)]
    pub length: i64,
    #[serde(default)]
    pub information: Option<Information>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Information {
    #[serde(default)]
    pub category: HashMap<String, Category>,
}

impl StatusSnapshot {
    pub fn meta(&self) -> Option<&Category> {
        self.information.as_ref()?.category.get("meta")
    }

    pub fn meta_field(&self, name: &str) -> Option<&str> {
        self.meta()?.get(name)?.as_str()
    }

    /// Non-`meta` categories, one per elementary stream.
    pub fn streams(&self) -> impl Iterator<Item = &Category> {
        self.information
            .iter()
            .flat_map(|info| info.category.iter())
            .filter(|(name, _)| name.as_str() != "meta")
            .map(|(_, category)| category)
    }

    pub fn has_video_stream(&self) -> bool {
        self.streams()
            .any(|stream| stream.get("Type").and_then(|v| v.as_str()) == Some("Video"))
    }

    /// `Video_resolution` of the first video stream, as `(width, height)`.
    pub fn video_resolution(&self) -> Option<(u32, u32)> {
        let resolution = self
            .streams()
            .filter(|stream| stream.get("Type").and_then(|v| v.as_str()) == Some("Video"))
            .find_map(|stream| stream.get("Video_resolution").and_then(|v| v.as_str()))?;
        let (width, height) = resolution.split_once('x')?;
        Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::StatusSnapshot;

    #[test]
    fn parses_audio_status() {
        let snapshot: StatusSnapshot = serde_json::from_str(
            r#"{
                "state": "playing",
                "time": 42,
                "length": 300,
                "position": 0.14,
                "information": {
                    "category": {
                        "meta": {
                            "title": "Money",
                            "artist": "Pink Floyd",
                            "album": "The Dark Side of the Moon",
                            "filename": "money.flac"
                        },
                        "Stream 0": {"Type": "Audio", "Codec": "FLAC (flac)"}
                    }
                }
            }"#,
        )
        .expect("parse status");

        assert_eq!(snapshot.state, "playing");
        assert_eq!(snapshot.time, 42);
        assert_eq!(snapshot.meta_field("artist"), Some("Pink Floyd"));
        assert!(!snapshot.has_video_stream());
    }

    #[test]
    fn parses_video_status_with_resolution() {
        let snapshot: StatusSnapshot = serde_json::from_str(
            r#"{
                "state": "paused",
                "time": 10,
                "length": 5400,
                "information": {
                    "category": {
                        "meta": {"filename": "Inception.2010.1080p.BluRay.x264-SPARKS.mkv"},
                        "Stream 0": {"Type": "Video", "Video_resolution": "1920x800"},
                        "Stream 1": {"Type": "Audio"}
                    }
                }
            }"#,
        )
        .expect("parse status");

        assert!(snapshot.has_video_stream());
        assert_eq!(snapshot.video_resolution(), Some((1920, 800)));
    }

    #[test]
    fn parses_stopped_status_without_information() {
        let snapshot: StatusSnapshot =
            serde_json::from_str(r#"{"state": "stopped", "time": 0, "length": 0}"#)
                .expect("parse status");

        assert_eq!(snapshot.state, "stopped");
        assert!(snapshot.meta().is_none());
    }

    #[test]
    fn tolerates_numeric_meta_values() {
        let snapshot: StatusSnapshot = serde_json::from_str(
            r#"{
                "state": "playing",
                "information": {"category": {"meta": {"title": "A", "track_number": 7}}}
            }"#,
        )
        .expect("parse status");

        assert_eq!(snapshot.meta_field("title"), Some("A"));
        assert_eq!(snapshot.meta_field("track_number"), None);
    }
}
