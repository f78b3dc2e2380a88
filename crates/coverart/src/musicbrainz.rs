//! MusicBrainz search and Cover Art Archive probing.
//!
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits to
//! 1 req/sec; request spacing is enforced by the resolver worker.

use crate::ImageReference;
use serde::Deserialize;
use tracing::debug;

const USER_AGENT: &str = concat!(
    "vlc-presence/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/your-org/vlc-presence)"
);

/// Candidates scoring below this are never probed for artwork.
const MIN_CANDIDATE_SCORE: i64 = 30;
/// At most this many releases are probed per lookup.
const MAX_PROBES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by metadata service")]
    RateLimited,
    #[error("no matching release found")]
    NoMatch,
    #[error("unexpected response: {0}")]
    Parse(String),
}

/// The metadata a lookup is keyed on, captured from the track at dispatch
/// time. Album-level search runs first, recording-level as fallback.
#[derive(Debug, Clone)]
pub struct ArtQuery {
    pub artist: String,
    pub album: String,
    pub title: String,
}

pub struct LookupClient {
    http: reqwest::Client,
    musicbrainz_base: String,
    coverart_base: String,
}

impl LookupClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            musicbrainz_base: "https://musicbrainz.org/ws/2".to_string(),
            coverart_base: "https://coverartarchive.org".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_urls(
        musicbrainz_base: impl Into<String>,
        coverart_base: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            musicbrainz_base: musicbrainz_base.into(),
            coverart_base: coverart_base.into(),
        }
    }

    /// Resolve a front-cover URL for the query, best candidate first.
    pub async fn find_front_cover(&self, query: &ArtQuery) -> Result<ImageReference, LookupError> {
        if !query.artist.is_empty() && !query.album.is_empty() {
            let releases = self.search_releases(&release_query(query)).await?;
            if let Some(image) = self.probe_candidates(rank(releases, query)).await {
                return Ok(image);
            }
        }

        if !query.artist.is_empty() && !query.title.is_empty() {
            let releases = self.search_recordings(&recording_query(query)).await?;
            if let Some(image) = self.probe_candidates(rank(releases, query)).await {
                return Ok(image);
            }
        }

        Err(LookupError::NoMatch)
    }

    async fn search_releases(&self, lucene: &str) -> Result<Vec<Release>, LookupError> {
        let url = format!("{}/release", self.musicbrainz_base);
        debug!(query = lucene, "searching MusicBrainz releases");
        let response: ReleaseSearchResponse = self.search(&url, lucene).await?;
        Ok(response.releases)
    }

    async fn search_recordings(&self, lucene: &str) -> Result<Vec<Release>, LookupError> {
        let url = format!("{}/recording", self.musicbrainz_base);
        debug!(query = lucene, "searching MusicBrainz recordings");
        let response: RecordingSearchResponse = self.search(&url, lucene).await?;
        Ok(response
            .recordings
            .into_iter()
            .flat_map(|recording| recording.releases)
            .collect())
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        lucene: &str,
    ) -> Result<T, LookupError> {
        let response = self
            .http
            .get(url)
            .query(&[("query", lucene), ("fmt", "json"), ("limit", "10")])
            .send()
            .await
            .map_err(|err| LookupError::Network(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(LookupError::RateLimited);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NoMatch);
        }
        if !status.is_success() {
            return Err(LookupError::Network(format!("HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| LookupError::Parse(err.to_string()))
    }

    /// Probe ranked candidates against the Cover Art Archive until one has a
    /// front cover. A HEAD request is enough; the URL itself is the artwork
    /// reference Discord receives.
    async fn probe_candidates(&self, ranked: Vec<(i64, String)>) -> Option<ImageReference> {
        for (score, release_id) in ranked.into_iter().take(MAX_PROBES) {
            let url = format!("{}/release/{}/front-500", self.coverart_base, release_id);
            match self.http.head(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%url, score, "found front cover");
                    return Some(ImageReference::new(url));
                }
                Ok(response) => {
                    debug!(%url, status = %response.status(), "no front cover for release");
                }
                Err(err) => {
                    debug!(%url, error = %err, "cover probe failed");
                }
            }
        }
        None
    }
}

impl Default for LookupClient {
    fn default() -> Self {
        Self::new()
    }
}

fn release_query(query: &ArtQuery) -> String {
    format!(
        "artist:\"{}\" AND release:\"{}\"",
        escape_lucene(&query.artist),
        escape_lucene(&query.album)
    )
}

fn recording_query(query: &ArtQuery) -> String {
    format!(
        "recording:\"{}\" AND artist:\"{}\"",
        escape_lucene(&query.title),
        escape_lucene(&query.artist)
    )
}

fn escape_lucene(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Score candidates against the query and keep the plausible ones, best
/// first. The search engine's own score is a baseline; exact artist and
/// album matches dominate, unofficial and live/remix releases are penalized.
fn rank(releases: Vec<Release>, query: &ArtQuery) -> Vec<(i64, String)> {
    let mut ranked: Vec<(i64, String)> = releases
        .into_iter()
        .map(|release| (score_release(&release, query), release.id))
        .filter(|(score, _)| *score >= MIN_CANDIDATE_SCORE)
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked
}

fn score_release(release: &Release, query: &ArtQuery) -> i64 {
    let mut score = release.score.unwrap_or(0).min(100);

    if !query.artist.is_empty() {
        let credited: Vec<String> = release
            .artist_credit
            .iter()
            .map(|credit| credit.name.to_lowercase())
            .collect();
        let wanted = query.artist.to_lowercase();
        if credited.iter().any(|name| fuzzy_match(&wanted, name)) {
            score += 100;
        } else if credited
            .iter()
            .any(|name| name.contains(&wanted) || wanted.contains(name.as_str()))
        {
            score += 70;
        }
    }

    if !query.album.is_empty() && !release.title.is_empty() {
        let wanted = query.album.to_lowercase();
        let candidate = release.title.to_lowercase();
        if fuzzy_match(&wanted, &candidate) {
            score += 100;
        } else if candidate.contains(&wanted) || wanted.contains(&candidate) {
            score += 70;
        }
    }

    if release.status.as_deref() == Some("Official") {
        score += 30;
    }

    if let Some(group) = &release.release_group {
        for secondary in &group.secondary_types {
            score += match secondary.as_str() {
                "Compilation" => -15,
                "Live" => -25,
                "Remix" => -20,
                _ => 0,
            };
        }
    }

    score.max(0)
}

fn fuzzy_match(a: &str, b: &str) -> bool {
    let a = strip_punctuation(a);
    let b = strip_punctuation(b);
    if a == b {
        return true;
    }
    a.len() > 5 && b.len() > 5 && (a.contains(&b) || b.contains(&a))
}

fn strip_punctuation(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

#[derive(Debug, Deserialize)]
struct ReleaseSearchResponse {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "artist-credit")]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default, rename = "release-group")]
    release_group: Option<ReleaseGroup>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroup {
    #[serde(default, rename = "secondary-types")]
    secondary_types: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::{
        rank, recording_query, release_query, ArtQuery, LookupClient, Release,
        ReleaseSearchResponse,
    };

    fn query() -> ArtQuery {
        ArtQuery {
            artist: "Pink Floyd".to_string(),
            album: "The Dark Side of the Moon".to_string(),
            title: "Money".to_string(),
        }
    }

    #[test]
    fn builds_release_and_recording_queries() {
        let q = query();
        assert_eq!(
            release_query(&q),
            "artist:\"Pink Floyd\" AND release:\"The Dark Side of the Moon\""
        );
        assert_eq!(
            recording_query(&q),
            "recording:\"Money\" AND artist:\"Pink Floyd\""
        );
    }

    #[test]
    fn escapes_quotes_in_queries() {
        let q = ArtQuery {
            artist: "The \"Band\"".to_string(),
            album: "Album".to_string(),
            title: String::new(),
        };
        assert!(release_query(&q).contains("artist:\"The \\\"Band\\\"\""));
    }

    #[test]
    fn ranking_prefers_official_exact_matches() {
        let json = r#"{"releases": [
            {"id": "live-id", "title": "The Dark Side of the Moon", "score": 100,
             "artist-credit": [{"name": "Pink Floyd"}],
             "release-group": {"secondary-types": ["Live"]}},
            {"id": "official-id", "title": "The Dark Side of the Moon", "score": 100,
             "status": "Official",
             "artist-credit": [{"name": "Pink Floyd"}]},
            {"id": "noise-id", "title": "Unrelated", "score": 20,
             "artist-credit": [{"name": "Someone Else"}]}
        ]}"#;
        let parsed: ReleaseSearchResponse = serde_json::from_str(json).expect("parse");

        let ranked = rank(parsed.releases, &query());
        assert_eq!(ranked.first().map(|(_, id)| id.as_str()), Some("official-id"));
        assert!(ranked.iter().all(|(_, id)| id != "noise-id"));
    }

    #[test]
    fn low_score_candidates_are_dropped() {
        let releases = vec![Release {
            id: "weak".to_string(),
            title: "Nothing Alike".to_string(),
            score: Some(5),
            status: None,
            artist_credit: Vec::new(),
            release_group: None,
        }];
        assert!(rank(releases, &query()).is_empty());
    }

    #[test]
    fn client_base_urls_are_overridable() {
        let client = LookupClient::with_base_urls("http://localhost:8080", "http://localhost:8081");
        assert_eq!(client.musicbrainz_base, "http://localhost:8080");
        assert_eq!(client.coverart_base, "http://localhost:8081");
    }
}
