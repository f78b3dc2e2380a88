//! Cover-art resolution: a synchronous LRU cache in front of rate-limited
//! MusicBrainz / Cover Art Archive lookups.
//!
//! The cache is only ever touched from the sync loop's context. Remote
//! lookups run on a single worker task consuming a request queue, which both
//! keeps the loop non-blocking and serializes requests for rate limiting;
//! completions come back through a channel the loop selects on.

pub mod cache;
pub mod key;
pub mod musicbrainz;

pub use cache::ArtCache;
pub use key::ArtKey;
pub use musicbrainz::{ArtQuery, LookupClient, LookupError};

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use vlc_presence_core::{CoverArtConfig, TrackState};

/// URL of a resolved front cover, usable directly as a presence asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

/// Outcome of a synchronous resolution attempt.
#[derive(Debug)]
pub enum Resolution {
    /// Cache answer, positive or negative.
    Cached(Option<ImageReference>),
    /// A lookup was dispatched; a [`Resolved`] with this key arrives later.
    Pending(ArtKey),
    /// The track carries no usable metadata, or lookups are disabled.
    Unkeyed,
}

/// A completed remote lookup, delivered on the results channel.
#[derive(Debug)]
pub struct Resolved {
    pub key: ArtKey,
    pub art: Option<ImageReference>,
}

struct WorkItem {
    key: ArtKey,
    query: ArtQuery,
}

pub struct CoverArtResolver {
    enabled: bool,
    cache: ArtCache,
    requests: mpsc::Sender<WorkItem>,
    in_flight: HashSet<ArtKey>,
}

impl CoverArtResolver {
    /// Spawns the lookup worker; results arrive on the returned receiver.
    pub fn spawn(cfg: &CoverArtConfig, spacing: Duration) -> (Self, mpsc::Receiver<Resolved>) {
        let (request_tx, request_rx) = mpsc::channel(16);
        let (result_tx, result_rx) = mpsc::channel(16);
        tokio::spawn(worker(request_rx, result_tx, spacing));
        (Self::with_sender(cfg, request_tx), result_rx)
    }

    fn with_sender(cfg: &CoverArtConfig, requests: mpsc::Sender<WorkItem>) -> Self {
        Self {
            enabled: cfg.enabled,
            cache: ArtCache::new(cfg.cache_capacity),
            requests,
            in_flight: HashSet::new(),
        }
    }

    /// Cache lookup, dispatching a remote lookup on miss. Never blocks.
    pub fn resolve(&mut self, state: &TrackState) -> Resolution {
        if !self.enabled {
            return Resolution::Unkeyed;
        }
        let Some(key) = ArtKey::for_track(state) else {
            return Resolution::Unkeyed;
        };
        // Remote search needs an artist plus either album or title.
        if state.artist.is_empty() || (state.album.is_empty() && state.title.is_empty()) {
            return Resolution::Unkeyed;
        }

        if let Some(cached) = self.cache.get(&key) {
            return Resolution::Cached(cached.clone());
        }
        if self.in_flight.contains(&key) {
            return Resolution::Pending(key);
        }

        let item = WorkItem {
            key: key.clone(),
            query: ArtQuery {
                artist: state.artist.clone(),
                album: state.album.clone(),
                title: state.title.clone(),
            },
        };
        match self.requests.try_send(item) {
            Ok(()) => {
                self.in_flight.insert(key.clone());
                Resolution::Pending(key)
            }
            Err(err) => {
                warn!(error = %err, "cover art lookup queue unavailable");
                Resolution::Unkeyed
            }
        }
    }

    /// Record a completed lookup in the cache.
    pub fn complete(&mut self, resolved: &Resolved) {
        self.in_flight.remove(&resolved.key);
        self.cache.insert(resolved.key.clone(), resolved.art.clone());
    }
}

async fn worker(
    mut requests: mpsc::Receiver<WorkItem>,
    results: mpsc::Sender<Resolved>,
    spacing: Duration,
) {
    let client = LookupClient::new();
    let mut last_request: Option<Instant> = None;

    while let Some(item) = requests.recv().await {
        if let Some(at) = last_request {
            let elapsed = at.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        last_request = Some(Instant::now());

        let art = match client.find_front_cover(&item.query).await {
            Ok(image) => Some(image),
            Err(err) => {
                debug!(key = item.key.as_str(), error = %err, "cover art lookup failed");
                None
            }
        };

        if results
            .send(Resolved { key: item.key, art })
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CoverArtResolver, Resolution, Resolved, WorkItem};
    use tokio::sync::mpsc;
    use vlc_presence_core::{CoverArtConfig, MediaKind, TrackState};

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

    fn resolver() -> (CoverArtResolver, mpsc::Receiver<WorkItem>) {
        let (tx, rx) = mpsc::channel(16);
        let cfg = CoverArtConfig {
            enabled: true,
            cache_capacity: 8,
        };
        (CoverArtResolver::with_sender(&cfg, tx), rx)
    }

    #[test]
    fn repeated_resolution_dispatches_one_lookup() {
        let (mut resolver, mut requests) = resolver();
        let state = track("Pink Floyd", "The Wall", "Mother");

        let key = match resolver.resolve(&state) {
            Resolution::Pending(key) => key,
            other => panic!("expected pending resolution, got {other:?}"),
        };
        assert!(matches!(resolver.resolve(&state), Resolution::Pending(_)));

        // Exactly one work item was queued for the two calls.
        assert!(requests.try_recv().is_ok());
        assert!(requests.try_recv().is_err());

        resolver.complete(&Resolved {
            key,
            art: Some(super::ImageReference::new("https://img/wall")),
        });

        match resolver.resolve(&state) {
            Resolution::Cached(Some(art)) => assert_eq!(art.url(), "https://img/wall"),
            other => panic!("expected cached art, got {other:?}"),
        }
        assert!(requests.try_recv().is_err());
    }

    #[test]
    fn failed_lookup_is_cached_negative() {
        let (mut resolver, _requests) = resolver();
        let state = track("Pink Floyd", "The Wall", "Mother");

        let Resolution::Pending(key) = resolver.resolve(&state) else {
            panic!("expected pending");
        };
        resolver.complete(&Resolved { key, art: None });

        assert!(matches!(resolver.resolve(&state), Resolution::Cached(None)));
    }

    #[test]
    fn tracks_without_artist_are_unkeyed() {
        let (mut resolver, mut requests) = resolver();
        assert!(matches!(
            resolver.resolve(&track("", "", "Some Video")),
            Resolution::Unkeyed
        ));
        assert!(requests.try_recv().is_err());
    }

    #[test]
    fn disabled_resolver_never_dispatches() {
        let (tx, mut rx) = mpsc::channel(16);
        let cfg = CoverArtConfig {
            enabled: false,
            cache_capacity: 8,
        };
        let mut resolver = CoverArtResolver::with_sender(&cfg, tx);

        assert!(matches!(
            resolver.resolve(&track("Pink Floyd", "The Wall", "Mother")),
            Resolution::Unkeyed
        ));
        assert!(rx.try_recv().is_err());
    }
}
