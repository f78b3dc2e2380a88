use crate::key::ArtKey;
use crate::ImageReference;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Bounded LRU over resolved lookups. Album art is immutable, so entries
/// never expire within a process lifetime; negative results are cached too,
/// so a track is probed at most once.
pub struct ArtCache {
    entries: LruCache<ArtKey, Option<ImageReference>>,
}

impl ArtCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    pub fn get(&mut self, key: &ArtKey) -> Option<&Option<ImageReference>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: ArtKey, art: Option<ImageReference>) {
        self.entries.put(key, art);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::ArtCache;
    use crate::key::ArtKey;
    use crate::ImageReference;
    use vlc_presence_core::{MediaKind, TrackState};

    fn key(title: &str) -> ArtKey {
        ArtKey::for_track(&TrackState {
            kind: MediaKind::Audio,
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: String::new(),
            position_secs: 0,
            duration_secs: 0,
            is_paused: false,
            video: None,
        })
        .expect("key")
    }

    #[test]
    fn caches_positive_and_negative_results() {
        let mut cache = ArtCache::new(4);
        cache.insert(key("a"), Some(ImageReference::new("https://img/a")));
        cache.insert(key("b"), None);

        assert_eq!(
            cache.get(&key("a")).and_then(|art| art.as_ref()).map(ImageReference::url),
            Some("https://img/a")
        );
        assert_eq!(cache.get(&key("b")), Some(&None));
        assert_eq!(cache.get(&key("c")), None);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut cache = ArtCache::new(2);
        cache.insert(key("a"), None);
        cache.insert(key("b"), None);

        // Touch "a" so "b" is the eviction candidate.
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("c"), None);

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_one_entry() {
        let mut cache = ArtCache::new(0);
        cache.insert(key("a"), None);
        assert_eq!(cache.len(), 1);
    }
}
