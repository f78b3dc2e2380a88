//! The decision core of the sync loop.
//!
//! [`SyncEngine`] is deliberately pure: it is fed poll outcomes and lookup
//! completions together with the current instant, and answers with the action
//! the loop should take. All timers, I/O, and channels live in the app crate,
//! which keeps every transition unit-testable.

pub mod debounce;
pub mod presence;

pub use debounce::MissCounter;
pub use presence::{PresenceUpdate, ACTIVITY_LISTENING, ACTIVITY_WATCHING};

use std::time::{Duration, Instant};
use tracing::debug;
use vlc_presence_core::{AppConfig, TrackState};
use vlc_presence_coverart::ArtKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissKind {
    /// Player offline, interface disabled, or request timed out.
    Unavailable,
    /// Response arrived but could not be understood.
    Malformed,
}

/// One poll cycle's result, as seen by the engine.
#[derive(Debug)]
pub enum PollOutcome {
    Snapshot(TrackState),
    Miss(MissKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Push this state to the presence service.
    Publish(TrackState),
    /// Remove any published presence.
    Clear,
    None,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub miss_threshold: u32,
    pub position_drift: Duration,
}

impl EngineConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            miss_threshold: cfg.sync.miss_threshold,
            position_drift: Duration::from_secs(cfg.sync.position_drift_secs),
        }
    }
}

#[derive(Debug)]
struct Published {
    state: TrackState,
    at: Instant,
}

pub struct SyncEngine {
    cfg: EngineConfig,
    misses: MissCounter,
    published: Option<Published>,
    pending_art: Option<ArtKey>,
}

impl SyncEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let misses = MissCounter::new(cfg.miss_threshold);
        Self {
            cfg,
            misses,
            published: None,
            pending_art: None,
        }
    }

    /// Feed one poll cycle's outcome. A source error or an empty snapshot is
    /// a miss sample; anything else resets the miss streak and is compared by
    /// value against the last published state.
    pub fn observe(&mut self, outcome: PollOutcome, now: Instant) -> EngineAction {
        let state = match outcome {
            PollOutcome::Miss(kind) => {
                debug!(?kind, misses = self.misses.consecutive() + 1, "source miss");
                return self.observe_absence();
            }
            PollOutcome::Snapshot(state) if state.is_none() => return self.observe_absence(),
            PollOutcome::Snapshot(state) => state,
        };

        self.misses.reset();

        if let Some(published) = &self.published {
            if unchanged(published, &state, now, self.cfg.position_drift) {
                return EngineAction::None;
            }
        }

        self.pending_art = None;
        self.published = Some(Published {
            state: state.clone(),
            at: now,
        });
        EngineAction::Publish(state)
    }

    fn observe_absence(&mut self) -> EngineAction {
        if self.misses.record_miss() && self.published.take().is_some() {
            self.pending_art = None;
            return EngineAction::Clear;
        }
        EngineAction::None
    }

    /// Record the key the loop is waiting on after publishing without art.
    pub fn expect_art(&mut self, key: ArtKey) {
        self.pending_art = Some(key);
    }

    /// A lookup completed. Returns the state to republish, now with art,
    /// if the key still belongs to the currently published track.
    pub fn art_resolved(&mut self, key: &ArtKey, has_art: bool) -> Option<TrackState> {
        if self.pending_art.as_ref() != Some(key) {
            return None;
        }
        self.pending_art = None;
        if !has_art {
            return None;
        }
        self.published.as_ref().map(|p| p.state.clone())
    }

    /// The currently published track, exposed for the observable status.
    pub fn current(&self) -> Option<&TrackState> {
        self.published.as_ref().map(|p| &p.state)
    }
}

/// Same state as published, tolerating the position drift expected from
/// normal progression. Anything beyond the threshold is a seek and warrants
/// fresh timestamps.
fn unchanged(published: &Published, state: &TrackState, now: Instant, drift: Duration) -> bool {
    if !published.state.same_identity(state) || published.state.is_paused != state.is_paused {
        return false;
    }

    let elapsed = now.duration_since(published.at).as_secs();
    let expected = if published.state.is_paused {
        published.state.position_secs
    } else {
        published.state.position_secs + elapsed
    };
    state.position_secs.abs_diff(expected) <= drift.as_secs()
}
