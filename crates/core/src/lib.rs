pub mod config;
pub mod model;
pub mod text;

pub use config::{AppConfig, AssetsConfig, ConfigIntervals, CoverArtConfig, SyncConfig, VlcConfig};
pub use model::{CoreStatus, MediaKind, PlayerReachability, SessionPhase, TrackState, VideoInfo};
