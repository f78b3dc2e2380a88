use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_schema_version() -> u32 {
    1
}

pub const DEFAULT_HTTP_PORT: u16 = 9080;

/// Connection settings for VLC's HTTP control interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlcConfig {
    pub http_port: u16,
    pub http_password: String,
}

impl Default for VlcConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            http_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIntervals {
    pub poll_ms: u64,
    pub source_timeout_ms: u64,
    pub lookup_spacing_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            poll_ms: 5_000,
            source_timeout_ms: 2_000,
            lookup_spacing_ms: 1_000,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Consecutive empty/unreachable polls before the player counts as stopped.
    pub miss_threshold: u32,
    /// Position drift tolerated before a same-track snapshot counts as a seek.
    pub position_drift_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            miss_threshold: 2,
            position_drift_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverArtConfig {
    pub enabled: bool,
    pub cache_capacity: usize,
}

impl Default for CoverArtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_capacity: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    pub large_image: Option<String>,
    pub large_text: Option<String>,
    pub playing_image: Option<String>,
    pub paused_image: Option<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            large_image: Some("logo".to_string()),
            large_text: Some("VLC Media Player".to_string()),
            playing_image: Some("playing".to_string()),
            paused_image: Some("paused".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub discord_app_id: String,
    pub vlc: VlcConfig,
    pub intervals: ConfigIntervals,
    pub sync: SyncConfig,
    pub cover_art: CoverArtConfig,
    pub log_level: String,
    pub assets: AssetsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            discord_app_id: "1345358480671772683".to_string(),
            vlc: VlcConfig::default(),
            intervals: ConfigIntervals::default(),
            sync: SyncConfig::default(),
            cover_art: CoverArtConfig::default(),
            log_level: "info".to_string(),
            assets: AssetsConfig::default(),
        }
    }
}

/// Settings VLC records in its own `vlcrc` config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlcrcSettings {
    pub http_port: Option<u16>,
    pub http_password: Option<String>,
    pub http_enabled: bool,
}

/// Location of `vlcrc` for the current platform.
#[cfg(target_os = "macos")]
pub fn vlcrc_path() -> Option<PathBuf> {
    dirs::preference_dir().map(|base| base.join("org.videolan.vlc").join("vlcrc"))
}

/// Location of `vlcrc` for the current platform.
#[cfg(not(target_os = "macos"))]
pub fn vlcrc_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("vlc").join("vlcrc"))
}

/// Extract the HTTP interface settings from a `vlcrc` document. Commented-out
/// lines are left alone; `extraintf` may list modules separated by `:` or `,`.
pub fn parse_vlcrc(content: &str) -> VlcrcSettings {
    let mut settings = VlcrcSettings::default();
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("http-port=") {
            settings.http_port = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix("http-password=") {
            let value = rest.trim();
            if !value.is_empty() {
                settings.http_password = Some(value.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("extraintf=") {
            settings.http_enabled = rest.split([',', ':']).any(|module| module.trim() == "http");
        }
    }
    settings
}

impl VlcConfig {
    /// Fill values the operator left at their defaults from VLC's own config,
    /// so a freshly installed setup works without hand-editing ours.
    pub fn absorb_vlcrc(&mut self, discovered: &VlcrcSettings) {
        if self.http_port == DEFAULT_HTTP_PORT {
            if let Some(port) = discovered.http_port {
                self.http_port = port;
            }
        }
        if self.http_password.is_empty() {
            if let Some(password) = &discovered.http_password {
                self.http_password = password.clone();
            }
        }
    }
}
