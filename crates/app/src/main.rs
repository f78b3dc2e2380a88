use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vlc_presence_core::config::{parse_vlcrc, vlcrc_path};
use vlc_presence_core::{
    AppConfig, AssetsConfig, CoreStatus, PlayerReachability, SessionPhase, TrackState,
};
use vlc_presence_coverart::{CoverArtResolver, ImageReference, Resolution};
use vlc_presence_discord_rpc::{Backoff, PresenceClient, PublishError};
use vlc_presence_engine::{
    presence, EngineAction, EngineConfig, MissKind, PollOutcome, SyncEngine,
};
use vlc_presence_vlc::{normalize, SourceError, StatusSource};

#[derive(Parser, Debug)]
#[command(
    name = "vlc-presence",
    about = "VLC playback -> Discord Rich Presence"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run,
    Doctor,
    Status,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg).await
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Run => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg).await
        }
    }
}

async fn run(cfg: AppConfig) -> Result<()> {
    let source = StatusSource::new(
        &cfg.vlc,
        Duration::from_millis(cfg.intervals.source_timeout_ms),
    );
    let mut engine = SyncEngine::new(EngineConfig::from_app_config(&cfg));
    let (mut resolver, mut art_rx) = CoverArtResolver::spawn(
        &cfg.cover_art,
        Duration::from_millis(cfg.intervals.lookup_spacing_ms),
    );
    let mut publisher = PresenceClient::new(
        cfg.discord_app_id.clone(),
        Backoff::new(
            Duration::from_millis(cfg.intervals.backoff_base_ms),
            Duration::from_millis(cfg.intervals.backoff_cap_ms),
        ),
    );

    // The tray/settings UI reads this; the receiver is handed out when a UI
    // attaches, and the daemon runs fine without one.
    let (status_tx, _status_rx) = watch::channel(CoreStatus::default());

    info!(endpoint = source.endpoint(), "vlc-presence started");

    let mut interval = tokio::time::interval(Duration::from_millis(cfg.intervals.poll_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Desired update not yet accepted by the presence service. Held across
    // ticks while the session reconnects.
    let mut pending: Option<(TrackState, Option<ImageReference>)> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (outcome, player) = match source.poll().await {
                    Ok(snapshot) => (
                        PollOutcome::Snapshot(normalize(&snapshot)),
                        PlayerReachability::Reachable,
                    ),
                    Err(err) => {
                        let kind = match &err {
                            SourceError::Malformed(_) => MissKind::Malformed,
                            _ => MissKind::Unavailable,
                        };
                        match &err {
                            SourceError::Unavailable(detail) => {
                                debug!(%detail, "player unreachable")
                            }
                            _ => warn!(error = %err, "status poll failed"),
                        }
                        (PollOutcome::Miss(kind), PlayerReachability::Unreachable)
                    }
                };

                match engine.observe(outcome, Instant::now()) {
                    EngineAction::Publish(state) => {
                        let art = match resolver.resolve(&state) {
                            Resolution::Cached(art) => art,
                            Resolution::Pending(key) => {
                                engine.expect_art(key);
                                None
                            }
                            Resolution::Unkeyed => None,
                        };
                        pending = Some((state, art));
                    }
                    EngineAction::Clear => {
                        pending = None;
                        match publisher.clear().await {
                            Ok(()) => info!("cleared presence (player stopped)"),
                            Err(err) => debug!(error = %err, "presence clear failed"),
                        }
                    }
                    EngineAction::None => {}
                }

                // A session that died while a track is published: hold the
                // current state as the desired update so reconnect attempts
                // run (spaced by the backoff) and the presence is repaired
                // once the client is back.
                if pending.is_none() && publisher.phase() != SessionPhase::Connected {
                    if let Some(state) = engine.current().cloned() {
                        let art = match resolver.resolve(&state) {
                            Resolution::Cached(art) => art,
                            Resolution::Pending(key) => {
                                engine.expect_art(key);
                                None
                            }
                            Resolution::Unkeyed => None,
                        };
                        pending = Some((state, art));
                    }
                }

                flush_pending(&mut publisher, &cfg.assets, &mut pending).await;
                status_tx.send_replace(CoreStatus {
                    player,
                    session: publisher.phase(),
                    track: engine.current().cloned(),
                });
            }
            Some(resolved) = art_rx.recv() => {
                resolver.complete(&resolved);
                if let Some(state) = engine.art_resolved(&resolved.key, resolved.art.is_some()) {
                    pending = Some((state, resolved.art));
                    flush_pending(&mut publisher, &cfg.assets, &mut pending).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    // Best-effort: leave no stale presence behind.
    let _ = publisher.clear().await;
    Ok(())
}

/// Try to push the held update. `Disconnected` keeps it for a later tick
/// (reconnects are spaced by the publisher's backoff); `Rejected` drops it
/// until the next state change.
async fn flush_pending(
    publisher: &mut PresenceClient,
    assets: &AssetsConfig,
    pending: &mut Option<(TrackState, Option<ImageReference>)>,
) {
    let Some((state, art)) = pending.as_ref() else {
        return;
    };

    let update = presence::build(state, art.as_ref(), assets, epoch_now());
    match publisher.set_activity(&update).await {
        Ok(()) => {
            info!(title = %state.title, artist = %state.artist, "presence updated");
            *pending = None;
        }
        Err(PublishError::Rejected { code, message }) => {
            warn!(code, %message, "presence update rejected");
            *pending = None;
        }
        Err(PublishError::Disconnected(detail)) => {
            debug!(%detail, "presence session down; holding update");
        }
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== vlc-presence doctor ==");

    let source = StatusSource::new(
        &cfg.vlc,
        Duration::from_millis(cfg.intervals.source_timeout_ms),
    );
    let (_vlc_ok, message) = source.check().await;
    println!("VLC: {message}");

    match vlcrc_path() {
        Some(path) if path.exists() => println!("VLC config: {}", path.display()),
        Some(path) => println!(
            "VLC config: not found at {} (run VLC once to create it)",
            path.display()
        ),
        None => println!("VLC config: no known location on this platform"),
    }

    let discord_ok = discord_running().await;
    println!(
        "Discord RPC local endpoint: {}",
        if discord_ok {
            "reachable"
        } else {
            "not reachable"
        }
    );

    if let Ok(snapshot) = source.poll().await {
        let track = normalize(&snapshot);
        if track.is_none() {
            println!("Now playing: <nothing>");
        } else {
            println!("Now playing: {} - {}", track.artist, track.title);
        }
    }

    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let source = StatusSource::new(
        &cfg.vlc,
        Duration::from_millis(cfg.intervals.source_timeout_ms),
    );

    match source.poll().await {
        Ok(snapshot) => {
            let track = normalize(&snapshot);
            if track.is_none() {
                println!("track: <none>");
            } else {
                println!("kind: {:?}", track.kind);
                println!("track: {} - {}", track.artist, track.title);
                if !track.album.is_empty() {
                    println!("album: {}", track.album);
                }
                println!(
                    "position: {}s / {}s{}",
                    track.position_secs,
                    track.duration_secs,
                    if track.is_paused { " (paused)" } else { "" }
                );
            }
        }
        Err(err) => println!("error: {err}"),
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("vlc-presence").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    discover_vlc_settings(&mut cfg);
    Ok(cfg)
}

/// Fill connection values the operator didn't pin from VLC's own `vlcrc`.
fn discover_vlc_settings(cfg: &mut AppConfig) {
    let Some(path) = vlcrc_path() else {
        return;
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return;
    };
    let discovered = parse_vlcrc(&content);
    if !discovered.http_enabled {
        warn!(
            vlcrc = %path.display(),
            "VLC's HTTP interface is not enabled; enable it under extraintf"
        );
    }
    cfg.vlc.absorb_vlcrc(&discovered);
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

async fn discord_running() -> bool {
    #[cfg(unix)]
    {
        for slot in 0..=9 {
            if discord_ipc_exists(slot) {
                return true;
            }
        }
    }

    let ports = [6463, 6464, 6465, 6466, 6467, 6468, 6469, 6470, 6471, 6472];
    for port in ports {
        let addr = format!("127.0.0.1:{port}");
        if tokio::time::timeout(
            Duration::from_millis(200),
            tokio::net::TcpStream::connect(addr),
        )
        .await
        .ok()
        .and_then(Result::ok)
        .is_some()
        {
            return true;
        }
    }
    false
}

#[cfg(unix)]
fn discord_ipc_exists(slot: u8) -> bool {
    let mut candidates = Vec::new();
    if let Ok(tmpdir) = std::env::var("TMPDIR") {
        candidates.push(PathBuf::from(tmpdir).join(format!("discord-ipc-{slot}")));
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime).join(format!("discord-ipc-{slot}")));
    }
    candidates.push(PathBuf::from(format!("/tmp/discord-ipc-{slot}")));
    candidates.push(PathBuf::from(format!("/private/tmp/discord-ipc-{slot}")));

    candidates.into_iter().any(|p| p.exists())
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("VLC_PRESENCE_DISCORD_APP_ID") {
        if !v.trim().is_empty() {
            cfg.discord_app_id = v;
        }
    }
    if let Ok(v) = std::env::var("VLC_PRESENCE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Ok(v) = std::env::var("VLC_PRESENCE_HTTP_PORT") {
        if let Ok(port) = v.trim().parse() {
            cfg.vlc.http_port = port;
        }
    }
    if let Ok(v) = std::env::var("VLC_PRESENCE_HTTP_PASSWORD") {
        if !v.is_empty() {
            cfg.vlc.http_password = v;
        }
    }
}
