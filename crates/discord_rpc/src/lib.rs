//! Discord Rich Presence session.
//!
//! Updates go through `SET_ACTIVITY` against whichever local transport the
//! Discord client exposes: the IPC socket/pipe slots first, the local RPC
//! websocket ports as fallback. Activity updates are in-place, so resending
//! the same payload never flickers on the client side.
//!
//! The session is an explicit state machine. Any transport failure drops it
//! back to `Disconnected` and arms the exponential backoff; while the backoff
//! window is open every call fails fast with [`PublishError::Disconnected`]
//! instead of blocking the sync loop on a doomed connect.

mod backoff;

pub use backoff::Backoff;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;
use vlc_presence_core::SessionPhase;
use vlc_presence_engine::PresenceUpdate;

const PORTS: [u16; 10] = [6463, 6464, 6465, 6466, 6467, 6468, 6469, 6470, 6471, 6472];
const IPC_SLOTS: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

const OPCODE_HANDSHAKE: i32 = 0;
const OPCODE_FRAME: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Session is down; the engine's loop holds the desired state and the
    /// backoff gate decides when the next connect attempt may run.
    #[error("presence session disconnected: {0}")]
    Disconnected(String),
    /// The client accepted the frame but refused the update. Not retried
    /// until the next state change.
    #[error("presence update rejected: code {code}: {message}")]
    Rejected { code: i64, message: String },
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Transport {
    Ipc(IpcTransport),
    Ws(Ws),
}

#[cfg(unix)]
enum IpcTransport {
    Unix(tokio::net::UnixStream),
}

#[cfg(windows)]
enum IpcTransport {
    Pipe(tokio::net::windows::named_pipe::NamedPipeClient),
}

enum SessionState {
    Disconnected,
    Connecting,
    Connected(Transport),
}

pub struct PresenceClient {
    client_id: String,
    session: SessionState,
    backoff: Backoff,
    next_retry_at: Instant,
}

impl PresenceClient {
    pub fn new(client_id: String, backoff: Backoff) -> Self {
        Self {
            client_id,
            session: SessionState::Disconnected,
            backoff,
            next_retry_at: Instant::now(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.session {
            SessionState::Disconnected => SessionPhase::Disconnected,
            SessionState::Connecting => SessionPhase::Connecting,
            SessionState::Connected(_) => SessionPhase::Connected,
        }
    }

    /// Push an activity update, in place.
    pub async fn set_activity(&mut self, update: &PresenceUpdate) -> Result<(), PublishError> {
        self.ensure_connected().await?;
        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": build_activity(update)
            },
            "nonce": nonce()
        });
        self.send_payload(payload).await
    }

    /// Remove any published activity.
    pub async fn clear(&mut self) -> Result<(), PublishError> {
        self.ensure_connected().await?;
        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": serde_json::Value::Null
            },
            "nonce": nonce()
        });
        self.send_payload(payload).await
    }

    async fn ensure_connected(&mut self) -> Result<(), PublishError> {
        if matches!(self.session, SessionState::Connected(_)) {
            return Ok(());
        }
        let now = Instant::now();
        if now < self.next_retry_at {
            return Err(PublishError::Disconnected(
                "reconnect backoff active".to_string(),
            ));
        }

        self.session = SessionState::Connecting;

        if let Some(ipc) = try_connect_ipc(&self.client_id).await {
            self.session = SessionState::Connected(Transport::Ipc(ipc));
            self.backoff.reset();
            info!("presence session connected over ipc");
            return Ok(());
        }
        if let Some(ws) = try_connect_ws(&self.client_id).await {
            self.session = SessionState::Connected(Transport::Ws(ws));
            self.backoff.reset();
            info!("presence session connected over websocket");
            return Ok(());
        }

        self.session = SessionState::Disconnected;
        self.next_retry_at = Instant::now() + self.backoff.next_delay();
        Err(PublishError::Disconnected(
            "no local Discord RPC endpoint reachable".to_string(),
        ))
    }

    async fn send_payload(&mut self, payload: serde_json::Value) -> Result<(), PublishError> {
        let response = match self.roundtrip(payload).await {
            Ok(raw) => raw,
            Err(detail) => {
                self.drop_session();
                return Err(PublishError::Disconnected(detail));
            }
        };
        // A service-side rejection arrives on a healthy transport; the
        // session stays connected.
        check_rpc_response(&response)
    }

    async fn roundtrip(&mut self, payload: serde_json::Value) -> Result<Vec<u8>, String> {
        let transport = match &mut self.session {
            SessionState::Connected(transport) => transport,
            _ => return Err("not connected".to_string()),
        };

        match transport {
            Transport::Ipc(ipc) => {
                send_ipc_frame(ipc, OPCODE_FRAME, payload.to_string().as_bytes())
                    .await
                    .map_err(|err| err.to_string())?;
                let (_, raw) = recv_ipc_frame(ipc).await.map_err(|err| err.to_string())?;
                Ok(raw)
            }
            Transport::Ws(ws) => {
                ws.send(Message::Text(payload.to_string()))
                    .await
                    .map_err(|err| format!("websocket send failed: {err}"))?;
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => Ok(text.into_bytes()),
                    Some(Ok(Message::Binary(bin))) => Ok(bin),
                    Some(Ok(_)) => Ok(Vec::new()),
                    Some(Err(err)) => Err(format!("websocket receive failed: {err}")),
                    None => Err("websocket closed".to_string()),
                }
            }
        }
    }

    fn drop_session(&mut self) {
        self.session = SessionState::Disconnected;
        self.next_retry_at = Instant::now() + self.backoff.next_delay();
    }
}

async fn try_connect_ws(client_id: &str) -> Option<Ws> {
    for port in PORTS {
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/?v=1&client_id={client_id}")).ok()?;
        match connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                let handshake = json!({ "v": 1, "client_id": client_id });
                if ws.send(Message::Text(handshake.to_string())).await.is_err() {
                    continue;
                }
                if ws.next().await.is_some() {
                    debug!(port, "discord rpc websocket handshake ok");
                    return Some(ws);
                }
            }
            Err(err) => {
                debug!(port, error = %err, "discord rpc websocket connect failed");
            }
        }
    }
    None
}

async fn try_connect_ipc(client_id: &str) -> Option<IpcTransport> {
    for slot in IPC_SLOTS {
        match connect_ipc_slot(slot).await {
            Ok(mut ipc) => {
                let handshake = json!({"v": 1, "client_id": client_id}).to_string();
                if send_ipc_frame(&mut ipc, OPCODE_HANDSHAKE, handshake.as_bytes())
                    .await
                    .is_err()
                {
                    continue;
                }
                if recv_ipc_frame(&mut ipc).await.is_ok() {
                    debug!(slot, "discord ipc handshake ok");
                    return Some(ipc);
                }
            }
            Err(err) => {
                debug!(slot, error = %err, "discord ipc slot unavailable");
            }
        }
    }
    None
}

#[cfg(unix)]
async fn connect_ipc_slot(slot: u8) -> std::io::Result<IpcTransport> {
    use std::path::PathBuf;

    let mut paths: Vec<PathBuf> = Vec::new();
    if let Ok(tmpdir) = std::env::var("TMPDIR") {
        paths.push(PathBuf::from(tmpdir).join(format!("discord-ipc-{slot}")));
    }
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        paths.push(PathBuf::from(runtime_dir).join(format!("discord-ipc-{slot}")));
    }
    paths.push(PathBuf::from(format!("/tmp/discord-ipc-{slot}")));
    paths.push(PathBuf::from(format!("/private/tmp/discord-ipc-{slot}")));

    for path in paths {
        if let Ok(stream) = tokio::net::UnixStream::connect(&path).await {
            return Ok(IpcTransport::Unix(stream));
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "no unix discord ipc socket found",
    ))
}

#[cfg(windows)]
async fn connect_ipc_slot(slot: u8) -> std::io::Result<IpcTransport> {
    use tokio::net::windows::named_pipe::ClientOptions;
    let path = format!(r"\\?\pipe\discord-ipc-{}", slot);
    let pipe = ClientOptions::new().open(&path)?;
    Ok(IpcTransport::Pipe(pipe))
}

fn encode_frame(opcode: i32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&opcode.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

async fn send_ipc_frame(
    ipc: &mut IpcTransport,
    opcode: i32,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame = encode_frame(opcode, payload);
    match ipc {
        #[cfg(unix)]
        IpcTransport::Unix(stream) => {
            stream.write_all(&frame).await?;
            stream.flush().await?;
        }
        #[cfg(windows)]
        IpcTransport::Pipe(pipe) => {
            pipe.write_all(&frame).await?;
            pipe.flush().await?;
        }
    }
    Ok(())
}

async fn recv_ipc_frame(ipc: &mut IpcTransport) -> std::io::Result<(i32, Vec<u8>)> {
    let mut header = [0u8; 8];
    match ipc {
        #[cfg(unix)]
        IpcTransport::Unix(stream) => stream.read_exact(&mut header).await?,
        #[cfg(windows)]
        IpcTransport::Pipe(pipe) => pipe.read_exact(&mut header).await?,
    };

    let opcode = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if len < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "invalid discord ipc frame length",
        ));
    }

    let mut payload = vec![0u8; len as usize];
    match ipc {
        #[cfg(unix)]
        IpcTransport::Unix(stream) => stream.read_exact(&mut payload).await?,
        #[cfg(windows)]
        IpcTransport::Pipe(pipe) => pipe.read_exact(&mut payload).await?,
    };

    Ok((opcode, payload))
}

fn nonce() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{n:x}")
}

fn build_activity(update: &PresenceUpdate) -> serde_json::Value {
    let mut timestamps = serde_json::Map::new();
    if let Some(start) = update.start_timestamp {
        timestamps.insert("start".to_string(), json!(start));
    }
    if let Some(end) = update.end_timestamp {
        timestamps.insert("end".to_string(), json!(end));
    }

    let mut activity = serde_json::Map::new();
    activity.insert("type".to_string(), json!(update.activity_type));
    activity.insert("name".to_string(), json!(update.name));
    activity.insert("details".to_string(), json!(update.details));
    activity.insert("state".to_string(), json!(update.state));
    activity.insert(
        "timestamps".to_string(),
        serde_json::Value::Object(timestamps),
    );

    let mut assets = serde_json::Map::new();
    if let Some(v) = &update.large_image {
        assets.insert("large_image".to_string(), json!(v));
    }
    if let Some(v) = &update.large_text {
        assets.insert("large_text".to_string(), json!(v));
    }
    if let Some(v) = &update.small_image {
        assets.insert("small_image".to_string(), json!(v));
    }
    if let Some(v) = &update.small_text {
        assets.insert("small_text".to_string(), json!(v));
    }
    if !assets.is_empty() {
        activity.insert("assets".to_string(), serde_json::Value::Object(assets));
    }

    serde_json::Value::Object(activity)
}

fn check_rpc_response(raw: &[u8]) -> Result<(), PublishError> {
    let value: serde_json::Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(_) => return Ok(()),
    };

    if value
        .get("evt")
        .and_then(|v| v.as_str())
        .map(|evt| evt.eq_ignore_ascii_case("ERROR"))
        .unwrap_or(false)
    {
        let data = value.get("data");
        let code = data
            .and_then(|d| d.get("code"))
            .and_then(|c| c.as_i64())
            .unwrap_or_default();
        let message = data
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown rpc error")
            .to_string();
        return Err(PublishError::Rejected { code, message });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{build_activity, check_rpc_response, encode_frame, PublishError};
    use vlc_presence_engine::PresenceUpdate;

    fn update() -> PresenceUpdate {
        PresenceUpdate {
            activity_type: 2,
            name: "Listening".to_string(),
            details: "Money".to_string(),
            state: "by Pink Floyd".to_string(),
            start_timestamp: Some(1_000),
            end_timestamp: Some(1_382),
            large_image: Some("logo".to_string()),
            large_text: Some("VLC Media Player".to_string()),
            small_image: Some("playing".to_string()),
            small_text: Some("Playing".to_string()),
        }
    }

    #[test]
    fn activity_payload_carries_timestamps_and_assets() {
        let activity = build_activity(&update());

        assert_eq!(activity["type"], 2);
        assert_eq!(activity["timestamps"]["start"], 1_000);
        assert_eq!(activity["timestamps"]["end"], 1_382);
        assert_eq!(activity["assets"]["large_image"], "logo");
        assert_eq!(activity["assets"]["small_text"], "Playing");
    }

    #[test]
    fn paused_payload_has_empty_timestamps_and_no_missing_assets_key() {
        let mut paused = update();
        paused.start_timestamp = None;
        paused.end_timestamp = None;
        paused.large_image = None;
        paused.large_text = None;
        paused.small_image = None;
        paused.small_text = None;

        let activity = build_activity(&paused);
        assert!(activity["timestamps"].as_object().expect("object").is_empty());
        assert!(activity.get("assets").is_none());
    }

    #[test]
    fn frames_are_little_endian_with_length_prefix() {
        let frame = encode_frame(1, b"{}");
        assert_eq!(&frame[0..4], &1i32.to_le_bytes());
        assert_eq!(&frame[4..8], &2i32.to_le_bytes());
        assert_eq!(&frame[8..], b"{}");
    }

    #[test]
    fn error_events_map_to_rejected() {
        let raw = br#"{"evt": "ERROR", "data": {"code": 4000, "message": "invalid activity"}}"#;
        match check_rpc_response(raw) {
            Err(PublishError::Rejected { code, message }) => {
                assert_eq!(code, 4000);
                assert_eq!(message, "invalid activity");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn success_responses_pass_through() {
        assert!(check_rpc_response(br#"{"evt": null, "cmd": "SET_ACTIVITY"}"#).is_ok());
        assert!(check_rpc_response(b"not json").is_ok());
    }
}
