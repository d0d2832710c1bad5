//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Collaborators (the capture backend, a hotkey daemon, the `reprocess` and
//! `watch` subcommands) talk to the running companion with length-prefixed
//! JSON over a Unix domain socket. A listener thread accepts clients and
//! forwards their requests to the main loop; the main loop owns the write
//! halves and broadcasts events.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_DIR, SOCKET_FILE};

mod messages;
pub use messages::{CompanionRequest, CompanionResponse};

/// Writes to a stalled client give up after this long
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

pub type ClientId = u64;

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(SOCKET_DIR).join(SOCKET_FILE));
    }

    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(SOCKET_DIR).join(SOCKET_FILE))
}

/// Client connection to a running companion
pub struct CompanionClient {
    stream: UnixStream,
}

impl CompanionClient {
    /// Connect to specific socket path
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to companion at {}", path.display()))?;
        Ok(Self { stream })
    }

    pub fn send_request(&mut self, req: &CompanionRequest) -> Result<()> {
        write_message(&mut self.stream, req)
    }

    /// Receive the next event or reply (blocking)
    pub fn recv_response(&mut self) -> Result<CompanionResponse> {
        read_message(&mut self.stream)
    }
}

/// What the listener thread tells the main loop
#[derive(Debug)]
pub enum ListenerMessage {
    /// A client connected; this is its write half
    Connected(ClientId, UnixStream),
    Request(ClientId, CompanionRequest),
    Disconnected(ClientId),
}

/// Server listener owned by the companion process
pub struct CompanionServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl CompanionServer {
    /// Create server and bind to specific socket path
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        // Set permissions to 0700 (owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        info!(path = %socket_path.display(), "IPC socket listening");
        Ok(Self {
            listener,
            socket_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept clients on a background thread. Each client gets a reader
    /// thread that forwards its requests to `sender`.
    pub fn spawn_listener(&self, sender: Sender<ListenerMessage>) -> Result<thread::JoinHandle<()>> {
        let listener = self
            .listener
            .try_clone()
            .context("Failed to clone IPC listener")?;

        Ok(thread::spawn(move || {
            let mut next_id: ClientId = 0;
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept IPC connection");
                        continue;
                    }
                };
                next_id += 1;
                match register_client(next_id, stream, &sender) {
                    Ok(true) => {}
                    // Main loop is gone
                    Ok(false) => break,
                    Err(e) => error!(client = next_id, error = %e, "Failed to set up IPC client"),
                }
            }
        }))
    }
}

impl Drop for CompanionServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Hand the write half to the main loop and start a reader thread.
/// Returns `false` once the main loop has stopped receiving.
fn register_client(id: ClientId, stream: UnixStream, sender: &Sender<ListenerMessage>) -> Result<bool> {
    let writer = stream.try_clone().context("Failed to clone client stream")?;
    writer
        .set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))
        .context("Failed to set client write timeout")?;
    if sender.send(ListenerMessage::Connected(id, writer)).is_err() {
        return Ok(false);
    }

    let sender = sender.clone();
    thread::spawn(move || {
        let mut stream = stream;
        debug!(client = id, "IPC client connected");
        loop {
            match read_message::<CompanionRequest>(&mut stream) {
                Ok(request) => {
                    if sender.send(ListenerMessage::Request(id, request)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(client = id, error = %e, "IPC client closed");
                    let _ = sender.send(ListenerMessage::Disconnected(id));
                    break;
                }
            }
        }
    });
    Ok(true)
}

/// Write halves of every connected client, owned by the main loop
#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, UnixStream>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ClientId, stream: UnixStream) {
        self.clients.insert(id, stream);
    }

    pub fn remove(&mut self, id: ClientId) {
        self.clients.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Reply to one client; a broken client is dropped
    pub fn send_to(&mut self, id: ClientId, msg: &CompanionResponse) {
        let failed = match self.clients.get_mut(&id) {
            Some(stream) => write_message(stream, msg).is_err(),
            None => false,
        };
        if failed {
            debug!(client = id, "Dropping unreachable IPC client");
            self.clients.remove(&id);
        }
    }

    /// Send to every client, silently dropping the ones that fail
    pub fn broadcast(&mut self, msg: &CompanionResponse) {
        self.clients.retain(|id, stream| match write_message(stream, msg) {
            Ok(()) => true,
            Err(e) => {
                debug!(client = *id, error = %e, "Dropping unreachable IPC client");
                false
            }
        });
    }
}

/// Write length-prefixed message to stream
fn write_message<T: Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;
    stream
        .write_all(&json)
        .context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{HookEdge, HookSummary};
    use std::sync::mpsc;

    #[test]
    fn test_message_framing() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let request = CompanionRequest::ShowStatus {
            text: "Reading...".to_string(),
            duration_ms: 1500,
        };
        write_message(&mut a, &request).unwrap();
        let received: CompanionRequest = read_message(&mut b).unwrap();
        assert_eq!(received, request);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let len = (MAX_MESSAGE_SIZE as u32) + 1;
        a.write_all(&len.to_le_bytes()).unwrap();
        let result: Result<CompanionRequest> = read_message(&mut b);
        assert!(result.is_err());
    }

    #[test]
    fn test_broadcast_drops_closed_clients() {
        let mut registry = ClientRegistry::new();
        let (alive, mut alive_peer) = UnixStream::pair().unwrap();
        let (dead, dead_peer) = UnixStream::pair().unwrap();
        drop(dead_peer);
        registry.insert(1, alive);
        registry.insert(2, dead);

        let event = CompanionResponse::HookChanged(HookSummary {
            hooked: true,
            edge: Some(HookEdge::Top),
            window: Some(42),
            has_roi: false,
        });
        registry.broadcast(&event);
        // The first write to a closed peer may still succeed; the second can't
        registry.broadcast(&event);

        assert_eq!(registry.len(), 1);
        let received: CompanionResponse = read_message(&mut alive_peer).unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn test_server_forwards_requests() {
        let dir = std::env::temp_dir().join(format!("edgehook-ipc-{}", std::process::id()));
        let path = dir.join(SOCKET_FILE);
        let server = CompanionServer::bind_to(path.clone()).unwrap();
        let (tx, rx) = mpsc::channel();
        let _handle = server.spawn_listener(tx).unwrap();

        let mut client = CompanionClient::connect_to(&path).unwrap();
        client.send_request(&CompanionRequest::Ping).unwrap();

        let mut got_request = false;
        for _ in 0..3 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                ListenerMessage::Request(_, CompanionRequest::Ping) => {
                    got_request = true;
                    break;
                }
                _ => continue,
            }
        }
        assert!(got_request);

        drop(server);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
