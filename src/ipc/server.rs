//! Unix domain socket server for status queries
//!
//! Answers request-response queries and pushes terminal events to
//! subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::TerminalEvent;

use super::protocol::{Notification, Request, Response, TerminalStatus};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Status server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    events: broadcast::Sender<TerminalEvent>,
}

/// Shared server state
struct ServerState {
    status: TerminalStatus,
    start_time: Instant,
}

/// What the per-client reader hands to the client loop
enum Incoming {
    Request(Request),
    Malformed(String),
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Server {
    /// Bind the socket. Events sent on `events` update the status and are
    /// pushed to subscribers.
    pub fn new(socket_path: &Path, events: broadcast::Sender<TerminalEvent>) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: TerminalStatus::default(),
            start_time: Instant::now(),
        }));

        info!(?socket_path, "status server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            events,
        })
    }

    /// Run the server, accepting connections and tracking status
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        let tracker = Self::track_status(self.events.subscribe(), Arc::clone(&self.state));
        tokio::pin!(tracker);
        let mut tracking = true;

        loop {
            tokio::select! {
                () = &mut tracker, if tracking => {
                    tracking = false;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        debug!("client connected");
                        let state = Arc::clone(&self.state);
                        let events = self.events.clone();
                        let mut shutdown_rx = self.shutdown_tx.subscribe();

                        tokio::spawn(async move {
                            tokio::select! {
                                result = Self::handle_client(stream, state, events) => {
                                    if let Err(e) = result {
                                        warn!(?e, "client handler error");
                                    }
                                }
                                _ = shutdown_rx.recv() => {
                                    debug!("client handler shutting down");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(?e, "accept error");
                    }
                },
            }
        }
    }

    /// Fold every terminal event into the status snapshot
    async fn track_status(
        mut events: broadcast::Receiver<TerminalEvent>,
        state: Arc<RwLock<ServerState>>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let mut state = state.write().await;
                    let previous = state.status.mode;
                    state.status.apply(&event);
                    if state.status.mode != previous {
                        debug!(from = %previous, to = %state.status.mode, "status mode updated");
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "status tracker lagged");
                }
                Err(RecvError::Closed) => {
                    debug!("event channel closed, status tracking stopped");
                    return;
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        events: broadcast::Sender<TerminalEvent>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Requests are read on their own task so a half-read message is
        // never lost when a notification goes out first.
        let (incoming_tx, mut incoming_rx) = mpsc::channel(8);
        let _reader = AbortOnDrop(tokio::spawn(async move {
            loop {
                let incoming = match read_message::<_, Request>(&mut reader).await {
                    Ok(Some(Ok(request))) => Incoming::Request(request),
                    Ok(Some(Err(e))) => Incoming::Malformed(e.to_string()),
                    Ok(None) => {
                        debug!("client disconnected");
                        return;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read from client");
                        return;
                    }
                };
                if incoming_tx.send(incoming).await.is_err() {
                    return;
                }
            }
        }));

        let mut notifications: Option<broadcast::Receiver<TerminalEvent>> = None;

        loop {
            tokio::select! {
                incoming = incoming_rx.recv() => {
                    let response = match incoming {
                        None => return Ok(()),
                        Some(Incoming::Malformed(message)) => {
                            warn!(%message, "malformed request");
                            Response::Error {
                                code: "bad_request".to_string(),
                                message,
                            }
                        }
                        Some(Incoming::Request(request)) => {
                            debug!(?request, "received request");
                            let (response, subscribe) =
                                Self::process_request(request, &state).await;
                            if subscribe && notifications.is_none() {
                                notifications = Some(events.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                    };
                    write_message(&mut writer, &response).await?;
                }
                event = next_event(&mut notifications) => match event {
                    Ok(event) => {
                        write_message(&mut writer, &Notification::Event { event }).await?;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(RecvError::Closed) => {
                        notifications = None;
                    }
                },
            }
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
    ) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("status server shutdown complete");
    }
}

/// Wait for the next event, or forever if not subscribed
async fn next_event(
    notifications: &mut Option<broadcast::Receiver<TerminalEvent>>,
) -> Result<TerminalEvent, RecvError> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed JSON message.
///
/// `Ok(None)` on a clean disconnect; the inner result carries parse errors
/// so the caller can answer them.
async fn read_message<R, T>(reader: &mut R) -> Result<Option<serde_json::Result<T>>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message of {len} bytes exceeds limit");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(serde_json::from_slice(&msg_buf)))
}

/// Send a length-prefixed JSON message
async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
