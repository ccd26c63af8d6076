//! Async TCP transport for the Power Pet Door protocol

use crate::codec::BlockDecoder;
use crate::message::{ConfigCommand, DoorCommand, Request, Response};
use crate::types::ProtocolError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

/// Default TCP port the door listens on
pub const DEFAULT_PORT: u16 = 3000;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection tuning knobs
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// How long a single connection attempt may take
    pub connect_timeout: Duration,
    /// Delay before retrying after a failed or lost connection
    pub reconnect: Duration,
    /// Idle time without outbound traffic before a keepalive PING
    pub keep_alive: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reconnect: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Events from the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// TCP connection established
    Connected,
    /// TCP connection lost; the transport will retry in the background
    Disconnected,
    /// A decoded message, solicited or not
    ///
    /// Solicited responses are delivered here as well as to the waiting
    /// request, so state listeners see every message the door sends.
    Message(Response),
}

/// Pending request waiting for its response
struct PendingRequest {
    response_tx: oneshot::Sender<Result<Response, ProtocolError>>,
}

/// Command to send to the connection task
enum WriteCommand {
    Send(Vec<u8>),
    Shutdown,
}

/// Why a connection session ended
enum SessionEnd {
    Lost,
    Shutdown,
}

/// Async transport for one Power Pet Door unit
///
/// The transport owns a background task that keeps the TCP connection
/// alive forever: it reconnects after failures, answers keepalive duty
/// with `PING`s, correlates responses to requests by message id and
/// broadcasts everything else to subscribers.
pub struct DoorTransport {
    /// Channel to the connection task
    write_tx: mpsc::Sender<WriteCommand>,
    /// Message id counter, shared with the keepalive sender
    msg_id: Arc<AtomicU64>,
    /// Pending requests awaiting responses
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    /// Event sender for connection state and messages
    event_tx: broadcast::Sender<TransportEvent>,
    /// Whether the socket is currently up
    connected: Arc<AtomicBool>,
}

impl DoorTransport {
    /// Start a transport for the door at `host:port`
    ///
    /// Returns immediately; the connection is established (and re-established
    /// after every failure) by a background task. Callers that need to know
    /// when the door is reachable should [`subscribe`](Self::subscribe).
    #[must_use]
    pub fn connect(host: impl Into<String>, port: u16, options: ConnectOptions) -> Self {
        let host = host.into();
        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, _) = broadcast::channel(64);
        let (write_tx, write_rx) = mpsc::channel(32);
        let msg_id = Arc::new(AtomicU64::new(1));
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::connection_task(
            host,
            port,
            options,
            write_rx,
            msg_id.clone(),
            pending.clone(),
            event_tx.clone(),
            connected.clone(),
        ));

        Self {
            write_tx,
            msg_id,
            pending,
            event_tx,
            connected,
        }
    }

    /// Whether the socket is currently up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to transport events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    /// Send a request and wait for its response
    pub async fn request(&self, request: Request) -> Result<Response, ProtocolError> {
        self.request_timeout(request, DEFAULT_TIMEOUT).await
    }

    /// Send a request with a custom timeout
    pub async fn request_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, ProtocolError> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }

        let msg_id = self.msg_id.fetch_add(1, Ordering::SeqCst);
        let data = request.encode(msg_id);

        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(msg_id, PendingRequest { response_tx });
        }

        tracing::debug!("TX > {}", String::from_utf8_lossy(&data));

        if self.write_tx.send(WriteCommand::Send(data)).await.is_err() {
            let mut pending = self.pending.lock().await;
            pending.remove(&msg_id);
            return Err(ProtocolError::NotConnected);
        }

        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::NotConnected),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&msg_id);
                Err(ProtocolError::Timeout)
            }
        }
    }

    /// Send a door movement command, verifying the door accepted it
    pub async fn command(&self, command: DoorCommand) -> Result<Response, ProtocolError> {
        let response = self.request(Request::Command(command)).await?;
        if response.success {
            Ok(response)
        } else {
            Err(ProtocolError::Rejected {
                command: command.as_str().to_string(),
            })
        }
    }

    /// Send a configuration command, verifying the door accepted it
    pub async fn config(&self, command: ConfigCommand) -> Result<Response, ProtocolError> {
        let response = self.request(Request::Config(command)).await?;
        if response.success {
            Ok(response)
        } else {
            Err(ProtocolError::Rejected {
                command: command.as_str().to_string(),
            })
        }
    }

    /// Connection task: connects, runs a session, reconnects on loss
    #[allow(clippy::too_many_arguments)]
    async fn connection_task(
        host: String,
        port: u16,
        options: ConnectOptions,
        mut write_rx: mpsc::Receiver<WriteCommand>,
        msg_id: Arc<AtomicU64>,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
        event_tx: broadcast::Sender<TransportEvent>,
        connected: Arc<AtomicBool>,
    ) {
        loop {
            tracing::info!("Connecting to Power Pet Door at {}:{}", host, port);
            let attempt = tokio::time::timeout(
                options.connect_timeout,
                TcpStream::connect((host.as_str(), port)),
            )
            .await;

            match attempt {
                Ok(Ok(stream)) => {
                    tracing::info!("Connected to Power Pet Door");
                    connected.store(true, Ordering::SeqCst);
                    let _ = event_tx.send(TransportEvent::Connected);

                    let end = Self::run_session(
                        stream,
                        &options,
                        &mut write_rx,
                        &msg_id,
                        &pending,
                        &event_tx,
                    )
                    .await;

                    connected.store(false, Ordering::SeqCst);
                    let _ = event_tx.send(TransportEvent::Disconnected);
                    Self::fail_pending(&pending).await;

                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost => {
                            tracing::error!(
                                "The door closed the connection. Reconnecting in {:?}...",
                                options.reconnect
                            );
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!("Unable to connect to the door ({}). Retrying...", e);
                }
                Err(_) => {
                    tracing::error!("Connection attempt timed out. Retrying...");
                }
            }

            // Wait out the reconnect delay, but still honor shutdown
            let sleep = tokio::time::sleep(options.reconnect);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => break,
                    cmd = write_rx.recv() => match cmd {
                        Some(WriteCommand::Send(_)) => {
                            tracing::warn!("Attempted to write without an active connection");
                        }
                        Some(WriteCommand::Shutdown) | None => return,
                    },
                }
            }
        }
    }

    /// Run one connected session until the socket drops or shutdown
    async fn run_session(
        stream: TcpStream,
        options: &ConnectOptions,
        write_rx: &mut mpsc::Receiver<WriteCommand>,
        msg_id: &AtomicU64,
        pending: &Arc<Mutex<HashMap<u64, PendingRequest>>>,
        event_tx: &broadcast::Sender<TransportEvent>,
    ) -> SessionEnd {
        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = BlockDecoder::new();
        let mut buffer = [0u8; 2048];
        let mut idle_deadline = tokio::time::Instant::now() + options.keep_alive;

        loop {
            tokio::select! {
                cmd = write_rx.recv() => match cmd {
                    Some(WriteCommand::Send(data)) => {
                        if let Err(e) = writer.write_all(&data).await {
                            tracing::error!("Failed to write to the door ({}). Reconnecting.", e);
                            return SessionEnd::Lost;
                        }
                        idle_deadline = tokio::time::Instant::now() + options.keep_alive;
                    }
                    Some(WriteCommand::Shutdown) | None => return SessionEnd::Shutdown,
                },
                read = reader.read(&mut buffer) => match read {
                    Ok(0) => {
                        tracing::warn!("Door closed the socket");
                        return SessionEnd::Lost;
                    }
                    Ok(n) => {
                        for block in decoder.feed(&buffer[..n]) {
                            Self::handle_block(&block, pending, event_tx).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Socket read error: {}", e);
                        return SessionEnd::Lost;
                    }
                },
                () = tokio::time::sleep_until(idle_deadline) => {
                    let ping = Request::Ping(unix_millis());
                    let data = ping.encode(msg_id.fetch_add(1, Ordering::SeqCst));
                    tracing::debug!("TX > {}", String::from_utf8_lossy(&data));
                    if let Err(e) = writer.write_all(&data).await {
                        tracing::error!("Failed to send keepalive ({}). Reconnecting.", e);
                        return SessionEnd::Lost;
                    }
                    idle_deadline = tokio::time::Instant::now() + options.keep_alive;
                },
            }
        }
    }

    /// Handle one framed block from the door
    async fn handle_block(
        block: &[u8],
        pending: &Arc<Mutex<HashMap<u64, PendingRequest>>>,
        event_tx: &broadcast::Sender<TransportEvent>,
    ) {
        tracing::debug!("RX < {}", String::from_utf8_lossy(block));

        let response = match Response::decode(block) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Received invalid message ({}). Skipping.", e);
                return;
            }
        };

        if !response.success {
            tracing::warn!("Door reported an error: {:?}", response.cmd);
        }

        // Complete the waiting request, if any
        if let Some(id) = response.msg_id {
            let mut pending_guard = pending.lock().await;
            if let Some(request) = pending_guard.remove(&id) {
                let _ = request.response_tx.send(Ok(response.clone()));
            }
        }

        // State listeners see every message, solicited or not
        let _ = event_tx.send(TransportEvent::Message(response));
    }

    /// Fail all in-flight requests after a disconnect
    async fn fail_pending(pending: &Arc<Mutex<HashMap<u64, PendingRequest>>>) {
        let mut pending_guard = pending.lock().await;
        for (_, request) in pending_guard.drain() {
            let _ = request.response_tx.send(Err(ProtocolError::NotConnected));
        }
    }
}

impl Drop for DoorTransport {
    fn drop(&mut self) {
        // Signal shutdown (best effort)
        let _ = self.write_tx.try_send(WriteCommand::Shutdown);
    }
}

/// Current Unix time in milliseconds, as the door expects in `PING`s
fn unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn wait_for_connect(transport: &DoorTransport) {
        let mut events = transport.subscribe();
        if transport.is_connected() {
            return;
        }
        loop {
            if let Ok(TransportEvent::Connected) = events.recv().await {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Fake door: echo the msgId back on a GET_SETTINGS reply
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let request: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(request["config"], "GET_SETTINGS");
            assert_eq!(request["dir"], "p2d");
            let reply = format!(
                r#"{{"success":"true","CMD":"GET_SETTINGS","msgID":{},"settings":{{"inside":"true","outside":"false"}}}}"#,
                request["msgId"]
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            // Keep the socket open until the client goes away
            let _ = socket.read(&mut buf).await;
        });

        let transport =
            DoorTransport::connect(addr.ip().to_string(), addr.port(), ConnectOptions::default());
        wait_for_connect(&transport).await;

        let response = transport.config(ConfigCommand::GetSettings).await.unwrap();
        assert!(response.success);
        let settings = response.settings.unwrap();
        assert_eq!(settings.inside, Some(true));
        assert_eq!(settings.outside, Some(false));
    }

    #[tokio::test]
    async fn test_unsolicited_message_broadcast() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(br#"{"success":"true","CMD":"DOOR_STATUS","door_status":"DOOR_RISING"}"#)
                .await
                .unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
        });

        let transport =
            DoorTransport::connect(addr.ip().to_string(), addr.port(), ConnectOptions::default());
        let mut events = transport.subscribe();

        loop {
            match events.recv().await.unwrap() {
                TransportEvent::Message(response) => {
                    assert_eq!(response.door_status, Some(crate::types::DoorStatus::Rising));
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let request: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            let reply = format!(
                r#"{{"success":"false","CMD":"OPEN","msgID":{}}}"#,
                request["msgId"]
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.read(&mut buf).await;
        });

        let transport =
            DoorTransport::connect(addr.ip().to_string(), addr.port(), ConnectOptions::default());
        wait_for_connect(&transport).await;

        let err = transport.command(DoorCommand::Open).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected { command } if command == "OPEN"));
    }

    #[tokio::test]
    async fn test_request_while_disconnected() {
        // Nothing is listening on this address yet
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = DoorTransport::connect(
            addr.ip().to_string(),
            addr.port(),
            ConnectOptions {
                connect_timeout: Duration::from_millis(100),
                reconnect: Duration::from_secs(60),
                keep_alive: Duration::from_secs(60),
            },
        );

        let err = transport
            .request(Request::Config(ConfigCommand::GetSettings))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
    }
}
