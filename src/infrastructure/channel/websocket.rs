//! Socket.IO push channel over a WebSocket
//!
//! One connection per channel instance, opened lazily. Opening completes
//! the Engine.IO and Socket.IO handshakes. A background task pumps frames
//! in both directions, answers heartbeats, fans inbound events out to the
//! attached listeners and reconnects with backoff until disposed.
//!
//! The service addresses results to the socket session that started the
//! job, so nothing is carried across a reconnect: queued frames are
//! discarded and `start_job` is refused until the channel is back online.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ChannelError, ListenerSet, ProgressChannel, Subscription};
use crate::domain::job::{ChannelEvent, JobInput};

use super::messages::{parse_packet, start_processing, Packet, CONNECT, PONG};
use super::reconnect::{reconnect_loop, ReconnectConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the open and namespace-connect exchange
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected Socket.IO session
pub(super) struct Session {
    stream: WsStream,
    /// Silence after which the server counts as gone
    pub(super) liveness: Duration,
}

/// Open a WebSocket to `url` and join the default namespace
pub(super) async fn open(url: &Url) -> Result<Session, ChannelError> {
    let connect_error = |message: String| ChannelError::Connect {
        url: url.to_string(),
        message,
    };

    let (mut stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| connect_error(e.to_string()))?;

    let liveness = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream))
        .await
        .map_err(|_| connect_error("Socket.IO handshake timed out".to_string()))?
        .map_err(connect_error)?;

    Ok(Session { stream, liveness })
}

async fn handshake(stream: &mut WsStream) -> Result<Duration, String> {
    let open = loop {
        match next_packet(stream).await? {
            Packet::Open(open) => break open,
            Packet::Ping => reply(stream, PONG).await?,
            other => tracing::debug!(packet = ?other, "Ignoring packet before open"),
        }
    };
    tracing::debug!(sid = %open.sid, liveness_ms = open.liveness().as_millis() as u64, "Engine.IO session open");

    reply(stream, CONNECT).await?;
    loop {
        match next_packet(stream).await? {
            Packet::Connected => return Ok(open.liveness()),
            Packet::ConnectError(reason) => return Err(format!("namespace refused: {}", reason)),
            Packet::Close | Packet::Disconnect => return Err("closed during handshake".to_string()),
            Packet::Ping => reply(stream, PONG).await?,
            other => tracing::debug!(packet = ?other, "Ignoring packet before namespace connect"),
        }
    }
}

async fn next_packet(stream: &mut WsStream) -> Result<Packet, String> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return parse_packet(&text).map_err(|e| e.to_string()),
            Some(Ok(Message::Close(_))) | None => return Err("connection closed".to_string()),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.to_string()),
        }
    }
}

async fn reply(stream: &mut WsStream, text: &str) -> Result<(), String> {
    stream
        .send(Message::Text(text.to_string()))
        .await
        .map_err(|e| e.to_string())
}

/// Add the Engine.IO query unless the configured URL already carries one
fn engine_io_url(mut url: Url) -> Url {
    if !url.query_pairs().any(|(key, _)| key == "EIO") {
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
    }
    url
}

struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    online: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Push channel speaking Socket.IO over a WebSocket
pub struct WsProgressChannel {
    url: Url,
    reconnect: ReconnectConfig,
    listeners: ListenerSet,
    cancel: CancellationToken,
    connection: Mutex<Option<Connection>>,
}

impl WsProgressChannel {
    /// Create a channel for the Socket.IO endpoint at `url`. Nothing is
    /// opened until first use.
    pub fn new(url: Url) -> Self {
        Self::with_reconnect(url, ReconnectConfig::default())
    }

    /// Create a channel with custom backoff parameters
    pub fn with_reconnect(url: Url, reconnect: ReconnectConfig) -> Self {
        Self {
            url: engine_io_url(url),
            reconnect,
            listeners: ListenerSet::new(),
            cancel: CancellationToken::new(),
            connection: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the connection if needed and return the outbound queue
    async fn outbound(&self) -> Result<mpsc::UnboundedSender<String>, ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Disposed);
        }

        let mut connection = self.connection.lock().await;
        if let Some(conn) = connection.as_ref() {
            if !conn.task.is_finished() {
                if !conn.online.load(Ordering::Acquire) {
                    return Err(ChannelError::Send("connection lost, reconnecting".to_string()));
                }
                return Ok(conn.outbound.clone());
            }
        }

        let session = open(&self.url).await?;
        tracing::info!(url = %self.url, "Progress channel connected");
        self.listeners.emit(&ChannelEvent::Connected);

        let (tx, rx) = mpsc::unbounded_channel();
        let online = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run(
            session,
            rx,
            Link {
                listeners: self.listeners.clone(),
                online: online.clone(),
                url: self.url.clone(),
                reconnect: self.reconnect.clone(),
                cancel: self.cancel.clone(),
            },
        ));
        *connection = Some(Connection {
            outbound: tx.clone(),
            online,
            task,
        });
        Ok(tx)
    }
}

#[async_trait]
impl ProgressChannel for WsProgressChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.outbound().await.map(|_| ())
    }

    async fn start_job(&self, input: &JobInput) -> Result<(), ChannelError> {
        let outbound = self.outbound().await?;
        outbound
            .send(start_processing(input.url()))
            .map_err(|_| ChannelError::Send("channel task stopped".to_string()))?;
        tracing::debug!(url = %input, "Queued start_processing");
        Ok(())
    }

    fn listen(&self) -> Subscription {
        self.listeners.subscribe()
    }

    async fn dispose(&self) {
        self.cancel.cancel();
        let connection = self.connection.lock().await.take();
        if let Some(conn) = connection {
            drop(conn.outbound);
            if let Err(e) = conn.task.await {
                tracing::warn!(error = %e, "Channel task ended abnormally");
            }
        }
        tracing::debug!(url = %self.url, "Progress channel disposed");
    }
}

/// State the background task shares with the channel handle
struct Link {
    listeners: ListenerSet,
    online: Arc<AtomicBool>,
    url: Url,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
}

/// Why a session stopped being driven
enum Stop {
    /// Disposed, or every sender is gone
    Shutdown,
    /// Transport dropped or the server ended the session
    Dropped,
}

/// What an inbound frame asks of the pump
enum Inbound {
    Handled,
    Ping,
    Closed,
}

async fn run(mut session: Session, mut outbound: mpsc::UnboundedReceiver<String>, link: Link) {
    loop {
        match drive(&mut session, &mut outbound, &link).await {
            Stop::Shutdown => {
                let _ = session.stream.close(None).await;
                return;
            }
            Stop::Dropped => {
                let _ = session.stream.close(None).await;
            }
        }

        link.online.store(false, Ordering::Release);
        tracing::warn!(url = %link.url, "Progress channel disconnected");
        link.listeners.emit(&ChannelEvent::Disconnected);

        session = match reconnect_loop(&link.url, &link.reconnect, &link.cancel).await {
            Some(next) => next,
            None => return,
        };

        // Frames queued for the old session are stale
        let mut discarded = 0usize;
        while outbound.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::warn!(discarded, "Dropped frames queued before the reconnect");
        }

        link.online.store(true, Ordering::Release);
        link.listeners.emit(&ChannelEvent::Connected);
    }
}

async fn drive(
    session: &mut Session,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    link: &Link,
) -> Stop {
    let silence = tokio::time::sleep(session.liveness);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            _ = link.cancel.cancelled() => return Stop::Shutdown,
            _ = &mut silence => {
                tracing::warn!(
                    liveness_ms = session.liveness.as_millis() as u64,
                    "No heartbeat from the service",
                );
                return Stop::Dropped;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = session.stream.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "Failed to send frame");
                        return Stop::Dropped;
                    }
                }
                None => return Stop::Shutdown,
            },
            message = session.stream.next() => {
                silence.as_mut().reset(Instant::now() + session.liveness);
                match message {
                    Some(Ok(Message::Text(text))) => match handle_text(&text, &link.listeners) {
                        Inbound::Handled => {}
                        Inbound::Ping => {
                            if let Err(e) = session.stream.send(Message::Text(PONG.to_string())).await {
                                tracing::warn!(error = %e, "Failed to answer heartbeat");
                                return Stop::Dropped;
                            }
                        }
                        Inbound::Closed => return Stop::Dropped,
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server closed progress channel");
                        return Stop::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Progress channel receive error");
                        return Stop::Dropped;
                    }
                    None => return Stop::Dropped,
                }
            }
        }
    }
}

fn handle_text(text: &str, listeners: &ListenerSet) -> Inbound {
    match parse_packet(text) {
        Ok(Packet::Event(message)) => {
            let event = message.into_event(Utc::now());
            tracing::trace!(event = event.kind(), "Received event");
            listeners.emit(&event);
            Inbound::Handled
        }
        Ok(Packet::Ping) => Inbound::Ping,
        Ok(Packet::Close) | Ok(Packet::Disconnect) => {
            tracing::info!("Service ended the Socket.IO session");
            Inbound::Closed
        }
        Ok(Packet::ConnectError(reason)) => {
            tracing::warn!(%reason, "Service refused the namespace");
            Inbound::Closed
        }
        Ok(other) => {
            tracing::trace!(packet = ?other, "Skipping packet");
            Inbound::Handled
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse packet");
            Inbound::Handled
        }
    }
}
