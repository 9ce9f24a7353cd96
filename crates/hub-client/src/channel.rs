//! Hub channels: one websocket per identity activation.
//!
//! A channel never touches session state. Its background task only reports
//! [`ChannelEvent`]s, each stamped with the [`ChannelTag`] the channel was
//! opened under, to the owner's event queue.

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite, tungstenite::Message as WsMessage,
};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Identity a channel belongs to, plus the activation counter it was opened
/// under. Two channels for the same identity never share a generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTag {
    pub identity: String,
    pub generation: u64,
}

impl ChannelTag {
    pub fn new(identity: impl Into<String>, generation: u64) -> Self {
        Self {
            identity: identity.into(),
            generation,
        }
    }
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.identity, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened(ChannelTag),
    Frame(ChannelTag, String),
    /// Raw binary payload; decoded by the owner.
    BinaryFrame(ChannelTag, Vec<u8>),
    Closed(ChannelTag),
    Failed(ChannelTag, String),
}

impl ChannelEvent {
    pub fn tag(&self) -> &ChannelTag {
        match self {
            Self::Opened(tag)
            | Self::Frame(tag, _)
            | Self::BinaryFrame(tag, _)
            | Self::Closed(tag)
            | Self::Failed(tag, _) => tag,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Owner's side of an open channel.
pub trait ChannelHandle: Send {
    fn tag(&self) -> &ChannelTag;

    /// Queue a text frame. Frames queued before the handshake completes are
    /// flushed once it does.
    fn send_text(&self, text: String) -> Result<()>;

    /// Request closure. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Opens channels to the hub.
pub trait Transport: Send + Sync {
    fn open(&self, tag: ChannelTag, events: EventSender) -> Result<Box<dyn ChannelHandle>>;
}

/// Transport over `ws://` or `wss://`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Option<Duration>,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> Result<Self> {
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }
        Ok(Self {
            url: parsed_url,
            connect_timeout: None,
        })
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, tag: ChannelTag, events: EventSender) -> Result<Box<dyn ChannelHandle>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|error| ClientError::Internal(format!("no async runtime: {error}")))?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        debug!(channel = %tag, url = %self.url, "opening channel");
        runtime.spawn(run_channel(
            self.url.to_string(),
            self.connect_timeout,
            tag.clone(),
            events,
            commands_rx,
        ));

        Ok(Box::new(WebSocketChannel {
            tag,
            commands: commands_tx,
            closed: false,
        }))
    }
}

#[derive(Debug)]
enum ChannelCommand {
    Send(String),
    Close,
}

struct WebSocketChannel {
    tag: ChannelTag,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    closed: bool,
}

impl ChannelHandle for WebSocketChannel {
    fn tag(&self) -> &ChannelTag {
        &self.tag
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.closed {
            return Err(ClientError::NotConnected);
        }
        self.commands
            .send(ChannelCommand::Send(text))
            .map_err(|_| ClientError::NotConnected)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // A stopped task has nothing left to close.
        if self.commands.send(ChannelCommand::Close).is_err() {
            debug!(channel = %self.tag, "channel task already stopped");
        }
        Ok(())
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.commands.send(ChannelCommand::Close);
        }
    }
}

async fn connect_stream(url: String, connect_timeout: Option<Duration>) -> Result<WsStream> {
    let connect = connect_async(url);
    let result = match connect_timeout {
        Some(limit) => timeout(limit, connect).await.map_err(|_| {
            ClientError::Timeout(format!("connection timeout after {limit:?}"))
        })?,
        None => connect.await,
    };
    let (stream, _response) = result.map_err(|error| match error {
        tungstenite::Error::Io(io) => ClientError::Connection(io.to_string()),
        other => ClientError::WebSocket(other.to_string()),
    })?;
    Ok(stream)
}

async fn run_channel(
    url: String,
    connect_timeout: Option<Duration>,
    tag: ChannelTag,
    events: EventSender,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
) {
    let mut pending = Vec::new();
    let connect = connect_stream(url, connect_timeout);
    tokio::pin!(connect);

    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(stream) => break stream,
                Err(error) => {
                    warn!(channel = %tag, "connect failed: {error}");
                    let _ = events.send(ChannelEvent::Failed(tag, error.to_string()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(ChannelCommand::Send(text)) => pending.push(text),
                Some(ChannelCommand::Close) | None => {
                    debug!(channel = %tag, "closed before handshake completed");
                    let _ = events.send(ChannelEvent::Closed(tag));
                    return;
                }
            },
        }
    };

    let (mut writer, mut reader) = stream.split();
    if events.send(ChannelEvent::Opened(tag.clone())).is_err() {
        return;
    }
    for text in pending {
        if let Err(error) = writer.send(WsMessage::Text(text)).await {
            warn!(channel = %tag, "websocket write error: {error}");
            let _ = events.send(ChannelEvent::Failed(tag, error.to_string()));
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ChannelCommand::Send(text)) => {
                    if let Err(error) = writer.send(WsMessage::Text(text)).await {
                        warn!(channel = %tag, "websocket write error: {error}");
                        let _ = events.send(ChannelEvent::Failed(tag, error.to_string()));
                        return;
                    }
                }
                Some(ChannelCommand::Close) | None => {
                    if let Err(error) = writer.send(WsMessage::Close(None)).await {
                        debug!(channel = %tag, "close frame not delivered: {error}");
                    }
                    let _ = events.send(ChannelEvent::Closed(tag));
                    return;
                }
            },
            frame = reader.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if events.send(ChannelEvent::Frame(tag.clone(), text)).is_err() {
                        return;
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    if events.send(ChannelEvent::BinaryFrame(tag.clone(), bytes)).is_err() {
                        return;
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    debug!(channel = %tag, "received ping ({} bytes)", payload.len());
                }
                Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!(channel = %tag, "remote closed channel");
                    let _ = events.send(ChannelEvent::Closed(tag));
                    return;
                }
                Some(Err(error)) => {
                    warn!(channel = %tag, "websocket read error: {error}");
                    let _ = events.send(ChannelEvent::Failed(tag, error.to_string()));
                    return;
                }
            },
        }
    }
}
