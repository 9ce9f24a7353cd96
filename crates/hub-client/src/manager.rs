//! Connection manager: owns the single live channel and the active identity.
//!
//! Every state change happens on the caller's task. Channel tasks only feed
//! [`ChannelEvent`]s into the manager's queue, and an event is acted on only
//! while its tag matches the current channel. Anything from a replaced
//! channel is dropped, which is what keeps a late frame for one identity out
//! of another identity's inbox.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelHandle, ChannelTag, EventSender, Transport};
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::error::{ClientError, FrameError, Result};
use crate::identity::{Identity, IdentityCatalog};
use crate::message::{Message, decode_binary_frame, decode_frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Lifecycle and inbound traffic of the current channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Opened { identity: String },
    Message { identity: String, message: Message },
    Closed { identity: String },
    Failed { identity: String, error: String },
}

impl Notification {
    pub fn identity(&self) -> &str {
        match self {
            Self::Opened { identity }
            | Self::Message { identity, .. }
            | Self::Closed { identity }
            | Self::Failed { identity, .. } => identity,
        }
    }
}

pub struct ConnectionManager {
    catalog: Arc<IdentityCatalog>,
    transport: Arc<dyn Transport>,
    active_identity: Option<String>,
    channel: Option<Box<dyn ChannelHandle>>,
    state: ConnectionState,
    generation: u64,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    diagnostics: DiagnosticLog,
}

impl ConnectionManager {
    pub fn new(
        catalog: Arc<IdentityCatalog>,
        transport: Arc<dyn Transport>,
        diagnostic_limit: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            catalog,
            transport,
            active_identity: None,
            channel: None,
            state: ConnectionState::Disconnected,
            generation: 0,
            events_tx,
            events_rx,
            diagnostics: DiagnosticLog::new(diagnostic_limit),
        }
    }

    pub fn catalog(&self) -> &Arc<IdentityCatalog> {
        &self.catalog
    }

    pub fn active_identity(&self) -> Option<&Identity> {
        self.active_identity
            .as_deref()
            .and_then(|id| self.catalog.get(id))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_tag(&self) -> Option<&ChannelTag> {
        self.channel.as_ref().map(|channel| channel.tag())
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.record(diagnostic);
    }

    /// Close whatever channel exists and open one for `id`.
    ///
    /// An unknown `id` fails without touching the current connection.
    pub fn switch_identity(&mut self, id: &str) -> Result<()> {
        if !self.catalog.contains(id) {
            return Err(ClientError::UnknownIdentity(id.to_string()));
        }
        self.teardown();
        info!(identity = id, "switching identity");
        self.active_identity = Some(id.to_string());
        self.open_for(id.to_string())
    }

    /// Replace the channel for the active identity, whatever state it is in.
    pub fn reconnect(&mut self) -> Result<()> {
        let identity = self
            .active_identity
            .clone()
            .ok_or(ClientError::NoActiveIdentity)?;
        self.teardown();
        info!(identity = %identity, "reconnecting");
        self.open_for(identity)
    }

    /// Close the channel. The active identity is kept for a later `reconnect`.
    pub fn close(&mut self) {
        if self.channel.is_none() && self.state == ConnectionState::Disconnected {
            return;
        }
        self.teardown();
        debug!("connection closed");
    }

    /// Send the opening announcement on the current channel.
    pub fn announce(&self, messages: &[Arc<Message>]) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }
        let channel = self.channel.as_ref().ok_or(ClientError::NotConnected)?;
        let identity = self
            .catalog
            .get(&channel.tag().identity)
            .ok_or_else(|| ClientError::UnknownIdentity(channel.tag().identity.clone()))?;
        let text = serde_json::to_string(&identity.announcement(messages))?;
        channel.send_text(text)?;
        debug!(channel = %channel.tag(), messages = messages.len(), "announced identity");
        Ok(())
    }

    /// Wait for the next event from the current channel.
    pub async fn next_event(&mut self) -> Option<Notification> {
        loop {
            let event = self.events_rx.recv().await?;
            if let Some(notification) = self.handle_event(event) {
                return Some(notification);
            }
        }
    }

    /// Like [`Self::next_event`] but returns `None` once the queue is empty.
    pub fn try_next_event(&mut self) -> Option<Notification> {
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(notification) = self.handle_event(event) {
                return Some(notification);
            }
        }
        None
    }

    fn open_for(&mut self, identity: String) -> Result<()> {
        self.generation += 1;
        let tag = ChannelTag::new(identity, self.generation);
        self.state = ConnectionState::Connecting;
        match self.transport.open(tag.clone(), self.events_tx.clone()) {
            Ok(channel) => {
                debug!(channel = %tag, "channel connecting");
                self.channel = Some(channel);
                Ok(())
            }
            Err(error) => {
                warn!(channel = %tag, "failed to open channel: {error}");
                self.state = ConnectionState::Errored;
                self.diagnostics.record(Diagnostic::ChannelFailed {
                    identity: tag.identity,
                    detail: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            debug!(channel = %channel.tag(), "closing channel");
            if let Err(error) = channel.close() {
                warn!(channel = %channel.tag(), "close failed: {error}");
                self.diagnostics.record(Diagnostic::CloseFailed {
                    identity: channel.tag().identity.clone(),
                    detail: error.to_string(),
                });
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    fn decoded(
        &mut self,
        tag: ChannelTag,
        result: std::result::Result<Message, FrameError>,
    ) -> Option<Notification> {
        match result {
            Ok(message) => Some(Notification::Message {
                identity: tag.identity,
                message,
            }),
            Err(error) => {
                warn!(channel = %tag, "dropping malformed frame: {error}");
                self.diagnostics.record(Diagnostic::MalformedFrame {
                    identity: tag.identity,
                    detail: error.to_string(),
                });
                None
            }
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) -> Option<Notification> {
        let is_current = self
            .channel
            .as_ref()
            .is_some_and(|channel| channel.tag() == event.tag());
        if !is_current {
            match &event {
                ChannelEvent::Frame(tag, _) | ChannelEvent::BinaryFrame(tag, _) => {
                    debug!(channel = %tag, "dropping frame from replaced channel");
                    self.diagnostics.record(Diagnostic::StaleFrame {
                        identity: tag.identity.clone(),
                        generation: tag.generation,
                    });
                }
                other => debug!(channel = %other.tag(), "ignoring event from replaced channel"),
            }
            return None;
        }

        match event {
            ChannelEvent::Opened(tag) => {
                info!(channel = %tag, "channel open");
                self.state = ConnectionState::Open;
                Some(Notification::Opened {
                    identity: tag.identity,
                })
            }
            ChannelEvent::Frame(tag, text) => self.decoded(tag, decode_frame(&text)),
            ChannelEvent::BinaryFrame(tag, bytes) => self.decoded(tag, decode_binary_frame(bytes)),
            ChannelEvent::Closed(tag) => {
                info!(channel = %tag, "channel closed by hub");
                self.channel = None;
                self.state = ConnectionState::Closed;
                Some(Notification::Closed {
                    identity: tag.identity,
                })
            }
            ChannelEvent::Failed(tag, error) => {
                warn!(channel = %tag, "channel failed: {error}");
                self.channel = None;
                self.state = ConnectionState::Errored;
                self.diagnostics.record(Diagnostic::ChannelFailed {
                    identity: tag.identity.clone(),
                    detail: error.clone(),
                });
                Some(Notification::Failed {
                    identity: tag.identity,
                    error,
                })
            }
        }
    }
}
