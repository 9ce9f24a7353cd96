//! Test doubles: an in-memory transport and a recording message API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::channel::{ChannelEvent, ChannelHandle, ChannelTag, EventSender, Transport};
use crate::error::{ClientError, Result};

/// One channel opened through [`MemoryTransport`]. Tests drive it by
/// emitting events as if the remote end had produced them.
pub(crate) struct MemoryChannelState {
    pub(crate) tag: ChannelTag,
    events: EventSender,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemoryChannelState {
    pub(crate) fn open(&self) {
        let _ = self.events.send(ChannelEvent::Opened(self.tag.clone()));
    }

    pub(crate) fn frame(&self, text: &str) {
        let _ = self
            .events
            .send(ChannelEvent::Frame(self.tag.clone(), text.to_string()));
    }

    pub(crate) fn binary_frame(&self, bytes: &[u8]) {
        let _ = self
            .events
            .send(ChannelEvent::BinaryFrame(self.tag.clone(), bytes.to_vec()));
    }

    pub(crate) fn remote_close(&self) {
        let _ = self.events.send(ChannelEvent::Closed(self.tag.clone()));
    }

    pub(crate) fn fail(&self, detail: &str) {
        let _ = self
            .events
            .send(ChannelEvent::Failed(self.tag.clone(), detail.to_string()));
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MemoryTransportState {
    channels: Vec<Arc<MemoryChannelState>>,
    fail_next_open: Option<String>,
    fail_close: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryTransport {
    state: Arc<Mutex<MemoryTransportState>>,
}

impl MemoryTransport {
    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryTransportState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn channel(&self, index: usize) -> Option<Arc<MemoryChannelState>> {
        self.with_state(|state| state.channels.get(index).cloned())
    }

    pub(crate) fn last_channel(&self) -> Option<Arc<MemoryChannelState>> {
        self.with_state(|state| state.channels.last().cloned())
    }

    pub(crate) fn opened_count(&self) -> usize {
        self.with_state(|state| state.channels.len())
    }

    /// Channels opened and not yet closed by their owner.
    pub(crate) fn live_count(&self) -> usize {
        self.with_state(|state| {
            state
                .channels
                .iter()
                .filter(|channel| !channel.is_closed())
                .count()
        })
    }

    pub(crate) fn fail_next_open(&self, detail: &str) {
        self.with_state(|state| state.fail_next_open = Some(detail.to_string()));
    }

    pub(crate) fn fail_close(&self, fail: bool) {
        self.with_state(|state| state.fail_close = fail);
    }
}

impl Transport for MemoryTransport {
    fn open(&self, tag: ChannelTag, events: EventSender) -> Result<Box<dyn ChannelHandle>> {
        self.with_state(|state| {
            if let Some(detail) = state.fail_next_open.take() {
                return Err(ClientError::Connection(detail));
            }
            let channel = Arc::new(MemoryChannelState {
                tag,
                events,
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            });
            state.channels.push(Arc::clone(&channel));
            Ok(Box::new(MemoryChannel {
                state: channel,
                transport: self.clone(),
            }) as Box<dyn ChannelHandle>)
        })
    }
}

struct MemoryChannel {
    state: Arc<MemoryChannelState>,
    transport: MemoryTransport,
}

impl ChannelHandle for MemoryChannel {
    fn tag(&self) -> &ChannelTag {
        &self.state.tag
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.state.is_closed() {
            return Err(ClientError::NotConnected);
        }
        self.state
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        if self.transport.with_state(|state| state.fail_close) {
            return Err(ClientError::WebSocket("close frame rejected".to_string()));
        }
        Ok(())
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedPost {
    pub(crate) to: Option<String>,
    pub(crate) body: Value,
}

#[derive(Clone)]
struct MessageApiState {
    posts: Arc<Mutex<Vec<RecordedPost>>>,
    status: StatusCode,
}

pub(crate) struct MessageApi {
    pub(crate) base_url: String,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
}

impl MessageApi {
    pub(crate) fn posts(&self) -> Vec<RecordedPost> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn record_post(
    State(api): State<MessageApiState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    api.posts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(RecordedPost {
            to: query.get("to").cloned(),
            body,
        });
    if api.status.is_success() {
        (api.status, "ok")
    } else {
        (api.status, "hub unavailable")
    }
}

/// Loopback `POST /message` endpoint answering every request with `status`.
pub(crate) async fn spawn_message_api(status: StatusCode) -> anyhow::Result<MessageApi> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let posts = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/message", post(record_post))
        .with_state(MessageApiState {
            posts: Arc::clone(&posts),
            status,
        });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(MessageApi {
        base_url: format!("http://{addr}"),
        posts,
    })
}
