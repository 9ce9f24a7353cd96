//! Multi-identity client for a websocket notification hub.
//!
//! One [`Session`] acts as one identity at a time over a single channel,
//! and keeps a separate inbox for every identity in its catalog:
//! - [`ConnectionManager`] switches identity, reconnects and closes
//! - [`InboxStore`] holds each identity's received messages in arrival order
//! - [`HubApiClient`] posts outbound messages over HTTP

pub mod api;
pub mod channel;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod inbox;
pub mod manager;
pub mod message;
pub mod session;

#[cfg(test)]
mod testing;

pub use api::{ApiError, Draft, HubApiClient};
pub use channel::{ChannelEvent, ChannelHandle, ChannelTag, Transport, WebSocketTransport};
pub use config::{ConfigError, HubConfig};
pub use diagnostics::{Diagnostic, DiagnosticEntry, DiagnosticLog};
pub use error::{ClientError, FrameError, Result};
pub use identity::{HmacSha256Tokenizer, Identity, IdentityCatalog, TokenError, Tokenizer};
pub use inbox::InboxStore;
pub use manager::{ConnectionManager, ConnectionState, Notification};
pub use message::{GroupKey, Message, MessageGroup, decode_frame};
pub use session::Session;
