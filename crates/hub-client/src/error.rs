//! Client error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("no active identity")]
    NoActiveIdentity,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("send failed: {0}")]
    Api(#[from] ApiError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Reasons an inbound frame could not become a message.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(serde_json::Error),

    #[error("binary frame is not UTF-8: {0}")]
    InvalidUtf8(std::string::FromUtf8Error),
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;
