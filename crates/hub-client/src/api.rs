//! HTTP side-channel for posting messages through the hub.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::message::GroupKey;

pub const MESSAGE_PATH: &str = "/message";

/// Outbound message being composed. `recipient: None` is a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    pub group: GroupKey,
    pub recipient: Option<String>,
}

impl Draft {
    pub fn new(group: GroupKey, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            group,
            recipient: None,
        }
    }

    #[must_use]
    pub fn addressed_to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}

#[derive(Debug, Serialize)]
struct MessagePost<'a> {
    data: &'a str,
    topic: GroupKey,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("hub_api_base_url_missing")]
    BaseUrlMissing,
    #[error("hub_api_invalid_path")]
    InvalidPath,
    #[error("hub_request_failed:{message}")]
    Request { message: String },
    #[error("hub_read_failed:{message}")]
    Read { message: String },
    #[error("hub_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
}

#[derive(Debug, Clone)]
pub struct HubApiClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HubApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeout,
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    /// `POST /message[?to=recipient]` with `{"data", "topic"}`.
    pub async fn post_message(&self, draft: &Draft) -> Result<(), ApiError> {
        let url = self.endpoint(MESSAGE_PATH).ok_or(ApiError::InvalidPath)?;
        let mut request = self
            .http
            .post(url.as_str())
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout)
            .json(&MessagePost {
                data: &draft.body,
                topic: draft.group,
            });
        if let Some(recipient) = draft.recipient.as_deref() {
            request = request.query(&[("to", recipient)]);
        }

        let response = request.send().await.map_err(|error| ApiError::Request {
            message: error.to_string(),
        })?;
        let status = response.status();
        if status.is_success() {
            debug!(
                recipient = draft.recipient.as_deref().unwrap_or("*"),
                group = %draft.group,
                "message posted"
            );
            return Ok(());
        }

        let body = response.bytes().await.map_err(|error| ApiError::Read {
            message: error.to_string(),
        })?;
        Err(format_http_error(status, &body))
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiError {
    let body = String::from_utf8_lossy(body).trim().to_string();
    let body = if body.is_empty() {
        "<empty>".to_string()
    } else {
        body
    };
    ApiError::Http { status, body }
}

fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
