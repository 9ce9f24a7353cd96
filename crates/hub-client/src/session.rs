//! A running client: connection manager, inboxes and the outbound API.

use std::sync::Arc;

use tracing::warn;

use crate::api::{Draft, HubApiClient};
use crate::channel::{Transport, WebSocketTransport};
use crate::config::HubConfig;
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::error::{ClientError, Result};
use crate::identity::{Identity, IdentityCatalog};
use crate::inbox::InboxStore;
use crate::manager::{ConnectionManager, ConnectionState, Notification};
use crate::message::Message;

pub struct Session {
    manager: ConnectionManager,
    inbox: InboxStore,
    api: Option<HubApiClient>,
}

impl Session {
    pub fn new(
        catalog: Arc<IdentityCatalog>,
        transport: Arc<dyn Transport>,
        diagnostic_limit: usize,
    ) -> Self {
        let inbox = InboxStore::new(&catalog);
        Self {
            manager: ConnectionManager::new(catalog, transport, diagnostic_limit),
            inbox,
            api: None,
        }
    }

    /// Websocket transport and HTTP client built from `config`.
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        let transport = WebSocketTransport::new(&config.endpoint)?
            .with_connect_timeout(config.connect_timeout);
        let api = HubApiClient::new(&config.api_base_url, config.request_timeout)?;
        Ok(Self::new(
            Arc::clone(&config.catalog),
            Arc::new(transport),
            config.diagnostic_limit,
        )
        .with_api(api))
    }

    #[must_use]
    pub fn with_api(mut self, api: HubApiClient) -> Self {
        self.api = Some(api);
        self
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn catalog(&self) -> &IdentityCatalog {
        self.manager.catalog()
    }

    pub fn active_identity(&self) -> Option<&Identity> {
        self.manager.active_identity()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        self.manager.diagnostics()
    }

    pub fn inbox_of(&self, identity: &str) -> &[Arc<Message>] {
        self.inbox.inbox_of(identity)
    }

    /// Inbox of the active identity; empty before the first switch.
    pub fn active_inbox(&self) -> &[Arc<Message>] {
        match self.manager.active_identity() {
            Some(identity) => self.inbox.inbox_of(&identity.id),
            None => &[],
        }
    }

    pub fn switch_identity(&mut self, id: &str) -> Result<()> {
        self.manager.switch_identity(id)
    }

    pub fn reconnect(&mut self) -> Result<()> {
        self.manager.reconnect()
    }

    pub fn close(&mut self) {
        self.manager.close();
    }

    /// Wait for the next notification and apply it to the inboxes.
    pub async fn next_event(&mut self) -> Option<Notification> {
        let notification = self.manager.next_event().await?;
        self.apply(&notification);
        Some(notification)
    }

    /// Apply every notification already queued, without waiting.
    pub fn drain_pending(&mut self) -> Vec<Notification> {
        let mut applied = Vec::new();
        while let Some(notification) = self.manager.try_next_event() {
            self.apply(&notification);
            applied.push(notification);
        }
        applied
    }

    fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::Opened { identity } => {
                let messages = self.inbox.inbox_of(identity);
                if let Err(error) = self.manager.announce(messages) {
                    warn!(identity = %identity, "announcement failed: {error}");
                    self.manager.record_diagnostic(Diagnostic::AnnounceFailed {
                        identity: identity.clone(),
                        detail: error.to_string(),
                    });
                }
            }
            Notification::Message { identity, message } => {
                if let Err(error) = self.inbox.append(identity, message.clone()) {
                    warn!(identity = %identity, "dropping message: {error}");
                }
            }
            Notification::Closed { .. } | Notification::Failed { .. } => {}
        }
    }

    /// Remove this exact entry from the active inbox.
    pub fn dismiss(&mut self, message: &Arc<Message>) -> bool {
        let Some(identity) = self.manager.active_identity() else {
            return false;
        };
        self.inbox.remove(&identity.id, message)
    }

    pub fn dismiss_at(&mut self, index: usize) -> Option<Arc<Message>> {
        let identity = self.manager.active_identity()?;
        self.inbox.remove_at(&identity.id, index)
    }

    /// Post `draft` through the hub. The body is cleared only on success.
    pub async fn send_draft(&mut self, draft: &mut Draft) -> Result<()> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| ClientError::InvalidRequest("no hub API configured".to_string()))?;
        match api.post_message(draft).await {
            Ok(()) => {
                draft.body.clear();
                Ok(())
            }
            Err(error) => {
                warn!(
                    recipient = draft.recipient.as_deref().unwrap_or("*"),
                    "send failed: {error}"
                );
                self.manager.record_diagnostic(Diagnostic::SendFailed {
                    recipient: draft.recipient.clone(),
                    detail: error.to_string(),
                });
                Err(error.into())
            }
        }
    }
}
