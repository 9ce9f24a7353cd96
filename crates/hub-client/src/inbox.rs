//! Per-identity inboxes.
//!
//! Entries are `Arc<Message>` handles. `remove` matches by handle
//! (`Arc::ptr_eq`), never by content, so equal messages stay distinguishable
//! by position. Inboxes grow without bound for the life of the session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ClientError, Result};
use crate::identity::IdentityCatalog;
use crate::message::Message;

pub struct InboxStore {
    inboxes: HashMap<String, Vec<Arc<Message>>>,
}

impl InboxStore {
    /// One empty inbox per catalog identity.
    pub fn new(catalog: &IdentityCatalog) -> Self {
        Self {
            inboxes: catalog
                .ids()
                .map(|id| (id.to_string(), Vec::new()))
                .collect(),
        }
    }

    /// Append at the tail and return the stored handle.
    pub fn append(&mut self, identity: &str, message: Message) -> Result<Arc<Message>> {
        let inbox = self
            .inboxes
            .get_mut(identity)
            .ok_or_else(|| ClientError::UnknownIdentity(identity.to_string()))?;
        let handle = Arc::new(message);
        inbox.push(Arc::clone(&handle));
        debug!(identity, len = inbox.len(), "appended message");
        Ok(handle)
    }

    /// Remove the first entry that is this exact handle. Returns whether
    /// anything was removed; a missing entry is not an error.
    pub fn remove(&mut self, identity: &str, message: &Arc<Message>) -> bool {
        let Some(inbox) = self.inboxes.get_mut(identity) else {
            return false;
        };
        match inbox.iter().position(|entry| Arc::ptr_eq(entry, message)) {
            Some(index) => {
                inbox.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, identity: &str, index: usize) -> Option<Arc<Message>> {
        let inbox = self.inboxes.get_mut(identity)?;
        (index < inbox.len()).then(|| inbox.remove(index))
    }

    /// Ordered inbox for `identity`; empty for unknown identities.
    pub fn inbox_of(&self, identity: &str) -> &[Arc<Message>] {
        self.inboxes.get(identity).map_or(&[], Vec::as_slice)
    }

    pub fn total(&self) -> usize {
        self.inboxes.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::GroupKey;
    use quickcheck::{QuickCheck, TestResult};

    fn store() -> InboxStore {
        InboxStore::new(&IdentityCatalog::builtin())
    }

    #[test]
    fn append_preserves_arrival_order() -> anyhow::Result<()> {
        let mut inbox = store();
        inbox.append("mario", Message::new(GroupKey::System, "first"))?;
        inbox.append("mario", Message::new(GroupKey::Task, "second"))?;

        let payloads: Vec<String> = inbox
            .inbox_of("mario")
            .iter()
            .map(|message| message.payload_text())
            .collect();
        assert_eq!(payloads, vec!["first", "second"]);
        assert!(inbox.inbox_of("luigi").is_empty());
        Ok(())
    }

    #[test]
    fn append_to_unknown_identity_fails() {
        let mut inbox = store();
        let result = inbox.append("bowser", Message::new(GroupKey::Task, "x"));
        assert!(matches!(result, Err(ClientError::UnknownIdentity(_))));
        assert_eq!(inbox.total(), 0);
    }

    #[test]
    fn remove_matches_handle_not_content() -> anyhow::Result<()> {
        let mut inbox = store();
        let first = inbox.append("yoshi", Message::new(GroupKey::Important, "same"))?;
        let second = inbox.append("yoshi", Message::new(GroupKey::Important, "same"))?;

        assert!(inbox.remove("yoshi", &second));
        assert_eq!(inbox.inbox_of("yoshi").len(), 1);
        assert!(Arc::ptr_eq(&inbox.inbox_of("yoshi")[0], &first));

        assert!(!inbox.remove("yoshi", &second), "second removal is a no-op");
        assert_eq!(inbox.inbox_of("yoshi").len(), 1);
        Ok(())
    }

    #[test]
    fn remove_of_foreign_message_is_noop() -> anyhow::Result<()> {
        let mut inbox = store();
        inbox.append("mario", Message::new(GroupKey::Task, "keep"))?;
        let stranger = Arc::new(Message::new(GroupKey::Task, "keep"));

        assert!(!inbox.remove("mario", &stranger));
        assert!(!inbox.remove("bowser", &stranger));
        assert_eq!(inbox.inbox_of("mario").len(), 1);
        Ok(())
    }

    #[test]
    fn remove_at_checks_bounds() -> anyhow::Result<()> {
        let mut inbox = store();
        inbox.append("luigi", Message::new(GroupKey::Task, "a"))?;
        assert!(inbox.remove_at("luigi", 1).is_none());
        assert!(inbox.remove_at("luigi", 0).is_some());
        assert!(inbox.inbox_of("luigi").is_empty());
        Ok(())
    }

    #[test]
    fn append_then_remove_restores_inbox() {
        fn prop(existing: Vec<String>, added: String) -> TestResult {
            let mut inbox = store();
            for payload in &existing {
                if inbox
                    .append("mario", Message::new(GroupKey::System, payload.as_str()))
                    .is_err()
                {
                    return TestResult::error("append failed");
                }
            }
            let before: Vec<Arc<Message>> = inbox.inbox_of("mario").to_vec();

            let Ok(handle) = inbox.append("mario", Message::new(GroupKey::Task, added)) else {
                return TestResult::error("append failed");
            };
            if !inbox.remove("mario", &handle) {
                return TestResult::failed();
            }

            let after = inbox.inbox_of("mario");
            TestResult::from_bool(
                after.len() == before.len()
                    && after
                        .iter()
                        .zip(&before)
                        .all(|(left, right)| Arc::ptr_eq(left, right)),
            )
        }

        QuickCheck::new()
            .tests(200)
            .quickcheck(prop as fn(Vec<String>, String) -> TestResult);
    }
}
