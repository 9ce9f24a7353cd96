//! Bounded record of non-fatal conditions.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Inbound frame was not UTF-8 JSON.
    MalformedFrame { identity: String, detail: String },
    /// Frame arrived on a channel that is no longer current.
    StaleFrame { identity: String, generation: u64 },
    ChannelFailed { identity: String, detail: String },
    CloseFailed { identity: String, detail: String },
    AnnounceFailed { identity: String, detail: String },
    SendFailed { recipient: Option<String>, detail: String },
}

impl Diagnostic {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame { .. } => "malformed_frame",
            Self::StaleFrame { .. } => "stale_frame",
            Self::ChannelFailed { .. } => "channel_failed",
            Self::CloseFailed { .. } => "close_failed",
            Self::AnnounceFailed { .. } => "announce_failed",
            Self::SendFailed { .. } => "send_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub diagnostic: Diagnostic,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<DiagnosticEntry>,
    limit: usize,
}

impl DiagnosticLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.entries.push_back(DiagnosticEntry {
            diagnostic,
            recorded_at: Utc::now(),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Diagnostic> {
        self.entries.back().map(|entry| &entry.diagnostic)
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.diagnostic.kind() == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
