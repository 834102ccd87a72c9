//! Per-relationship session counters.

use crate::memory::document::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The session document on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub message_count: u64,
    pub learning_count: u64,
    pub security_alerts: u64,
}

impl Default for SessionDocument {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            message_count: 0,
            learning_count: 0,
            security_alerts: 0,
        }
    }
}

/// Durable session counter store.
pub struct SessionStore {
    doc: DocumentStore<SessionDocument>,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self {
            doc: DocumentStore::open(path)?,
        })
    }

    pub fn snapshot(&self) -> SessionDocument {
        self.doc.read()
    }

    /// Bump the message counter; runs on every processed message,
    /// including rejected and degraded turns.
    pub fn record_message(&self) {
        self.bump(|s| s.message_count += 1);
    }

    pub fn record_learnings(&self, count: u64) {
        if count > 0 {
            self.bump(|s| s.learning_count += count);
        }
    }

    /// Bump the alert counter; runs on turn rejection and on
    /// quarantine-producing claims.
    pub fn record_security_alert(&self) {
        self.bump(|s| s.security_alerts += 1);
    }

    /// Start a fresh session (new id, zeroed counters).
    pub fn reset(&self) {
        if let Err(e) = self.doc.update(|s| *s = SessionDocument::default()) {
            tracing::warn!("Session persistence failed: {e}");
        }
    }

    fn bump(&self, f: impl FnOnce(&mut SessionDocument)) {
        if let Err(e) = self.doc.update(f) {
            tracing::warn!("Session persistence failed: {e}");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("session.json")).unwrap();

        store.record_message();
        store.record_message();
        store.record_learnings(3);
        store.record_learnings(0);
        store.record_security_alert();

        let snap = store.snapshot();
        assert_eq!(snap.message_count, 2);
        assert_eq!(snap.learning_count, 3);
        assert_eq!(snap.security_alerts, 1);

        let old_id = snap.session_id.clone();
        store.reset();
        let fresh = store.snapshot();
        assert_eq!(fresh.message_count, 0);
        assert_ne!(fresh.session_id, old_id);
    }
}
