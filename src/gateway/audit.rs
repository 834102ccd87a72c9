//! Command audit trail.
//!
//! Every gate decision (executed, blocked, or pending approval) is
//! written here synchronously BEFORE any side-effecting action runs
//! (log-then-act), so a crash can never produce an unlogged execution.
//! Retention is FIFO-bounded by configuration.

use crate::memory::document::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Gate outcome recorded for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Executed,
    Blocked,
    PendingApproval,
}

impl AuditStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Executed => "executed",
            Self::Blocked => "blocked",
            Self::PendingApproval => "pending_approval",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub command_type: String,
    pub command_args: String,
    pub status: AuditStatus,
    pub reason: String,
}

/// The audit document on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditDocument {
    pub entries: Vec<AuditEntry>,
}

/// Append-only, FIFO-pruned audit log.
pub struct AuditLog {
    doc: DocumentStore<AuditDocument>,
    retention: usize,
}

impl AuditLog {
    pub fn open(path: PathBuf, retention: usize) -> Result<Self> {
        Ok(Self {
            doc: DocumentStore::open(path)?,
            retention: retention.max(1),
        })
    }

    /// Record one gate decision. Synchronous; callers act only after
    /// this returns.
    pub fn log(&self, command_type: &str, command_args: &str, status: AuditStatus, reason: &str) {
        tracing::info!(
            command = command_type,
            status = status.as_str(),
            reason,
            "Command gate decision"
        );
        let entry = AuditEntry {
            timestamp: Utc::now(),
            command_type: command_type.to_string(),
            command_args: command_args.to_string(),
            status,
            reason: reason.to_string(),
        };
        let retention = self.retention;
        if let Err(e) = self.doc.update(|doc| {
            doc.entries.push(entry);
            if doc.entries.len() > retention {
                let excess = doc.entries.len() - retention;
                doc.entries.drain(..excess);
            }
        }) {
            tracing::warn!("Audit log persistence failed: {e}");
        }
    }

    /// The most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.doc.with(|doc| {
            let skip = doc.entries.len().saturating_sub(limit);
            doc.entries.iter().skip(skip).cloned().collect()
        })
    }

    pub fn len(&self) -> usize {
        self.doc.with(|doc| doc.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ────────────────────────────────────────────────────────
