//! Conversation node persistence.
//!
//! Every processed message, including rejected and degraded turns,
//! becomes one durable node carrying the original content, the reply
//! sections, and the turn's security metadata. Nodes are the audit
//! trail for conversations the way [`AuditLog`](super::audit::AuditLog)
//! is for commands.

use crate::memory::document::DocumentStore;
use crate::reply::ReplySections;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Supported delivery channels.
pub const CHANNELS: &[(&str, &str)] = &[
    ("kakao", "KakaoTalk"),
    ("whatsapp", "WhatsApp"),
    ("line", "LINE"),
];

/// Whether a channel name is known.
pub fn is_known_channel(channel: &str) -> bool {
    CHANNELS.iter().any(|(id, _)| *id == channel)
}

/// One persisted conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    /// Original raw user content: the pre-wrap text is what history
    /// keeps, even when generation saw the quarantine-wrapped form.
    pub content: String,
    pub reply: ReplySections,
    /// Security metadata for the turn (scan result, audit verdict,
    /// overall state), stored as-is.
    pub security: Value,
    pub learnings_extracted: usize,
}

/// The nodes document on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodesDocument {
    pub nodes: Vec<Node>,
}

/// Durable conversation store.
pub struct NodeStore {
    doc: DocumentStore<NodesDocument>,
}

impl NodeStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self {
            doc: DocumentStore::open(path)?,
        })
    }

    /// Persist one turn. Returns the new node id.
    pub fn save(
        &self,
        channel: &str,
        content: &str,
        reply: &ReplySections,
        security: Value,
        learnings_extracted: usize,
    ) -> Result<String> {
        if !is_known_channel(channel) {
            bail!("Unsupported channel: {channel}");
        }
        let node = Node {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            channel: channel.to_string(),
            content: content.to_string(),
            reply: reply.clone(),
            security,
            learnings_extracted,
        };
        let id = node.id.clone();
        self.doc.update(|doc| doc.nodes.push(node))?;
        Ok(id)
    }

    /// All nodes, optionally filtered by channel.
    pub fn list(&self, channel_filter: Option<&str>) -> Vec<Node> {
        self.doc.with(|doc| {
            doc.nodes
                .iter()
                .filter(|n| channel_filter.is_none_or(|c| n.channel == c))
                .cloned()
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.doc.with(|doc| doc.nodes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ────────────────────────────────────────────────────────
