//! Quarantine storage for unverified or rejected claims.
//!
//! Claims that fail truth verification, and content of external or
//! suspicious provenance, land here instead of the fact store. The
//! store is append-only from the pipeline's point of view: `rejected`
//! is terminal, and a `pending` entry is only ever promoted by going
//! back through the same verification path as any new claim, never
//! by elapsed time.

use crate::memory::document::DocumentStore;
use crate::memory::facts::Claim;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verification status of a quarantined claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuarantineStatus {
    /// Awaiting trust; may be re-verified later.
    Pending,
    /// Contradicted a core truth. Terminal.
    Rejected,
}

/// One quarantined claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedClaim {
    pub claim: Claim,
    /// Why it is here (a correction message for rejections, a
    /// provenance note for pending entries).
    pub reason: String,
    pub status: QuarantineStatus,
    pub timestamp: DateTime<Utc>,
}

/// The quarantine document on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarantineDocument {
    pub claims: Vec<QuarantinedClaim>,
}

/// Durable quarantine store.
pub struct QuarantineStore {
    doc: DocumentStore<QuarantineDocument>,
}

impl QuarantineStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        Ok(Self {
            doc: DocumentStore::open(path)?,
        })
    }

    /// Hold a claim pending trust (external/unverified provenance).
    pub fn hold(&self, claim: Claim, reason: &str) {
        self.append(claim, reason, QuarantineStatus::Pending);
    }

    /// Permanently reject a claim that contradicted a core truth.
    pub fn reject(&self, claim: Claim, reason: &str) {
        self.append(claim, reason, QuarantineStatus::Rejected);
    }

    fn append(&self, claim: Claim, reason: &str, status: QuarantineStatus) {
        tracing::info!(
            content = %claim.content,
            reason,
            ?status,
            "Quarantined claim"
        );
        let entry = QuarantinedClaim {
            claim,
            reason: reason.to_string(),
            status,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.doc.update(|doc| doc.claims.push(entry)) {
            tracing::warn!("Quarantine persistence failed: {e}");
        }
    }

    /// All pending (not rejected) entries.
    pub fn pending(&self) -> Vec<QuarantinedClaim> {
        self.doc.with(|doc| {
            doc.claims
                .iter()
                .filter(|c| c.status == QuarantineStatus::Pending)
                .cloned()
                .collect()
        })
    }

    pub fn all(&self) -> Vec<QuarantinedClaim> {
        self.doc.with(|doc| doc.claims.clone())
    }

    pub fn len(&self) -> usize {
        self.doc.with(|doc| doc.claims.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::facts::{ClaimSource, FactKind};

    fn claim(content: &str) -> Claim {
        Claim::new(content, ClaimSource::Model, FactKind::Fact, 0.6)
    }

    #[test]
    fn rejected_and_pending_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let store = QuarantineStore::open(dir.path().join("untrusted.json")).unwrap();

        store.reject(claim("공장장은 비서이다"), "[TRUTH VIOLATION] ...");
        store.hold(claim("외부에서 온 주장"), "external source");

        assert_eq!(store.len(), 2);
        let pending = store.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].claim.content, "외부에서 온 주장");
    }

    #[test]
    fn entries_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untrusted.json");
        {
            let store = QuarantineStore::open(path.clone()).unwrap();
            store.reject(claim("아이유는 유튜버"), "correction");
        }
        let store = QuarantineStore::open(path).unwrap();
        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, QuarantineStatus::Rejected);
        assert!(!all[0].reason.is_empty());
    }
}
