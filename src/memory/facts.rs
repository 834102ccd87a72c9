//! Verified fact storage with deduplication and reinforcement.
//!
//! Facts enter only as verified [`Claim`]s (the orchestrator runs
//! truth verification first). An incoming claim that is a near-
//! duplicate of an existing fact (token-set Jaccard similarity above
//! the configured threshold) reinforces that fact in place when its
//! confidence is higher, and is silently discarded otherwise.
//! Submitting the same claim N times therefore converges to exactly
//! one fact with `reinforcement_count = N − 1`.
//!
//! Facts are never deleted here; removal is an explicit administrative
//! operation (see the `clean` subcommand).

use crate::memory::document::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Where a claim came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimSource {
    /// Deterministic linguistic template.
    Pattern,
    /// Model-assisted extraction.
    Model,
    /// Raw content of external provenance, held in quarantine only;
    /// never the source of a stored fact.
    External,
}

/// Category of a learned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Preference,
    Fact,
    Habit,
    Goal,
    Insight,
}

impl FactKind {
    /// Lenient mapping for model-emitted type strings.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "preference" => Self::Preference,
            "habit" => Self::Habit,
            "goal" | "plan" => Self::Goal,
            "insight" | "pattern" => Self::Insight,
            _ => Self::Fact,
        }
    }
}

/// An unverified candidate fact. Transient: claims are never persisted
/// directly; they pass truth verification first and become either a
/// [`Fact`] or a quarantine entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub content: String,
    pub source: ClaimSource,
    pub kind: FactKind,
    /// Proposed confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Claim {
    pub fn new(content: impl Into<String>, source: ClaimSource, kind: FactKind, confidence: f64) -> Self {
        Self {
            content: content.into(),
            source,
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A verified, persisted fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FactKind,
    pub content: String,
    pub confidence: f64,
    pub learned_at: DateTime<Utc>,
    pub source: ClaimSource,
    pub reinforcement_count: u32,
    pub last_reinforced: Option<DateTime<Utc>>,
}

impl Fact {
    fn from_claim(claim: &Claim) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: claim.kind,
            content: claim.content.clone(),
            confidence: claim.confidence,
            learned_at: Utc::now(),
            source: claim.source,
            reinforcement_count: 0,
            last_reinforced: None,
        }
    }
}

/// The facts document on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactsDocument {
    pub facts: Vec<Fact>,
    pub verified_count: u64,
    pub rejected_count: u64,
}

/// What happened to a submitted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored as a new fact.
    Added,
    /// Reinforced an existing near-duplicate.
    Reinforced,
    /// Near-duplicate with lower-or-equal confidence; dropped
    /// silently (not an error).
    Discarded,
}

/// Word-level token-set Jaccard similarity.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let set_b: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Durable store for verified facts.
pub struct FactStore {
    doc: DocumentStore<FactsDocument>,
    duplicate_threshold: f64,
}

impl FactStore {
    pub fn open(path: PathBuf, duplicate_threshold: f64) -> Result<Self> {
        Ok(Self {
            doc: DocumentStore::open(path)?,
            duplicate_threshold,
        })
    }

    /// Submit one verified claim. Deduplicates against the existing
    /// facts before appending.
    pub fn submit(&self, claim: &Claim) -> SubmitOutcome {
        let threshold = self.duplicate_threshold;
        let result = self.doc.update(|doc| {
            for existing in doc.facts.iter_mut() {
                if jaccard(&claim.content, &existing.content) > threshold {
                    if claim.confidence > existing.confidence {
                        let old = existing.confidence;
                        existing.confidence = claim.confidence;
                        existing.reinforcement_count += 1;
                        existing.last_reinforced = Some(Utc::now());
                        tracing::debug!(
                            content = %existing.content,
                            old_confidence = old,
                            new_confidence = existing.confidence,
                            "Reinforced fact"
                        );
                        return SubmitOutcome::Reinforced;
                    }
                    return SubmitOutcome::Discarded;
                }
            }
            doc.facts.push(Fact::from_claim(claim));
            doc.verified_count += 1;
            SubmitOutcome::Added
        });

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                // The in-memory mutation landed; only persistence
                // failed. Best-effort durability: log and move on.
                tracing::warn!("Fact store persistence failed: {e}");
                SubmitOutcome::Added
            }
        }
    }

    /// Count a verification rejection (the claim itself goes to
    /// quarantine, not here).
    pub fn record_rejection(&self) {
        if let Err(e) = self.doc.update(|doc| doc.rejected_count += 1) {
            tracing::warn!("Fact store persistence failed: {e}");
        }
    }

    /// The most recently learned facts, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Fact> {
        self.doc.with(|doc| {
            let skip = doc.facts.len().saturating_sub(n);
            doc.facts.iter().skip(skip).cloned().collect()
        })
    }

    pub fn all(&self) -> Vec<Fact> {
        self.doc.with(|doc| doc.facts.clone())
    }

    pub fn len(&self) -> usize {
        self.doc.with(|doc| doc.facts.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> (u64, u64) {
        self.doc.with(|doc| (doc.verified_count, doc.rejected_count))
    }

    /// Administrative removal: drop every fact matching the predicate,
    /// returning how many were removed. Not reachable from the
    /// conversational pipeline.
    pub fn retain(&self, keep: impl Fn(&Fact) -> bool) -> Result<usize> {
        self.doc.update(|doc| {
            let before = doc.facts.len();
            doc.facts.retain(|f| keep(f));
            before - doc.facts.len()
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FactStore::open(dir.path().join("learning.json"), 0.75).unwrap();
        (dir, store)
    }

    fn claim(content: &str, confidence: f64) -> Claim {
        Claim::new(content, ClaimSource::Pattern, FactKind::Fact, confidence)
    }

    #[test]
    fn jaccard_basics() {
        assert_eq!(jaccard("공장장은 커피를 좋아함", "공장장은 커피를 좋아함"), 1.0);
        assert_eq!(jaccard("", "anything"), 0.0);
        assert!(jaccard("a b c d", "a b c e") > 0.5);
        assert!(jaccard("완전히 다른 내용", "something else entirely") < 0.1);
    }

    #[test]
    fn first_submission_adds() {
        let (_dir, store) = store();
        assert_eq!(store.submit(&claim("공장장은 커피를 좋아함", 0.7)), SubmitOutcome::Added);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn repeated_submission_is_idempotent() {
        let (_dir, store) = store();
        let n = 5;
        let mut outcomes = Vec::new();
        for _ in 0..n {
            // Same content with rising confidence: every resubmission
            // after the first reinforces instead of adding.
            outcomes.push(store.submit(&claim("공장장은 커피를 좋아함", 0.5)));
        }
        // Equal confidence after the first → discarded, still 1 fact.
        assert_eq!(outcomes[0], SubmitOutcome::Added);
        assert!(outcomes[1..].iter().all(|o| *o == SubmitOutcome::Discarded));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rising_confidence_reinforces_to_n_minus_one() {
        let (_dir, store) = store();
        let n = 4;
        for i in 0..n {
            let confidence = 0.5 + (i as f64) * 0.1;
            store.submit(&claim("공장장은 커피를 좋아함", confidence));
        }
        let facts = store.all();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].reinforcement_count, (n - 1) as u32);
        assert!((facts[0].confidence - 0.8).abs() < 1e-9);
        assert!(facts[0].last_reinforced.is_some());
    }

    #[test]
    fn lower_confidence_duplicate_is_discarded_silently() {
        let (_dir, store) = store();
        store.submit(&claim("공장장은 아침에 운동을 한다", 0.9));
        let outcome = store.submit(&claim("공장장은 아침에 운동을 한다", 0.4));
        assert_eq!(outcome, SubmitOutcome::Discarded);
        let facts = store.all();
        assert_eq!(facts.len(), 1);
        assert!((facts[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(facts[0].reinforcement_count, 0);
    }

    #[test]
    fn distinct_claims_accumulate() {
        let (_dir, store) = store();
        store.submit(&claim("공장장은 커피를 좋아함", 0.7));
        store.submit(&claim("회사는 서울 강남에 위치", 0.8));
        store.submit(&claim("공장장은 매일 아침 뉴스를 본다", 0.6));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn near_duplicate_above_threshold_merges() {
        let (_dir, store) = store();
        store.submit(&claim("공장장은 커피를 아주 좋아함", 0.6));
        // 4 of 5 tokens shared → Jaccard 4/6 = 0.67 < 0.75 → distinct;
        // exact overlap of all tokens → merges.
        let outcome = store.submit(&claim("공장장은 커피를 아주 좋아함", 0.9));
        assert_eq!(outcome, SubmitOutcome::Reinforced);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let (_dir, store) = store();
        for i in 0..5 {
            store.submit(&claim(&format!("사실 번호 {i} 입니다 유니크"), 0.5));
        }
        let recent = store.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].content.contains('3'));
        assert!(recent[1].content.contains('4'));
    }

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning.json");
        {
            let store = FactStore::open(path.clone(), 0.75).unwrap();
            store.submit(&claim("공장장은 커피를 좋아함", 0.7));
        }
        let store = FactStore::open(path, 0.75).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.counters().0, 1);
    }

    #[test]
    fn retain_removes_matching_facts() {
        let (_dir, store) = store();
        store.submit(&claim("공장장은 비서이다라는 주장", 0.5));
        store.submit(&claim("회사는 서울 강남에 위치", 0.8));
        let removed = store.retain(|f| !f.content.contains("비서")).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }
}
