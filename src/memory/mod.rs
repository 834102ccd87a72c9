//! Memory subsystem: fact store, quarantine, session counters, owner
//! preferences, and the learning pipeline that feeds them.
//!
//! [`MemorySystem`] is the single owner of the durable memory
//! documents. Every candidate claim, regardless of which extraction
//! pass produced it, goes through truth-table verification before it
//! can reach the fact store; failures are quarantined with the
//! correction as the recorded reason.

pub mod document;
pub mod extractor;
pub mod facts;
pub mod preferences;
pub mod quarantine;
pub mod session;

pub use extractor::{LearningExtractor, ParseError};
pub use facts::{jaccard, Claim, ClaimSource, Fact, FactKind, FactStore, SubmitOutcome};
pub use preferences::{PreferencesDocument, PreferencesStore};
pub use quarantine::{QuarantineStatus, QuarantineStore, QuarantinedClaim};
pub use session::{SessionDocument, SessionStore};

use crate::config::{MemoryConfig, OwnerConfig, SecurityConfig};
use crate::provider::ModelClient;
use crate::security::truth::TruthTable;
use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// What one learning pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearnReport {
    pub accepted: usize,
    pub reinforced: usize,
    pub rejected: usize,
}

impl LearnReport {
    pub fn total_extracted(&self) -> usize {
        self.accepted + self.reinforced + self.rejected
    }
}

/// The memory boundary: owns every durable memory document plus the
/// extractor, and enforces verification-before-storage.
pub struct MemorySystem {
    facts: FactStore,
    quarantine: QuarantineStore,
    session: SessionStore,
    preferences: PreferencesStore,
    truths: Arc<TruthTable>,
    extractor: LearningExtractor,
    truth_enforcement: bool,
    context_facts: usize,
}

impl MemorySystem {
    pub fn open(
        dir: &Path,
        truths: Arc<TruthTable>,
        memory_config: &MemoryConfig,
        security_config: &SecurityConfig,
        owner: &OwnerConfig,
    ) -> Result<Self> {
        let facts = FactStore::open(
            dir.join("learning.json"),
            memory_config.duplicate_threshold,
        )?;
        let quarantine = QuarantineStore::open(dir.join("untrusted.json"))?;
        let session = SessionStore::open(dir.join("session.json"))?;
        let preferences = PreferencesStore::open(dir.join("preferences.json"), owner)?;
        let extractor = LearningExtractor::new(&owner.name);

        Ok(Self {
            facts,
            quarantine,
            session,
            preferences,
            truths,
            extractor,
            truth_enforcement: security_config.truth_enforcement,
            context_facts: memory_config.context_facts,
        })
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn quarantine(&self) -> &QuarantineStore {
        &self.quarantine
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn preferences(&self) -> &PreferencesStore {
        &self.preferences
    }

    /// Extract candidate claims from a user message, verify each one,
    /// and store or quarantine it. Rejected claims bump the session
    /// security-alert counter.
    pub async fn learn(&self, client: &ModelClient, user_message: &str) -> LearnReport {
        let claims = self.extractor.extract(client, user_message).await;
        let mut report = LearnReport::default();

        for claim in claims {
            if self.truth_enforcement {
                let verdict = self.truths.verify_claim(&claim.content);
                if !verdict.valid {
                    let correction = verdict
                        .correction
                        .unwrap_or_else(|| "contradicts a core truth".to_string());
                    self.quarantine.reject(claim, &correction);
                    self.facts.record_rejection();
                    self.session.record_security_alert();
                    report.rejected += 1;
                    continue;
                }
            }
            match self.facts.submit(&claim) {
                SubmitOutcome::Added => report.accepted += 1,
                SubmitOutcome::Reinforced => report.reinforced += 1,
                SubmitOutcome::Discarded => {}
            }
        }

        self.session.record_learnings(report.accepted as u64);
        if report.total_extracted() > 0 {
            tracing::info!(
                accepted = report.accepted,
                reinforced = report.reinforced,
                rejected = report.rejected,
                "Learning pass complete"
            );
        }
        report
    }

    /// Render the model-facing memory context: owner profile, truth
    /// table, recent facts (re-verified at render time), quarantine
    /// summary, and session counters. Goes into the system turn; the
    /// user turn carries only the (possibly wrapped) message.
    pub fn build_context_prompt(&self) -> String {
        let prefs = self.preferences.snapshot();
        let session = self.session.snapshot();
        let facts = self.facts.recent(self.context_facts);
        let total_facts = self.facts.len();

        let mut out = String::from("[MEMORY CONTEXT]\n\n");
        let _ = writeln!(
            out,
            "OWNER PROFILE:\nName: {} ({})\nLanguage: {} | Timezone: {} | Style: {}\n",
            prefs.user.name,
            prefs.user.role,
            prefs.user.language,
            prefs.user.timezone,
            prefs.user.communication_style,
        );

        out.push_str(&self.truths.system_truths_prompt());

        let _ = writeln!(out, "\nACCUMULATED KNOWLEDGE ({total_facts} facts):");
        if facts.is_empty() {
            out.push_str("(No facts yet - be observant and start learning!)\n");
        } else {
            for (i, fact) in facts.iter().enumerate() {
                // Defense in depth: a fact that slipped in before a
                // truth was added must not be presented as knowledge.
                let verdict = self.truths.verify_claim(&fact.content);
                let (badge, confidence) = if verdict.valid {
                    ("ok", fact.confidence)
                } else {
                    ("CONTRADICTS MASTER TRUTH", 0.0)
                };
                let _ = writeln!(
                    out,
                    "{}. [{badge}] {} (conf: {confidence:.1}, learned: {})",
                    i + 1,
                    fact.content,
                    fact.learned_at.format("%Y-%m-%d"),
                );
            }
        }

        let pending = self.quarantine.pending().len();
        if pending > 0 {
            let _ = writeln!(
                out,
                "\nSECURITY: {pending} claim(s) in quarantine (pending verification)"
            );
        }

        let _ = writeln!(
            out,
            "\nCURRENT SESSION:\nSession: {}\nMessages: {} | Learnings: {} | Security alerts: {}",
            &session.session_id[..8.min(session.session_id.len())],
            session.message_count,
            session.learning_count,
            session.security_alerts,
        );

        out
    }
}

// ── Tests ────────────────────────────────────────────────────────
