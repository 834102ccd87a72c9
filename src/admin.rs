//! Offline memory maintenance.
//!
//! The administrative counterpart of the trust pipeline: it may list,
//! remove, or forcibly correct facts and append new core truths. This
//! path is reachable only from the `clean` CLI subcommand, never from
//! `process_message`, which is what structurally enforces the rule
//! that conversational input cannot rewrite truth.
//!
//! Every mutating operation defaults to dry-run and backs up the
//! facts document before touching it.

use crate::config::OwnerConfig;
use crate::memory::document::DocumentStore;
use crate::memory::{FactStore, PreferencesStore};
use crate::security::truth::{CoreTruth, TruthTable};
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Facts below this confidence with very short content are noise.
const NOISE_CONFIDENCE: f64 = 0.3;
const NOISE_MAX_CHARS: usize = 10;

/// Admin-appended core truths, persisted separately from the built-in
/// table and loaded once at server startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruthsDocument {
    pub extras: Vec<CoreTruth>,
}

/// Load admin-appended truths from the memory directory.
pub fn load_extra_truths(dir: &Path) -> Vec<CoreTruth> {
    match DocumentStore::<TruthsDocument>::open(dir.join("truths.json")) {
        Ok(store) => store.read().extras,
        Err(e) => {
            tracing::warn!("Could not load extra truths: {e}");
            Vec::new()
        }
    }
}

/// Result of one cleaning pass.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub removed: usize,
    pub remaining: usize,
    pub role_repaired: bool,
    pub dry_run: bool,
}

/// Offline cleaner over the memory documents.
pub struct MemoryCleaner {
    dir: PathBuf,
    owner: OwnerConfig,
    duplicate_threshold: f64,
}

impl MemoryCleaner {
    pub fn new(dir: PathBuf, owner: OwnerConfig, duplicate_threshold: f64) -> Self {
        Self {
            dir,
            owner,
            duplicate_threshold,
        }
    }

    /// Remove facts that contradict the truth table (built-ins plus
    /// appended extras) and low-confidence noise; repair a corrupted
    /// owner role. With `dry_run` nothing is written.
    pub fn clean(&self, dry_run: bool) -> Result<CleanReport> {
        let truths = TruthTable::with_extras(load_extra_truths(&self.dir));
        let facts = FactStore::open(self.dir.join("learning.json"), self.duplicate_threshold)?;

        let should_remove = |content: &str, confidence: f64| {
            if !truths.verify_claim(content).valid {
                return true;
            }
            confidence < NOISE_CONFIDENCE && content.chars().count() < NOISE_MAX_CHARS
        };

        let all = facts.all();
        let removable: Vec<_> = all
            .iter()
            .filter(|f| should_remove(&f.content, f.confidence))
            .collect();
        for fact in &removable {
            tracing::info!(content = %fact.content, "Flagged for removal");
        }
        let removed = removable.len();

        // Owner role poisoning check (a learning pass once rewrote it).
        let prefs = PreferencesStore::open(self.dir.join("preferences.json"), &self.owner)?;
        let role = prefs.snapshot().user.role;
        let role_poisoned = role == "Secretary" || role == "비서";

        if !dry_run {
            self.backup_facts()?;
            facts.retain(|f| !should_remove(&f.content, f.confidence))?;
            if role_poisoned {
                prefs.set_owner_role(&self.owner.role)?;
                tracing::info!(role = %self.owner.role, "Repaired owner role");
            }
        }

        Ok(CleanReport {
            removed,
            remaining: all.len() - removed,
            role_repaired: role_poisoned,
            dry_run,
        })
    }

    /// Append a new core truth. Statement-only truths render into the
    /// model context but carry no contradiction rule. Duplicate keys
    /// are rejected.
    pub fn add_truth(&self, key: &str, statement: &str, dry_run: bool) -> Result<()> {
        let store: DocumentStore<TruthsDocument> =
            DocumentStore::open(self.dir.join("truths.json"))?;

        let builtin_keys: Vec<String> = TruthTable::with_defaults()
            .truths()
            .iter()
            .map(|t| t.key.clone())
            .collect();
        if builtin_keys.iter().any(|k| k == key)
            || store.with(|doc| doc.extras.iter().any(|t| t.key == key))
        {
            anyhow::bail!("Truth '{key}' already exists");
        }

        if dry_run {
            tracing::info!(key, statement, "Would append core truth (dry run)");
            return Ok(());
        }

        store.update(|doc| doc.extras.push(CoreTruth::new(key, statement)))?;
        tracing::info!(key, "Appended core truth");
        Ok(())
    }

    /// Copy the facts document aside before a destructive pass.
    fn backup_facts(&self) -> Result<()> {
        let source = self.dir.join("learning.json");
        if !source.exists() {
            return Ok(());
        }
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let target = self.dir.join(format!("learning_backup_{stamp}.json"));
        std::fs::copy(&source, &target)
            .with_context(|| format!("Backup failed: {}", target.display()))?;
        tracing::info!(backup = %target.display(), "Facts backed up");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
