//! Owner profile and assistant settings.
//!
//! Seeded from [`OwnerConfig`](crate::config::OwnerConfig) on first
//! run; afterwards the document on disk is authoritative and only the
//! admin tooling mutates it.

use crate::config::OwnerConfig;
use crate::memory::document::DocumentStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Profile of the person the secretary serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerProfile {
    pub name: String,
    pub role: String,
    pub language: String,
    pub timezone: String,
    pub communication_style: String,
}

impl Default for OwnerProfile {
    fn default() -> Self {
        let owner = OwnerConfig::default();
        Self {
            name: owner.name,
            role: owner.role,
            language: owner.language,
            timezone: owner.timezone,
            communication_style: "professional".to_string(),
        }
    }
}

/// Assistant behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantProfile {
    pub response_style: String,
    pub tone: String,
    pub secretary_mode: bool,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            response_style: "proactive".to_string(),
            tone: "friendly-professional".to_string(),
            secretary_mode: true,
        }
    }
}

/// The preferences document on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesDocument {
    pub user: OwnerProfile,
    pub assistant: AssistantProfile,
}

/// Durable preferences store.
pub struct PreferencesStore {
    doc: DocumentStore<PreferencesDocument>,
}

impl PreferencesStore {
    /// Open the store; a fresh document is seeded from `owner`.
    pub fn open(path: PathBuf, owner: &OwnerConfig) -> Result<Self> {
        let existed = path.exists();
        let store = Self {
            doc: DocumentStore::open(path)?,
        };
        if !existed {
            store.doc.update(|doc| {
                doc.user.name = owner.name.clone();
                doc.user.role = owner.role.clone();
                doc.user.language = owner.language.clone();
                doc.user.timezone = owner.timezone.clone();
            })?;
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> PreferencesDocument {
        self.doc.read()
    }

    /// Administrative repair of the owner role (used by the cleaner
    /// when a poisoned learning pass corrupted it).
    pub fn set_owner_role(&self, role: &str) -> Result<()> {
        self.doc.update(|doc| doc.user.role = role.to_string())?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_seeds_from_owner_config() {
        let dir = tempfile::tempdir().unwrap();
        let owner = OwnerConfig {
            name: "관리자".to_string(),
            role: "Plant Manager".to_string(),
            language: "ko".to_string(),
            timezone: "Asia/Seoul".to_string(),
        };
        let store = PreferencesStore::open(dir.path().join("preferences.json"), &owner).unwrap();
        let prefs = store.snapshot();
        assert_eq!(prefs.user.name, "관리자");
        assert_eq!(prefs.user.role, "Plant Manager");
        assert!(prefs.assistant.secretary_mode);
    }

    #[test]
    fn existing_document_wins_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        {
            let store = PreferencesStore::open(path.clone(), &OwnerConfig::default()).unwrap();
            store.set_owner_role("CEO").unwrap();
        }
        let reopened = PreferencesStore::open(path, &OwnerConfig::default()).unwrap();
        assert_eq!(reopened.snapshot().user.role, "CEO");
    }
}
