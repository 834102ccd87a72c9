//! Whole-document JSON persistence.
//!
//! Each logical store (facts, quarantine, audit, nodes, session,
//! preferences) is one JSON document that is loaded and saved as a
//! whole. Loads are total: a missing or corrupt file falls back to the
//! document's default instead of failing. Saves are atomic per
//! document (write to a temp file in the same directory, then rename).
//!
//! Read-modify-write atomicity: all mutation goes through
//! [`DocumentStore::update`], which holds the per-store mutex across
//! "apply mutation + persist", so two concurrently processed messages
//! cannot lose each other's writes.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct DocumentStore<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Open the document at `path`, creating parent directories as
    /// needed. Missing or unreadable content yields `T::default()`.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store dir: {}", parent.display()))?;
        }
        let state = Self::load_or_default(&path);
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn load_or_default(path: &Path) -> T {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        "Corrupt document, falling back to default: {e}"
                    );
                    T::default()
                }
            },
            Err(_) => T::default(),
        }
    }

    /// Snapshot of the current document.
    pub fn read(&self) -> T {
        self.state.lock().clone()
    }

    /// Read a projection of the document without cloning the whole
    /// thing.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.lock())
    }

    /// Apply one mutation and persist the document atomically. The
    /// mutation always lands in memory; a persistence failure is
    /// returned so callers can log it and continue (durability is
    /// best-effort for the trust gate).
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut state = self.state.lock();
        let result = f(&mut state);
        Self::persist(&self.path, &state)?;
        Ok(result)
    }

    fn persist(path: &Path, state: &T) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_vec_pretty(state).context("Failed to serialize document")?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(&json).context("Failed to write document")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to persist document: {}", path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        items: Vec<String>,
        count: u64,
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: DocumentStore<Doc> = DocumentStore::open(dir.path().join("doc.json")).unwrap();
        assert_eq!(store.read(), Doc::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let store: DocumentStore<Doc> = DocumentStore::open(path.clone()).unwrap();
        store
            .update(|doc| {
                doc.items.push("하나".to_string());
                doc.count += 1;
            })
            .unwrap();

        let reopened: DocumentStore<Doc> = DocumentStore::open(path).unwrap();
        let doc = reopened.read();
        assert_eq!(doc.items, vec!["하나".to_string()]);
        assert_eq!(doc.count, 1);
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "{not json at all").unwrap();

        let store: DocumentStore<Doc> = DocumentStore::open(path).unwrap();
        assert_eq!(store.read(), Doc::default());
    }

    #[test]
    fn update_returns_closure_result() {
        let dir = tempfile::tempdir().unwrap();
        let store: DocumentStore<Doc> = DocumentStore::open(dir.path().join("d.json")).unwrap();
        let len = store
            .update(|doc| {
                doc.items.push("x".into());
                doc.items.len()
            })
            .unwrap();
        assert_eq!(len, 1);
    }
}
