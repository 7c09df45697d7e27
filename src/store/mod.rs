//! Durable issue state -- two independently loadable JSON documents.
//!
//! `active_issues.json` maps issue id to issue; `resolution_history.json`
//! is the append-only audit list, oldest first. Saves are atomic (write to
//! a temp file, fsync, rename) so a crash mid-write never leaves a torn
//! document. A structurally invalid document on load is quarantined to a
//! timestamped backup and replaced with an empty one instead of aborting
//! startup.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::heal::{HistoryEntry, Issue};

const ACTIVE_FILE: &str = "active_issues.json";
const HISTORY_FILE: &str = "resolution_history.json";

pub struct IssueStore {
    data_dir: PathBuf,
}

impl IssueStore {
    /// Open the store, creating the data directory if needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir: {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    pub fn active_path(&self) -> PathBuf {
        self.data_dir.join(ACTIVE_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    /// Load both documents. Missing files yield empty collections; corrupt
    /// files are quarantined and likewise yield empty collections.
    pub fn load(&self) -> Result<(HashMap<Uuid, Issue>, Vec<HistoryEntry>)> {
        let active = self.load_or_quarantine(&self.active_path())?;
        let history = self.load_or_quarantine(&self.history_path())?;
        Ok((active, history))
    }

    pub fn save_active(&self, active: &HashMap<Uuid, Issue>) -> Result<()> {
        self.save_json(&self.active_path(), active)
    }

    pub fn save_history(&self, history: &[HistoryEntry]) -> Result<()> {
        self.save_json(&self.history_path(), &history)
    }

    fn load_or_quarantine<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        match serde_json::from_str(&content) {
            Ok(value) => Ok(value),
            Err(e) => {
                let backup = quarantine_path(path);
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "document failed to parse, quarantining and starting empty"
                );
                fs::rename(path, &backup)
                    .with_context(|| format!("failed to quarantine {}", path.display()))?;
                Ok(T::default())
            }
        }
    }

    fn save_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        atomic_write(path, &json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Write via temp file + rename in the same directory, fsyncing before the
/// rename so the replacement is all-or-nothing.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn quarantine_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let name = format!("{stem}.corrupt-{}.json", chrono::Utc::now().timestamp());
    let backup = path.with_file_name(name);
    info!(backup = %backup.display(), "quarantine target selected");
    backup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Anomaly, AnomalyKind};
    use crate::heal::IssueStatus;
    use chrono::Utc;

    fn sample_issue() -> Issue {
        Issue::from_anomaly(Anomaly {
            kind: AnomalyKind::HighLatency {
                latency_ms: 260.0,
                threshold_ms: 200.0,
            },
            score: 4.5,
            detected_at: Utc::now(),
        })
    }

    #[test]
    fn test_load_empty_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = IssueStore::open(dir.path()).unwrap();
        let (active, history) = store.load().unwrap();
        assert!(active.is_empty());
        assert!(history.is_empty());
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = IssueStore::open(dir.path()).unwrap();

        let mut issue = sample_issue();
        issue.status = IssueStatus::Pending;
        issue.resolution_attempts = 2;
        let mut active = HashMap::new();
        active.insert(issue.id, issue.clone());

        let history = vec![HistoryEntry {
            issue_id: issue.id,
            anomaly_kind: "high_latency".to_string(),
            detected_at: issue.detected_at,
            resolved_at: None,
            resolution_success: false,
            resolution_actions: Vec::new(),
        }];

        store.save_active(&active).unwrap();
        store.save_history(&history).unwrap();

        let (loaded_active, loaded_history) = store.load().unwrap();
        assert_eq!(loaded_active.len(), 1);
        let loaded = &loaded_active[&issue.id];
        assert_eq!(loaded.title, issue.title);
        assert_eq!(loaded.status, IssueStatus::Pending);
        assert_eq!(loaded.resolution_attempts, 2);
        assert_eq!(loaded_history.len(), 1);
        assert_eq!(loaded_history[0].issue_id, issue.id);
        assert!(!loaded_history[0].resolution_success);
    }

    #[test]
    fn test_corrupt_history_is_quarantined() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = IssueStore::open(dir.path()).unwrap();
        fs::write(store.history_path(), "{ this is not json").unwrap();

        let (active, history) = store.load().unwrap();
        assert!(active.is_empty());
        assert!(history.is_empty());

        // Original file replaced by a timestamped backup.
        assert!(!store.history_path().exists());
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("resolution_history.corrupt-")
            })
            .collect();
        assert_eq!(backups.len(), 1);

        // Subsequent saves work normally.
        store.save_history(&[]).unwrap();
        assert!(store.history_path().exists());
    }

    #[test]
    fn test_corrupt_active_is_quarantined() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = IssueStore::open(dir.path()).unwrap();
        fs::write(store.active_path(), "[1, 2,").unwrap();

        let (active, _) = store.load().unwrap();
        assert!(active.is_empty());
        assert!(!store.active_path().exists());
    }

    #[test]
    fn test_save_replaces_not_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = IssueStore::open(dir.path()).unwrap();

        let issue = sample_issue();
        let mut active = HashMap::new();
        active.insert(issue.id, issue);
        store.save_active(&active).unwrap();

        active.clear();
        store.save_active(&active).unwrap();
        let (loaded, _) = store.load().unwrap();
        assert!(loaded.is_empty());
    }
}
