//! Backup/restore journal: snapshot what is about to be deleted, replay it
//! on demand.
//!
//! Backups are versioned JSON files, one per cleaning run. Value issues
//! snapshot just the one value; node issues snapshot the whole subtree.
//! Records are ordered parents-first so restore can replay them in file
//! order.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::errors::{RegError, Result};
use crate::scanner::Issue;
use crate::store::value::RegValue;
use crate::store::{AccessMode, KeyAddress, StoreBackend};

const FORMAT_VERSION: u32 = 1;
const FILE_PREFIX: &str = "regsweep_backup_";

/// One key's snapshot: its address and every value it held.
///
/// A record with no values still recreates the key on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupRecord {
    address: KeyAddress,
    values: Vec<RegValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupFile {
    version: u32,
    label: String,
    created_at: String,
    records: Vec<BackupRecord>,
}

/// Where a freshly written backup landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub label: String,
    /// Number of key records captured.
    pub record_count: usize,
}

/// What a restore managed to put back.
#[derive(Debug, Default, Clone)]
pub struct RestoreReport {
    /// Key records fully replayed.
    pub restored: usize,
    /// Records that failed, with the key address and the error text.
    pub failed: Vec<(String, String)>,
}

impl RestoreReport {
    /// Whether every record came back.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns the backup directory: creation, restore, listing, retention.
#[derive(Debug)]
pub struct BackupManager {
    directory: PathBuf,
    retention: usize,
}

impl BackupManager {
    /// Bind to a directory, creating it if needed.
    pub fn new(directory: impl Into<PathBuf>, retention: usize) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| RegError::io(&directory, &e))?;
        Ok(Self {
            directory,
            retention,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Snapshot everything the given issues are about to delete.
    ///
    /// Entries already gone at snapshot time are skipped; that is routine,
    /// not an error. The retention cap is applied after the write.
    pub fn create_backup(
        &self,
        store: &dyn StoreBackend,
        issues: &[Issue],
        label: &str,
    ) -> Result<BackupHandle> {
        let mut records = Vec::new();
        for issue in issues {
            if issue.is_value_issue() {
                if let Some(record) = snapshot_value(store, &issue.address, &issue.value_name) {
                    records.push(record);
                }
            } else {
                snapshot_subtree(store, &issue.address, &mut records);
            }
        }

        // parents before children, stable across runs
        records.sort_by(|a, b| {
            (a.address.root() as u8, a.address.depth())
                .cmp(&(b.address.root() as u8, b.address.depth()))
                .then_with(|| {
                    a.address
                        .subpath()
                        .to_ascii_lowercase()
                        .cmp(&b.address.subpath().to_ascii_lowercase())
                })
        });

        let file = BackupFile {
            version: FORMAT_VERSION,
            label: label.to_string(),
            created_at: Utc::now().to_rfc3339(),
            records,
        };

        let path = self.fresh_backup_path();
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&path, json).map_err(|e| RegError::io(&path, &e))?;

        self.cleanup_old_backups(self.retention)?;

        Ok(BackupHandle {
            path,
            label: file.label,
            record_count: file.records.len(),
        })
    }

    /// Replay a backup file into the store.
    ///
    /// An unreadable or malformed file is a hard error; individual records
    /// that fail to replay are collected in the report instead.
    pub fn restore_backup(
        &self,
        store: &dyn StoreBackend,
        path: &Path,
    ) -> Result<RestoreReport> {
        let raw = fs::read_to_string(path).map_err(|e| RegError::io(path, &e))?;
        let file: BackupFile =
            serde_json::from_str(&raw).map_err(|e| RegError::BackupFormat {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;
        if file.version != FORMAT_VERSION {
            return Err(RegError::BackupFormat {
                path: path.to_path_buf(),
                details: format!(
                    "unsupported format version {} (expected {FORMAT_VERSION})",
                    file.version
                ),
            });
        }

        let mut report = RestoreReport::default();
        for record in &file.records {
            match replay_record(store, record) {
                Ok(()) => report.restored += 1,
                Err(err) => report
                    .failed
                    .push((record.address.to_string(), err.to_string())),
            }
        }
        Ok(report)
    }

    /// Backup files on disk, newest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.directory).map_err(|e| RegError::io(&self.directory, &e))?;
        let mut backups: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "json")
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with(FILE_PREFIX))
            })
            .collect();
        // timestamped names sort chronologically
        backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(backups)
    }

    /// Delete the oldest backups beyond `max`.
    pub fn cleanup_old_backups(&self, max: usize) -> Result<usize> {
        let backups = self.list_backups()?;
        let mut removed = 0;
        for stale in backups.iter().skip(max) {
            fs::remove_file(stale).map_err(|e| RegError::io(stale, &e))?;
            removed += 1;
        }
        Ok(removed)
    }

    fn fresh_backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let base = format!("{FILE_PREFIX}{stamp}");
        let mut path = self.directory.join(format!("{base}.json"));
        let mut n = 1;
        while path.exists() {
            path = self.directory.join(format!("{base}-{n}.json"));
            n += 1;
        }
        path
    }
}

/// Snapshot one value, if it still exists.
fn snapshot_value(
    store: &dyn StoreBackend,
    address: &KeyAddress,
    name: &str,
) -> Option<BackupRecord> {
    let handle = store.open(address, AccessMode::Read).ok()?;
    let value = handle.get_value(name).ok()?;
    Some(BackupRecord {
        address: address.clone(),
        values: vec![value],
    })
}

/// Snapshot a whole subtree, preorder.
fn snapshot_subtree(store: &dyn StoreBackend, address: &KeyAddress, out: &mut Vec<BackupRecord>) {
    let Ok(handle) = store.open(address, AccessMode::Read) else {
        return;
    };
    let values = handle.list_values().unwrap_or_default();
    let children = handle.list_children().unwrap_or_default();
    drop(handle);

    out.push(BackupRecord {
        address: address.clone(),
        values,
    });
    for child in children {
        snapshot_subtree(store, &address.child(&child), out);
    }
}

fn replay_record(store: &dyn StoreBackend, record: &BackupRecord) -> crate::core::errors::Result<()> {
    let handle = store.create(&record.address, AccessMode::Write)?;
    for value in &record.values {
        handle.set_value(value)?;
    }
    Ok(())
}
