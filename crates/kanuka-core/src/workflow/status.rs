//! `status`: read-only per-file freshness report, comparing each
//! plaintext secret with its encrypted counterpart by mtime.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::project::ProjectStore;
use crate::scanner::{self, ScanMode};
use crate::{CancelToken, Context};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Ciphertext is newer than the plaintext.
    Current,
    /// Plaintext edited since the last encryption.
    Stale,
    /// Plaintext only.
    Unencrypted,
    /// Ciphertext only.
    EncryptedOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    /// Project-root-relative plaintext path (the base name even when only
    /// the ciphertext exists).
    pub path: PathBuf,
    pub status: FileState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext_mtime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_mtime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    pub current: usize,
    pub stale: usize,
    pub unencrypted: usize,
    pub encrypted_only: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project: String,
    pub files: Vec<FileStatus>,
    pub summary: StatusSummary,
}

pub fn status(ctx: &Context, cancel: &CancelToken) -> Result<StatusReport> {
    let store = ProjectStore::open(&ctx.project_root)?;
    let config = store.load_config()?;

    // Base paths: every plaintext plus every ciphertext's counterpart.
    let mut bases: BTreeSet<PathBuf> = BTreeSet::new();
    for path in scanner::find_secret_files(&ctx.project_root, &[], ScanMode::Plaintext)? {
        bases.insert(path);
    }
    for path in scanner::find_secret_files(&ctx.project_root, &[], ScanMode::Encrypted)? {
        if let Some(base) = scanner::plaintext_path(&path) {
            bases.insert(base);
        }
    }

    let mut files = Vec::with_capacity(bases.len());
    let mut summary = StatusSummary::default();
    for base in bases {
        cancel.check()?;
        let plaintext_mtime = mtime(&base)?;
        let encrypted_mtime = mtime(&scanner::encrypted_path(&base))?;
        let status = match (plaintext_mtime, encrypted_mtime) {
            (Some(p), Some(e)) => {
                if e > p {
                    FileState::Current
                } else {
                    FileState::Stale
                }
            }
            (Some(_), None) => FileState::Unencrypted,
            (None, Some(_)) => FileState::EncryptedOnly,
            (None, None) => continue,
        };
        match status {
            FileState::Current => summary.current += 1,
            FileState::Stale => summary.stale += 1,
            FileState::Unencrypted => summary.unencrypted += 1,
            FileState::EncryptedOnly => summary.encrypted_only += 1,
        }
        files.push(FileStatus {
            path: base
                .strip_prefix(&ctx.project_root)
                .unwrap_or(&base)
                .to_path_buf(),
            status,
            plaintext_mtime,
            encrypted_mtime,
        });
    }

    Ok(StatusReport {
        project: config.project.name,
        files,
        summary,
    })
}

fn mtime(path: &Path) -> Result<Option<DateTime<Utc>>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta.modified().map_err(|e| Error::io(path, e))?;
            Ok(Some(modified.into()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}
