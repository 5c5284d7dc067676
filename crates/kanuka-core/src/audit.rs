//! Append-only audit log at `.kanuka/audit.log`: one JSON object per
//! line recording who ran which workflow and when. Appends are fsync'd
//! but best-effort from the workflows' point of view; a failing audit
//! write never aborts the operation it records.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::project::ProjectStore;

const AUDIT_BASENAME: &str = "audit.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UTC, RFC3339.
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub user_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_uuid: Option<String>,
    /// Target user or output path, depending on the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn for_project(store: &ProjectStore) -> Self {
        AuditLog {
            path: store.dir().join(AUDIT_BASENAME),
        }
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(|e| Error::Internal(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| Error::io(&self.path, e))?;
        file.sync_all().map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }

    /// Best-effort append used by the workflows.
    pub fn record(
        &self,
        action: &str,
        user_uuid: &str,
        device_uuid: Option<&str>,
        target: Option<&str>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            user_uuid: user_uuid.to_string(),
            device_uuid: device_uuid.map(str::to_string),
            target: target.map(str::to_string),
        };
        if let Err(e) = self.append(&entry) {
            tracing::debug!(action, error = %e, "audit append failed");
        }
    }

    /// Read entries matching the filter, oldest first. Unparseable lines
    /// are skipped rather than failing the whole read.
    pub fn read(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file =
            std::fs::File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(&self.path, e))?;
            let Ok(entry) = serde_json::from_str::<AuditEntry>(&line) else {
                continue;
            };
            if let Some(action) = &filter.action {
                if &entry.action != action {
                    continue;
                }
            }
            if let Some(since) = filter.since {
                if entry.timestamp < since {
                    continue;
                }
            }
            if let Some(until) = filter.until {
                if entry.timestamp > until {
                    continue;
                }
            }
            out.push(entry);
        }
        Ok(out)
    }
}
