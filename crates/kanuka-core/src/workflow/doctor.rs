//! `doctor`: run the fixed project health checks and report
//! pass/warning/error per check. Read-only; never takes the project
//! lock.

use serde::Serialize;

use crate::config::UserConfig;
use crate::error::Result;
use crate::fsio;
use crate::keystore::KeyStore;
use crate::project::ProjectStore;
use crate::scanner::{self, ScanMode};
use crate::{CancelToken, Context};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
            suggestion: None,
        }
    }

    fn warning(name: &str, message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    fn error(name: &str, message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        CheckResult {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,
    pub overall: CheckStatus,
}

pub fn doctor(ctx: &Context, cancel: &CancelToken) -> Result<DoctorReport> {
    let mut checks = Vec::with_capacity(8);

    // 1. Project config parses and carries a uuid.
    let store_and_config = ProjectStore::open(&ctx.project_root)
        .and_then(|store| store.load_config().map(|config| (store, config)));
    let project = match &store_and_config {
        Ok((_, config)) => {
            checks.push(CheckResult::pass(
                "Project config",
                format!("project {} ({})", config.project.name, config.project.uuid),
            ));
            Some(config.clone())
        }
        Err(e) => {
            checks.push(CheckResult::error(
                "Project config",
                e.to_string(),
                "run `kanuka secrets init`, or restore .kanuka/config.toml from version control",
            ));
            None
        }
    };
    cancel.check()?;

    // 2. User config parses and carries a uuid.
    match UserConfig::load(&ctx.user_config_path) {
        Ok(user) => {
            checks.push(CheckResult::pass(
                "User config",
                format!("user {}", user.user.uuid),
            ));
        }
        Err(e) => {
            checks.push(CheckResult::error(
                "User config",
                e.to_string(),
                "any kanuka command recreates it; run `kanuka secrets create`",
            ));
        }
    }
    cancel.check()?;

    // 3 + 4. Private key present, with owner-only permissions.
    let keystore = KeyStore::at(&ctx.key_store_root);
    match &project {
        Some(config) => {
            let project_uuid = &config.project.uuid;
            if keystore.has_private(project_uuid) {
                checks.push(CheckResult::pass(
                    "Private key",
                    keystore.private_key_path(project_uuid).display().to_string(),
                ));
                let mode = keystore.private_key_mode(project_uuid)?;
                if mode == 0o600 {
                    checks.push(CheckResult::pass("Private key permissions", "0600"));
                } else {
                    checks.push(CheckResult::warning(
                        "Private key permissions",
                        format!("mode is {mode:04o}, expected 0600"),
                        format!(
                            "chmod 600 {}",
                            keystore.private_key_path(project_uuid).display()
                        ),
                    ));
                }
            } else {
                checks.push(CheckResult::error(
                    "Private key",
                    "no private key for this project",
                    "run `kanuka secrets create` to generate one",
                ));
                checks.push(CheckResult::pass(
                    "Private key permissions",
                    "no private key to inspect",
                ));
            }
        }
        None => {
            checks.push(CheckResult::error(
                "Private key",
                "cannot locate the key without a project config",
                "fix the project config first",
            ));
            checks.push(CheckResult::pass(
                "Private key permissions",
                "no private key to inspect",
            ));
        }
    }
    cancel.check()?;

    // 5 + 6. Public keys and wrapped keys must pair up.
    if let Ok((store, _)) = &store_and_config {
        let public = store.list_public_keys()?;
        let wrapped = store.list_wrapped_keys()?;
        let pending: Vec<&String> = public.iter().filter(|u| !wrapped.contains(u)).collect();
        if pending.is_empty() {
            checks.push(CheckResult::pass(
                "Pending users",
                format!("{} user(s), all hold a wrapped key", public.len()),
            ));
        } else {
            checks.push(CheckResult::warning(
                "Pending users",
                format!(
                    "{} public key(s) without a wrapped key: {}",
                    pending.len(),
                    join(&pending)
                ),
                "run `kanuka secrets sync` from an authorised user",
            ));
        }
        let orphans: Vec<&String> = wrapped.iter().filter(|u| !public.contains(u)).collect();
        if orphans.is_empty() {
            checks.push(CheckResult::pass("Orphan wrapped keys", "none"));
        } else {
            checks.push(CheckResult::error(
                "Orphan wrapped keys",
                format!(
                    "wrapped key(s) without a public key: {}",
                    join(&orphans)
                ),
                "remove the orphan file(s) under .kanuka/secrets/ or restore the public key",
            ));
        }
    }
    cancel.check()?;

    // 7. .gitignore must keep plaintext secrets out of the repository.
    let gitignore = ctx.project_root.join(".gitignore");
    let ignores_env = fsio::read_to_string(&gitignore)
        .map(|text| text.lines().any(|line| ignores_env_pattern(line)))
        .unwrap_or(false);
    if ignores_env {
        checks.push(CheckResult::pass(".gitignore", "ignores .env files"));
    } else {
        checks.push(CheckResult::warning(
            ".gitignore",
            "no pattern ignoring .env files",
            "add `.env*` to .gitignore (but keep *.kanuka tracked)",
        ));
    }
    cancel.check()?;

    // 8. Every plaintext secret should have an encrypted counterpart.
    let plain = scanner::find_secret_files(&ctx.project_root, &[], ScanMode::Plaintext)?;
    let missing: Vec<String> = plain
        .iter()
        .filter(|p| !scanner::encrypted_path(p).exists())
        .map(|p| {
            p.strip_prefix(&ctx.project_root)
                .unwrap_or(p)
                .display()
                .to_string()
        })
        .collect();
    if missing.is_empty() {
        checks.push(CheckResult::pass(
            "Encrypted counterparts",
            format!("{} plaintext file(s), all encrypted", plain.len()),
        ));
    } else {
        checks.push(CheckResult::warning(
            "Encrypted counterparts",
            format!("not yet encrypted: {}", missing.join(", ")),
            "run `kanuka secrets encrypt`",
        ));
    }

    let overall = checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(CheckStatus::Pass);

    Ok(DoctorReport { checks, overall })
}

/// Lines like `.env`, `.env*`, `.env.*` or `*.env` all keep plaintext
/// secrets out of the repository.
fn ignores_env_pattern(line: &str) -> bool {
    let line = line.trim();
    if line.starts_with('#') {
        return false;
    }
    let line = line.trim_start_matches('/');
    line == ".env" || line.starts_with(".env") && !line.contains("kanuka") || line == "*.env"
}

fn join(uuids: &[&String]) -> String {
    uuids
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gitignore_patterns() {
        assert!(ignores_env_pattern(".env"));
        assert!(ignores_env_pattern(".env*"));
        assert!(ignores_env_pattern(".env.*"));
        assert!(ignores_env_pattern("/.env"));
        assert!(ignores_env_pattern("*.env"));
        assert!(!ignores_env_pattern("# .env"));
        assert!(!ignores_env_pattern("*.kanuka"));
        assert!(!ignores_env_pattern("node_modules/"));
    }
}
