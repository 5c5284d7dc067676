//! Secret-file enumeration. Walks the project tree, never following
//! symlinks, skipping the `.kanuka` store (it holds wrapping artefacts,
//! not user secrets) and VCS metadata. Output is lexicographic by path so
//! workflow behaviour is deterministic.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::PROJECT_DIR;
use crate::error::{Error, Result};

pub const ENCRYPTED_SUFFIX: &str = ".kanuka";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanMode {
    Plaintext,
    Encrypted,
}

/// `.env` or `.env.*`, where `.*` is not the encrypted suffix.
pub fn is_plaintext_name(name: &str) -> bool {
    name == ".env" || (name.starts_with(".env.") && !name.ends_with(ENCRYPTED_SUFFIX))
}

pub fn is_encrypted_name(name: &str) -> bool {
    name.ends_with(ENCRYPTED_SUFFIX)
}

/// Path the encrypted counterpart of `plaintext` lives at.
pub fn encrypted_path(plaintext: &Path) -> PathBuf {
    let mut name = plaintext
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(ENCRYPTED_SUFFIX);
    plaintext.with_file_name(name)
}

/// Inverse of [`encrypted_path`]; `None` when the name has no suffix.
pub fn plaintext_path(encrypted: &Path) -> Option<PathBuf> {
    let name = encrypted.file_name()?.to_str()?;
    let stem = name.strip_suffix(ENCRYPTED_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(encrypted.with_file_name(stem))
}

/// Enumerate secret files under `project_root`. When `includes` is
/// non-empty, only paths equal to or under one of the entries (resolved
/// against the project root) are returned.
pub fn find_secret_files(
    project_root: &Path,
    includes: &[PathBuf],
    mode: ScanMode,
) -> Result<Vec<PathBuf>> {
    let includes: Vec<PathBuf> = includes
        .iter()
        .map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                project_root.join(p)
            }
        })
        .collect();

    let mut out = Vec::new();
    let walker = WalkDir::new(project_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && (name == PROJECT_DIR || name == ".git"))
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| project_root.to_path_buf());
            match e.into_io_error() {
                Some(io) => Error::io(path, io),
                None => Error::Internal("walk cycle".into()),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let matched = match mode {
            ScanMode::Plaintext => is_plaintext_name(&name),
            ScanMode::Encrypted => is_encrypted_name(&name),
        };
        if !matched {
            continue;
        }
        let path = entry.into_path();
        if !includes.is_empty() && !includes.iter().any(|inc| path.starts_with(inc)) {
            continue;
        }
        out.push(path);
    }

    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"X=1\n").unwrap();
    }

    #[test]
    fn name_rules() {
        assert!(is_plaintext_name(".env"));
        assert!(is_plaintext_name(".env.production"));
        assert!(!is_plaintext_name(".env.kanuka"));
        assert!(!is_plaintext_name("env"));
        assert!(!is_plaintext_name("notes.txt"));
        assert!(is_encrypted_name(".env.kanuka"));
        assert!(is_encrypted_name("config.yaml.kanuka"));
        assert!(!is_encrypted_name(".env"));
    }

    #[test]
    fn counterpart_paths() {
        let enc = encrypted_path(Path::new("a/.env.staging"));
        assert_eq!(enc, Path::new("a/.env.staging.kanuka"));
        assert_eq!(
            plaintext_path(&enc).unwrap(),
            Path::new("a/.env.staging")
        );
        assert!(plaintext_path(Path::new(".kanuka")).is_none());
    }

    #[test]
    fn walk_skips_store_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b/.env"));
        touch(&root.join("a/.env.local"));
        touch(&root.join(".env"));
        // wrapped keys inside the store must not be picked up
        touch(&root.join(".kanuka/secrets/user.kanuka"));
        touch(&root.join(".git/.env"));

        let plain = find_secret_files(root, &[], ScanMode::Plaintext).unwrap();
        assert_eq!(
            plain,
            vec![
                root.join(".env"),
                root.join("a/.env.local"),
                root.join("b/.env"),
            ]
        );
        let enc = find_secret_files(root, &[], ScanMode::Encrypted).unwrap();
        assert!(enc.is_empty());
    }

    #[test]
    fn includes_restrict_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/.env"));
        touch(&root.join("b/.env"));
        let only_a = find_secret_files(root, &[PathBuf::from("a")], ScanMode::Plaintext).unwrap();
        assert_eq!(only_a, vec![root.join("a/.env")]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("real/.env"));
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();
        let plain = find_secret_files(root, &[], ScanMode::Plaintext).unwrap();
        assert_eq!(plain, vec![root.join("real/.env")]);
    }
}
