//! Project-side store: the `.kanuka/` directory committed to version
//! control.
//!
//! ```text
//! .kanuka/config.toml                  project config
//! .kanuka/public_keys/<uuid>.pub       PEM RSA public key per user
//! .kanuka/secrets/<uuid>.kanuka        RSA-OAEP-wrapped symmetric key
//! .kanuka/.lock                        advisory lock (mutating workflows)
//! ```
//!
//! Each operation is transactional with respect to a single file
//! (temp-file + rename).

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use rsa::RsaPublicKey;

use crate::config::{ProjectConfig, CONFIG_BASENAME, PROJECT_DIR};
use crate::crypto;
use crate::error::{Error, Result};
use crate::fsio;

const PUBLIC_KEYS_DIR: &str = "public_keys";
const SECRETS_DIR: &str = "secrets";
const LOCK_BASENAME: &str = ".lock";

pub struct ProjectStore {
    project_root: PathBuf,
}

impl ProjectStore {
    /// Open an existing project store.
    pub fn open(project_root: impl Into<PathBuf>) -> Result<Self> {
        let project_root = project_root.into();
        if !project_root.join(PROJECT_DIR).is_dir() {
            return Err(Error::ProjectNotInitialized);
        }
        Ok(ProjectStore { project_root })
    }

    /// Create the `.kanuka/{public_keys,secrets}` layout and write the
    /// initial config. Refuses to touch an already-initialized project.
    pub fn create_layout(project_root: impl Into<PathBuf>, config: &ProjectConfig) -> Result<Self> {
        let project_root = project_root.into();
        let dir = project_root.join(PROJECT_DIR);
        if dir.exists() {
            return Err(Error::AlreadyInitialized(dir));
        }
        fsio::create_dir_all(&dir.join(PUBLIC_KEYS_DIR))?;
        fsio::create_dir_all(&dir.join(SECRETS_DIR))?;
        let store = ProjectStore { project_root };
        store.save_config(config)?;
        tracing::info!(uuid = %config.project.uuid, "created project layout");
        Ok(store)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn dir(&self) -> PathBuf {
        self.project_root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_BASENAME)
    }

    pub fn public_keys_dir(&self) -> PathBuf {
        self.dir().join(PUBLIC_KEYS_DIR)
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.dir().join(SECRETS_DIR)
    }

    pub fn public_key_path(&self, user_uuid: &str) -> PathBuf {
        self.public_keys_dir().join(format!("{user_uuid}.pub"))
    }

    pub fn wrapped_key_path(&self, user_uuid: &str) -> PathBuf {
        self.secrets_dir().join(format!("{user_uuid}.kanuka"))
    }

    pub fn load_config(&self) -> Result<ProjectConfig> {
        let text = fsio::read_to_string(&self.config_path())?;
        ProjectConfig::parse(&text)
    }

    pub fn save_config(&self, config: &ProjectConfig) -> Result<()> {
        config.validate()?;
        fsio::write_atomic(&self.config_path(), config.to_toml()?.as_bytes())
    }

    pub fn put_public_key(&self, user_uuid: &str, pem: &str) -> Result<()> {
        fsio::create_dir_all(&self.public_keys_dir())?;
        fsio::write_atomic(&self.public_key_path(user_uuid), pem.as_bytes())
    }

    pub fn get_public_key(&self, user_uuid: &str) -> Result<RsaPublicKey> {
        let pem = fsio::read_to_string(&self.public_key_path(user_uuid))?;
        crypto::decode_pem_public(&pem)
    }

    pub fn has_public_key(&self, user_uuid: &str) -> bool {
        self.public_key_path(user_uuid).exists()
    }

    /// User uuids with a registered public key, lexicographically sorted.
    pub fn list_public_keys(&self) -> Result<Vec<String>> {
        self.list_stems(&self.public_keys_dir(), ".pub")
    }

    pub fn put_wrapped_key(&self, user_uuid: &str, blob: &[u8]) -> Result<()> {
        fsio::create_dir_all(&self.secrets_dir())?;
        fsio::write_atomic(&self.wrapped_key_path(user_uuid), blob)
    }

    /// Wrapped key for a user; `NoAccess` when none exists.
    pub fn get_wrapped_key(&self, user_uuid: &str) -> Result<Vec<u8>> {
        let path = self.wrapped_key_path(user_uuid);
        if !path.exists() {
            return Err(Error::NoAccess);
        }
        fsio::read(&path)
    }

    pub fn has_wrapped_key(&self, user_uuid: &str) -> bool {
        self.wrapped_key_path(user_uuid).exists()
    }

    /// User uuids with a wrapped-key file, lexicographically sorted.
    pub fn list_wrapped_keys(&self) -> Result<Vec<String>> {
        self.list_stems(&self.secrets_dir(), ".kanuka")
    }

    pub fn remove_public_key(&self, user_uuid: &str) -> Result<bool> {
        remove_if_present(&self.public_key_path(user_uuid))
    }

    pub fn remove_wrapped_key(&self, user_uuid: &str) -> Result<bool> {
        remove_if_present(&self.wrapped_key_path(user_uuid))
    }

    /// Acquire the advisory project lock. Mutating workflows hold this for
    /// their whole run; the guard removes the lock file on drop.
    pub fn lock(&self) -> Result<ProjectLock> {
        let path = self.dir().join(LOCK_BASENAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                tracing::debug!(path = %path.display(), "acquired project lock");
                Ok(ProjectLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::ProjectBusy),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn list_stems(&self, dir: &Path, suffix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(Error::io(dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(suffix) {
                if !stem.is_empty() {
                    out.push(stem.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Guard for `.kanuka/.lock`; releases the lock when dropped.
pub struct ProjectLock {
    path: PathBuf,
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        fs::remove_file(&self.path).ok();
    }
}
