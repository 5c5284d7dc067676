//! User-side key store: one RSA private key per project, held under the
//! user's data directory, keyed by project uuid.
//!
//! ```text
//! <key-dir>/<project-uuid>        PEM private key, mode 0600
//! <key-dir>/<project-uuid>.pub    PEM public key (convenience copy)
//! <key-dir>/<project-uuid>.meta   TOML sidecar (name, path, timestamps)
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Error, Result};
use crate::fsio;

pub struct KeyStore {
    root: PathBuf,
}

/// Sidecar describing which project a key belongs to. Read failures are
/// non-fatal; the key file alone is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub project_name: String,
    pub project_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl KeyStore {
    /// The default store under the user's data directory.
    pub fn open_default() -> Result<Self> {
        let data = dirs::data_dir()
            .ok_or_else(|| Error::Internal("cannot determine the user data directory".into()))?;
        Ok(KeyStore {
            root: data.join(crate::config::APP_DIR).join("keys"),
        })
    }

    /// A store rooted at an explicit directory (tests, overrides).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        KeyStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn private_key_path(&self, project_uuid: &str) -> PathBuf {
        self.root.join(project_uuid)
    }

    fn public_key_path(&self, project_uuid: &str) -> PathBuf {
        self.root.join(format!("{project_uuid}.pub"))
    }

    fn metadata_path(&self, project_uuid: &str) -> PathBuf {
        self.root.join(format!("{project_uuid}.meta"))
    }

    pub fn has_private(&self, project_uuid: &str) -> bool {
        self.private_key_path(project_uuid).exists()
    }

    /// Persist a keypair for a project: private key at 0600 under a 0700
    /// directory, public convenience copy alongside. Both writes are
    /// atomic, so rotation never leaves a torn key file.
    pub fn save_keypair(
        &self,
        project_uuid: &str,
        private: &RsaPrivateKey,
        public: &RsaPublicKey,
    ) -> Result<()> {
        fsio::create_dir_all_private(&self.root)?;
        let private_pem = crypto::encode_pem_private(private)?;
        fsio::write_atomic_secret(&self.private_key_path(project_uuid), private_pem.as_bytes())?;
        let public_pem = crypto::encode_pem_public(public)?;
        fsio::write_atomic(&self.public_key_path(project_uuid), public_pem.as_bytes())?;
        tracing::debug!(project = project_uuid, "saved project keypair");
        Ok(())
    }

    pub fn load_private(&self, project_uuid: &str) -> Result<RsaPrivateKey> {
        let path = self.private_key_path(project_uuid);
        if !path.exists() {
            return Err(Error::PrivateKeyNotFound(path));
        }
        let pem = fsio::read_to_string(&path)?;
        crypto::decode_pem_private(&pem)
            .map_err(|_| Error::InvalidPrivateKey(path.display().to_string()))
    }

    /// Permission bits of the private key file, for the doctor check.
    pub fn private_key_mode(&self, project_uuid: &str) -> Result<u32> {
        fsio::file_mode(&self.private_key_path(project_uuid))
    }

    pub fn save_metadata(&self, project_uuid: &str, meta: &KeyMetadata) -> Result<()> {
        fsio::create_dir_all_private(&self.root)?;
        let text = toml::to_string_pretty(meta).map_err(|e| Error::Internal(e.to_string()))?;
        fsio::write_atomic(&self.metadata_path(project_uuid), text.as_bytes())
    }

    /// Read the sidecar; a missing or unparseable sidecar is not an error.
    pub fn load_metadata(&self, project_uuid: &str) -> Option<KeyMetadata> {
        let text = fsio::read_to_string(&self.metadata_path(project_uuid)).ok()?;
        toml::from_str(&text).ok()
    }

    /// Bump `last_accessed_at`; best-effort.
    pub fn touch(&self, project_uuid: &str) {
        if let Some(mut meta) = self.load_metadata(project_uuid) {
            meta.last_accessed_at = Utc::now();
            self.save_metadata(project_uuid, &meta).ok();
        }
    }
}
