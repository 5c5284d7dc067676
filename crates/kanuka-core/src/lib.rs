//! Kanuka core: a repository-embedded secret engine. Plaintext `.env`
//! files stay on developers' machines; their AES-256-GCM ciphertexts
//! (`*.kanuka`) are committed alongside a `.kanuka/` store holding, per
//! authorised user, a public key and the project symmetric key wrapped to
//! it with RSA-OAEP. Any authorised user can recover the symmetric key
//! locally and en/decrypt the secret files.
//!
//! This crate is the engine only: workflows are plain synchronous
//! functions taking an explicit [`Context`], a [`Reporter`] for progress
//! and a [`CancelToken`]. Terminal rendering, prompts and exit codes live
//! in the CLI crate.

pub mod archive;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
mod fsio;
pub mod keystore;
pub mod project;
pub mod scanner;
pub mod workflow;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use error::{Error, Result};

/// Everything a workflow needs to find its state: the project root and
/// the per-user config and key-store locations. Built once at the edge
/// and threaded explicitly; there is no module-level state.
#[derive(Debug, Clone)]
pub struct Context {
    pub project_root: PathBuf,
    pub user_config_path: PathBuf,
    pub key_store_root: PathBuf,
}

impl Context {
    /// Context with the standard per-user locations (config dir for the
    /// user config, data dir for private keys).
    pub fn new(project_root: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Internal("cannot determine the user config directory".into()))?;
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Internal("cannot determine the user data directory".into()))?;
        Ok(Context {
            project_root: project_root.into(),
            user_config_path: config_dir
                .join(config::APP_DIR)
                .join(config::USER_CONFIG_BASENAME),
            key_store_root: data_dir.join(config::APP_DIR).join("keys"),
        })
    }

    /// Context with explicit locations; used by tests and overrides.
    pub fn with_dirs(
        project_root: impl Into<PathBuf>,
        user_config_path: impl Into<PathBuf>,
        key_store_root: impl Into<PathBuf>,
    ) -> Self {
        Context {
            project_root: project_root.into(),
            user_config_path: user_config_path.into(),
            key_store_root: key_store_root.into(),
        }
    }
}

/// Progress sink injected into workflows. The CLI renders these to the
/// terminal; tests record them silently.
pub trait Reporter {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Reporter that swallows everything.
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
}

/// Cooperative cancellation flag, checked between discrete file
/// operations. A cancelled workflow never leaves a half-written file;
/// `doctor` can characterise whatever state remains.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_trips_once_set() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
