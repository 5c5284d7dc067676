//! End-to-end workflows. Each operation is a plain synchronous function:
//! options in, typed outcome or [`Error`](crate::Error) out, with a
//! [`Reporter`](crate::Reporter) for progress and a
//! [`CancelToken`](crate::CancelToken) checked between discrete file
//! operations. Mutating workflows hold the advisory project lock for
//! their whole run.

mod crypt;
mod doctor;
mod init;
mod register;
mod remove;
mod rotate;
mod status;
mod sync;
mod transfer;

pub use crypt::{decrypt, encrypt, CryptOptions, CryptOutcome};
pub use doctor::{doctor, CheckResult, CheckStatus, DoctorReport};
pub use init::{init, InitOptions, InitOutcome};
pub use register::{create, register, CreateOptions, RegisterOptions, RegisterOutcome};
pub use remove::{remove_user, RemoveOutcome};
pub use rotate::{rotate, RotateOutcome};
pub use status::{status, FileState, FileStatus, StatusReport, StatusSummary};
pub use sync::{sync, SyncOptions, SyncOutcome};
pub use transfer::{export, import, ExportOptions, ImportOptions};

use rsa::RsaPrivateKey;

use crate::audit::AuditLog;
use crate::config::UserConfig;
use crate::crypto::{self, SymmetricKey};
use crate::error::Result;
use crate::keystore::KeyStore;
use crate::project::ProjectStore;
use crate::Context;

/// State common to every workflow that runs against an existing project:
/// the opened store, both configs, and the user's key store.
pub(crate) struct Session {
    pub store: ProjectStore,
    pub project: crate::config::ProjectConfig,
    pub user: UserConfig,
    pub keystore: KeyStore,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let store = ProjectStore::open(&ctx.project_root)?;
        let project = store.load_config()?;
        let user = UserConfig::load_or_create(&ctx.user_config_path)?;
        let keystore = KeyStore::at(&ctx.key_store_root);
        Ok(Session {
            store,
            project,
            user,
            keystore,
        })
    }

    pub fn user_uuid(&self) -> &str {
        &self.user.user.uuid
    }

    pub fn project_uuid(&self) -> &str {
        &self.project.project.uuid
    }

    /// Device uuid this machine registered for the project, if any.
    pub fn device_uuid(&self) -> Option<String> {
        let name = self.user.device_name_for(self.project_uuid())?;
        self.project.device_for(self.user_uuid(), name)
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::for_project(&self.store)
    }

    pub fn load_private_key(&self) -> Result<RsaPrivateKey> {
        self.keystore.load_private(self.project_uuid())
    }

    /// Recover the project symmetric key: load this user's wrapped-key
    /// entry and unwrap it with their private key.
    pub fn unwrap_symmetric_key(&self, private: &RsaPrivateKey) -> Result<SymmetricKey> {
        let wrapped = self.store.get_wrapped_key(self.user_uuid())?;
        let key = crypto::unwrap(&wrapped, private)?;
        self.keystore.touch(self.project_uuid());
        Ok(key)
    }

    /// Device name this machine should use for the project: the
    /// per-project remembered name, the user default, or "primary".
    pub fn device_name(&self, explicit: Option<&str>) -> String {
        explicit
            .or_else(|| self.user.device_name_for(self.project_uuid()))
            .or(self.user.user.default_device_name.as_deref())
            .unwrap_or("primary")
            .to_string()
    }
}
