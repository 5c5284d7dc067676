use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the secret engine. Workflow entry points return these
/// directly; the CLI maps them onto exit codes and one-line hints.
#[derive(Debug, Error)]
pub enum Error {
    #[error("project is not initialized here (no .kanuka directory)")]
    ProjectNotInitialized,

    #[error("project is already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("project config is invalid: {0}")]
    InvalidProjectConfig(String),

    #[error("user config is invalid: {0}")]
    InvalidUserConfig(String),

    #[error("no private key for this project (expected {0})")]
    PrivateKeyNotFound(PathBuf),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("no wrapped project key for your user; you are not authorised for these secrets")]
    NoAccess,

    #[error("could not unwrap the project key with your private key")]
    KeyDecryptFailed,

    #[error("could not wrap the project key to a public key")]
    WrapFailed,

    #[error("ciphertext is truncated or corrupt")]
    DecryptFailed,

    #[error("authentication failed for {0}: the file was modified after encryption")]
    TamperedCiphertext(PathBuf),

    #[error("no secret files found")]
    NoFilesFound,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("invalid device name {0:?}: use only letters, digits, '-' and '_'")]
    InvalidDeviceName(String),

    #[error("user {0} already exists in this project")]
    DuplicateUser(String),

    #[error("another process holds the project lock (.kanuka/.lock)")]
    ProjectBusy,

    #[error("operation cancelled")]
    Cancelled,

    #[error("unexpected failure: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an `io::Error` with the path it occurred on, promoting
    /// permission failures to their own kind.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Error::PermissionDenied(path)
        } else {
            Error::Io { path, source }
        }
    }

    /// One-line actionable hint for user-recoverable errors.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::ProjectNotInitialized => {
                Some("run `kanuka secrets init` in the project root")
            }
            Error::AlreadyInitialized(_) => {
                Some("remove the existing .kanuka directory first if you really want to start over")
            }
            Error::InvalidProjectConfig(_) => {
                Some("restore .kanuka/config.toml from version control")
            }
            Error::InvalidUserConfig(_) => {
                Some("delete the kanuka user config file to have it regenerated")
            }
            Error::PrivateKeyNotFound(_) => {
                Some("run `kanuka secrets create` to generate a keypair for this project")
            }
            Error::NoAccess => {
                Some("ask an authorised user to run `kanuka secrets sync` to grant you the key")
            }
            Error::TamperedCiphertext(_) => {
                Some("restore the encrypted file from version control")
            }
            Error::ProjectBusy => Some("wait for the other kanuka process to finish"),
            _ => None,
        }
    }
}
