//! `encrypt` and `decrypt`: transform every secret file in the project
//! under the symmetric key. Plaintexts are never deleted by `encrypt`;
//! `decrypt` halts on the first authentication failure without writing
//! anything further.

use std::path::PathBuf;

use crate::crypto;
use crate::error::{Error, Result};
use crate::fsio;
use crate::scanner::{self, ScanMode};
use crate::workflow::Session;
use crate::{CancelToken, Context, Reporter};

#[derive(Debug, Clone, Default)]
pub struct CryptOptions {
    /// Restrict the scan to these paths (project-root relative) when
    /// non-empty.
    pub includes: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct CryptOutcome {
    /// Files written, lexicographic.
    pub files: Vec<PathBuf>,
}

pub fn encrypt(
    ctx: &Context,
    opts: &CryptOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<CryptOutcome> {
    let session = Session::open(ctx)?;
    let _lock = session.store.lock()?;
    let private = session.load_private_key()?;
    let sym_key = session.unwrap_symmetric_key(&private)?;

    let plaintexts =
        scanner::find_secret_files(&ctx.project_root, &opts.includes, ScanMode::Plaintext)?;
    if plaintexts.is_empty() {
        return Err(Error::NoFilesFound);
    }

    let mut written = Vec::with_capacity(plaintexts.len());
    for path in plaintexts {
        cancel.check()?;
        let plaintext = fsio::read(&path)?;
        let blob = crypto::encrypt_file(&plaintext, &sym_key)?;
        let out = scanner::encrypted_path(&path);
        fsio::write_atomic(&out, &blob)?;
        tracing::debug!(file = %path.display(), "encrypted");
        reporter.info(&format!("encrypted {}", display_relative(ctx, &path)));
        written.push(out);
    }

    session.audit().record(
        "encrypt",
        session.user_uuid(),
        session.device_uuid().as_deref(),
        None,
    );
    Ok(CryptOutcome { files: written })
}

pub fn decrypt(
    ctx: &Context,
    opts: &CryptOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<CryptOutcome> {
    let session = Session::open(ctx)?;
    let _lock = session.store.lock()?;
    let private = session.load_private_key()?;
    let sym_key = session.unwrap_symmetric_key(&private)?;

    let encrypted =
        scanner::find_secret_files(&ctx.project_root, &opts.includes, ScanMode::Encrypted)?;
    if encrypted.is_empty() {
        // Nothing to do is informational, not an error.
        reporter.info("no encrypted secret files found");
        return Ok(CryptOutcome { files: Vec::new() });
    }

    let mut written = Vec::with_capacity(encrypted.len());
    for path in encrypted {
        cancel.check()?;
        let Some(out) = scanner::plaintext_path(&path) else {
            continue;
        };
        let blob = fsio::read(&path)?;
        // A tag failure is fatal: stop before any further writes.
        let plaintext = crypto::decrypt_file(&blob, &sym_key)
            .map_err(|_| Error::TamperedCiphertext(path.clone()))?;
        fsio::write_atomic_secret(&out, &plaintext)?;
        tracing::debug!(file = %out.display(), "decrypted");
        reporter.info(&format!("decrypted {}", display_relative(ctx, &out)));
        written.push(out);
    }

    session.audit().record(
        "decrypt",
        session.user_uuid(),
        session.device_uuid().as_deref(),
        None,
    );
    Ok(CryptOutcome { files: written })
}

fn display_relative(ctx: &Context, path: &std::path::Path) -> String {
    path.strip_prefix(&ctx.project_root)
        .unwrap_or(path)
        .display()
        .to_string()
}
