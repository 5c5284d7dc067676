//! `sync`: rotate the symmetric key. Produces a fresh key every
//! currently-registered user can recover, re-encrypts every secret
//! payload under it, and fulfils pending users in the same pass.
//!
//! Ordering: wrapped keys are rewritten before payloads. If the run dies
//! midway through the payload pass the project stays recoverable: the
//! invoker's outgoing wrapped key is parked in a `.prev` sidecar before
//! the first overwrite, and the next `sync` decrypts each payload with
//! whichever of the two keys matches, so a retry always makes forward
//! progress. The sidecar is removed once the payload pass completes.

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::crypto::{self, SymmetricKey};
use crate::error::{Error, Result};
use crate::fsio;
use crate::scanner::{self, ScanMode};
use crate::workflow::Session;
use crate::{CancelToken, Context, Reporter};

const PREV_SUFFIX: &str = ".prev";

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct SyncOutcome {
    /// Users holding a wrapped key after the run.
    pub users: usize,
    /// Users that were pending and got fulfilled.
    pub fulfilled: Vec<String>,
    /// Secret payload files re-encrypted.
    pub files: usize,
    pub dry_run: bool,
}

pub fn sync(
    ctx: &Context,
    opts: &SyncOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<SyncOutcome> {
    let session = Session::open(ctx)?;
    let _lock = session.store.lock()?;
    let private = session.load_private_key()?;

    // Step 1: the caller must hold the current key. An interrupted
    // earlier rotation may have parked the outgoing key in a sidecar;
    // load it too so mixed payloads still decrypt.
    let current = session.unwrap_symmetric_key(&private)?;
    let prev_path = prev_sidecar_path(&session);
    let previous = match fsio::read(&prev_path) {
        Ok(blob) => {
            reporter.warn("found an interrupted rotation; resuming");
            crypto::unwrap(&blob, &private).ok()
        }
        Err(_) => None,
    };

    // Step 2: decrypt every payload into memory before mutating anything.
    let encrypted = scanner::find_secret_files(&ctx.project_root, &[], ScanMode::Encrypted)?;
    let mut payloads: Vec<(PathBuf, Zeroizing<Vec<u8>>)> = Vec::with_capacity(encrypted.len());
    for path in encrypted {
        cancel.check()?;
        let blob = fsio::read(&path)?;
        let plaintext = match crypto::decrypt_file(&blob, &current) {
            Ok(pt) => pt,
            Err(_) => match &previous {
                Some(prev) => crypto::decrypt_file(&blob, prev)
                    .map_err(|_| Error::TamperedCiphertext(path.clone()))?,
                None => return Err(Error::TamperedCiphertext(path)),
            },
        };
        payloads.push((path, plaintext));
    }

    let registered = session.store.list_public_keys()?;
    let pending: Vec<String> = registered
        .iter()
        .filter(|uuid| !session.store.has_wrapped_key(uuid))
        .cloned()
        .collect();

    if opts.dry_run {
        reporter.info(&format!(
            "dry run: would rotate the key for {} user(s) ({} pending) and re-encrypt {} file(s)",
            registered.len(),
            pending.len(),
            payloads.len()
        ));
        return Ok(SyncOutcome {
            users: registered.len(),
            fulfilled: pending,
            files: payloads.len(),
            dry_run: true,
        });
    }

    // Step 3: fresh key.
    let next = SymmetricKey::generate();
    tracing::info!(users = registered.len(), files = payloads.len(), "rotating symmetric key");

    // Park the outgoing wrapped key so a crash below stays recoverable.
    let outgoing = session.store.get_wrapped_key(session.user_uuid())?;
    fsio::write_atomic(&prev_path, &outgoing)?;

    // Step 4: rewrap for every registered user, pending ones included,
    // in lexicographic uuid order.
    for uuid in &registered {
        cancel.check()?;
        let public = session.store.get_public_key(uuid)?;
        let wrapped = crypto::wrap(&next, &public)?;
        session.store.put_wrapped_key(uuid, &wrapped)?;
        tracing::debug!(user = %uuid, "rewrapped symmetric key");
    }
    for uuid in &pending {
        reporter.info(&format!("fulfilled pending user {uuid}"));
    }

    // Step 5: re-encrypt each payload under the new key.
    for (path, plaintext) in &payloads {
        cancel.check()?;
        let blob = crypto::encrypt_file(plaintext, &next)?;
        fsio::write_atomic(path, &blob)?;
        tracing::debug!(file = %path.display(), "re-encrypted");
    }

    std::fs::remove_file(&prev_path).ok();

    session.audit().record(
        "sync",
        session.user_uuid(),
        session.device_uuid().as_deref(),
        None,
    );
    reporter.info(&format!(
        "rotated the project key for {} user(s); re-encrypted {} file(s)",
        registered.len(),
        payloads.len()
    ));

    Ok(SyncOutcome {
        users: registered.len(),
        fulfilled: pending,
        files: payloads.len(),
        dry_run: false,
    })
}

fn prev_sidecar_path(session: &Session) -> PathBuf {
    let path = session.store.wrapped_key_path(session.user_uuid());
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(PREV_SUFFIX);
    path.with_file_name(name)
}
