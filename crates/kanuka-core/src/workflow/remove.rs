//! `remove-user`: drop a user's public key, wrapped key, and config
//! entries. Removal alone never revokes historical access (the user may
//! hold the symmetric key in memory or a cache), so the outcome flags
//! when a follow-up `sync` is called for.

use crate::error::{Error, Result};
use crate::scanner::{self, ScanMode};
use crate::workflow::Session;
use crate::{CancelToken, Context, Reporter};

#[derive(Debug)]
pub struct RemoveOutcome {
    pub user_uuid: String,
    /// True when secret payloads exist that the removed user could still
    /// decrypt with a cached key; run `sync` to rotate it away.
    pub rotation_recommended: bool,
}

/// `user` may be a uuid or an email.
pub fn remove_user(
    ctx: &Context,
    user: &str,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<RemoveOutcome> {
    let mut session = Session::open(ctx)?;
    let _lock = session.store.lock()?;
    cancel.check()?;

    let target_uuid = session.project.resolve_user(user).ok_or_else(|| {
        Error::InvalidProjectConfig(format!("user {user} is not known to this project"))
    })?;
    if target_uuid == session.user_uuid() {
        reporter.warn("removing your own access to this project");
    }

    session.store.remove_public_key(&target_uuid)?;
    session.store.remove_wrapped_key(&target_uuid)?;
    session.project.remove_user(&target_uuid);
    session.store.save_config(&session.project)?;
    tracing::info!(user = %target_uuid, "removed user");

    let rotation_recommended =
        !scanner::find_secret_files(&ctx.project_root, &[], ScanMode::Encrypted)?.is_empty();
    if rotation_recommended {
        reporter.warn(
            "removal does not revoke previously-held keys; run `kanuka secrets sync` to rotate",
        );
    }

    session.audit().record(
        "remove-user",
        session.user_uuid(),
        session.device_uuid().as_deref(),
        Some(&target_uuid),
    );

    Ok(RemoveOutcome {
        user_uuid: target_uuid,
        rotation_recommended,
    })
}
