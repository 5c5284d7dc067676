//! `rotate`: replace the invoking user's own keypair. The symmetric key
//! and every other user's material are untouched; the interactive
//! confirmation lives at the CLI edge, so by the time this runs the
//! decision has been made.

use crate::crypto;
use crate::error::Result;
use crate::workflow::Session;
use crate::{CancelToken, Context, Reporter};

#[derive(Debug)]
pub struct RotateOutcome {
    pub user_uuid: String,
}

pub fn rotate(
    ctx: &Context,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<RotateOutcome> {
    let session = Session::open(ctx)?;
    let _lock = session.store.lock()?;

    // Recover S with the old private key before anything is replaced.
    let old_private = session.load_private_key()?;
    let sym_key = session.unwrap_symmetric_key(&old_private)?;
    cancel.check()?;

    tracing::info!(user = %session.user_uuid(), "rotating user keypair");
    let (private, public) = crypto::generate_keypair()?;
    let wrapped = crypto::wrap(&sym_key, &public)?;
    cancel.check()?;

    // Project-side first, then the private key; every write is atomic so
    // an interruption leaves either the old pair or the new pair intact.
    session
        .store
        .put_wrapped_key(session.user_uuid(), &wrapped)?;
    session
        .store
        .put_public_key(session.user_uuid(), &crypto::encode_pem_public(&public)?)?;
    session
        .keystore
        .save_keypair(session.project_uuid(), &private, &public)?;

    session.audit().record(
        "rotate",
        session.user_uuid(),
        session.device_uuid().as_deref(),
        None,
    );
    reporter.info("rotated your keypair; other users are unaffected");

    Ok(RotateOutcome {
        user_uuid: session.user_uuid().to_string(),
    })
}
