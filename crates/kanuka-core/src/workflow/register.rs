//! `create` and `register`: the two halves of bringing a user into a
//! project. With `create`, the joining user mints a project-bound
//! keypair and publishes the public half, leaving themselves pending.
//! `register` is run by an existing member with
//! either a public-key PEM or the uuid of a pending user; when the
//! member holds the symmetric key, the new user's wrapped-key entry is
//! produced immediately, otherwise the user stays pending until `sync`.

use std::path::PathBuf;

use chrono::Utc;

use crate::crypto;
use crate::error::{Error, Result};
use crate::fsio;
use crate::keystore::KeyMetadata;
use crate::workflow::Session;
use crate::{CancelToken, Context, Reporter};

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub email: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Path to a public key PEM for a brand-new user.
    pub pubkey_path: Option<PathBuf>,
    /// With `pubkey_path`: the key owner's uuid, as recorded in their own
    /// user config (wrapped-key lookups go by that uuid, so the entry
    /// must be filed under it). Alone: a pending user to fulfil.
    pub user_uuid: Option<String>,
    /// Required with `pubkey_path`.
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct RegisterOutcome {
    pub user_uuid: String,
    /// False when the user was left pending (public key only).
    pub fulfilled: bool,
}

/// Self-service enrolment: generate a keypair bound to this project and
/// publish the public key. The caller remains pending until an
/// authorised user wraps the symmetric key for them.
pub fn create(
    ctx: &Context,
    opts: &CreateOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<RegisterOutcome> {
    let mut session = Session::open(ctx)?;
    let _lock = session.store.lock()?;
    cancel.check()?;

    let user_uuid = session.user_uuid().to_string();
    if session.store.has_public_key(&user_uuid) {
        return Err(Error::DuplicateUser(opts.email.clone()));
    }

    let device_name = session.device_name(opts.device_name.as_deref());
    session.project.add_user(&user_uuid, &opts.email)?;
    let device_uuid = session
        .project
        .add_device(&user_uuid, &opts.email, &device_name)?;

    tracing::info!(user = %user_uuid, "creating project keypair");
    let (private, public) = crypto::generate_keypair()?;
    cancel.check()?;

    session
        .keystore
        .save_keypair(session.project_uuid(), &private, &public)?;
    let now = Utc::now();
    session.keystore.save_metadata(
        session.project_uuid(),
        &KeyMetadata {
            project_name: session.project.project.name.clone(),
            project_path: ctx.project_root.clone(),
            created_at: now,
            last_accessed_at: now,
        },
    )?;
    session
        .store
        .put_public_key(&user_uuid, &crypto::encode_pem_public(&public)?)?;
    session.store.save_config(&session.project)?;

    let project_uuid = session.project_uuid().to_string();
    let project_name = session.project.project.name.clone();
    session
        .user
        .remember_project(&project_uuid, &project_name, &device_name);
    session.user.save(&ctx.user_config_path)?;

    session
        .audit()
        .record("create", &user_uuid, Some(&device_uuid), None);
    reporter.info(&format!(
        "published public key {} for {}; ask an authorised user to run `kanuka secrets sync`",
        crypto::fingerprint(&public),
        opts.email
    ));

    Ok(RegisterOutcome {
        user_uuid,
        fulfilled: false,
    })
}

/// Register another user, from a public-key PEM or a pending uuid.
pub fn register(
    ctx: &Context,
    opts: &RegisterOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<RegisterOutcome> {
    let mut session = Session::open(ctx)?;
    let _lock = session.store.lock()?;
    cancel.check()?;

    let (target_uuid, public) = match (&opts.pubkey_path, &opts.user_uuid) {
        // New user: the owner sends their PEM together with the uuid
        // from their own user config, so the wrapped-key entry lands
        // where their machine will look it up.
        (Some(path), Some(target_uuid)) => {
            let email = opts.email.as_deref().ok_or_else(|| {
                Error::InvalidPublicKey("an email is required when registering a public key".into())
            })?;
            if session.project.email_of(target_uuid).is_some()
                || session.store.has_public_key(target_uuid)
            {
                return Err(Error::DuplicateUser(target_uuid.clone()));
            }
            let pem = fsio::read_to_string(path)?;
            let public = crypto::decode_pem_public(&pem)?;
            session.project.add_user(target_uuid, email)?;
            session
                .store
                .put_public_key(target_uuid, &crypto::encode_pem_public(&public)?)?;
            session.store.save_config(&session.project)?;
            (target_uuid.clone(), public)
        }
        (None, Some(target_uuid)) => {
            if session.project.email_of(target_uuid).is_none() {
                return Err(Error::InvalidProjectConfig(format!(
                    "user {target_uuid} is not known to this project"
                )));
            }
            let public = session.store.get_public_key(target_uuid)?;
            (target_uuid.clone(), public)
        }
        (Some(_), None) => {
            return Err(Error::InvalidPublicKey(
                "the key owner's user uuid is required; it is recorded in their kanuka user config"
                    .into(),
            ))
        }
        (None, None) => {
            return Err(Error::Internal(
                "register needs a public key path or a user uuid".into(),
            ))
        }
    };
    cancel.check()?;

    // Fulfil the wrapped key right away when this user holds S.
    let fulfilled = match session
        .load_private_key()
        .and_then(|private| session.unwrap_symmetric_key(&private))
    {
        Ok(sym_key) => {
            let wrapped = crypto::wrap(&sym_key, &public)?;
            session.store.put_wrapped_key(&target_uuid, &wrapped)?;
            true
        }
        Err(Error::NoAccess) | Err(Error::PrivateKeyNotFound(_)) => {
            reporter.warn(&format!(
                "{target_uuid} registered as pending; run `kanuka secrets sync` from an authorised user"
            ));
            false
        }
        Err(e) => return Err(e),
    };

    session.audit().record(
        "register",
        session.user_uuid(),
        session.device_uuid().as_deref(),
        Some(&target_uuid),
    );
    if fulfilled {
        reporter.info(&format!(
            "registered {target_uuid} (key {}) with access to secrets",
            crypto::fingerprint(&public)
        ));
    }

    Ok(RegisterOutcome {
        user_uuid: target_uuid,
        fulfilled,
    })
}
