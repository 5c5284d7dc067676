//! `init`: bootstrap a project. Generates the project uuid, the invoking
//! user's keypair and the symmetric key, wraps the latter to the former,
//! and lays down `.kanuka/` plus the user-side key material.

use chrono::Utc;

use crate::audit::AuditLog;
use crate::config::{ProjectConfig, UserConfig, PROJECT_DIR};
use crate::crypto::{self, SymmetricKey};
use crate::error::{Error, Result};
use crate::keystore::{KeyMetadata, KeyStore};
use crate::project::ProjectStore;
use crate::{CancelToken, Context, Reporter};

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Defaults to the project root's directory name.
    pub project_name: Option<String>,
    pub email: String,
    pub device_name: Option<String>,
}

#[derive(Debug)]
pub struct InitOutcome {
    pub project_uuid: String,
    pub user_uuid: String,
    pub device_uuid: String,
}

pub fn init(
    ctx: &Context,
    opts: &InitOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<InitOutcome> {
    let store_dir = ctx.project_root.join(PROJECT_DIR);
    if store_dir.exists() {
        return Err(Error::AlreadyInitialized(store_dir));
    }
    cancel.check()?;

    let mut user = UserConfig::load_or_create(&ctx.user_config_path)?;
    let user_uuid = user.user.uuid.clone();

    let project_name = opts.project_name.clone().unwrap_or_else(|| {
        ctx.project_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    let device_name = opts
        .device_name
        .clone()
        .or_else(|| user.user.default_device_name.clone())
        .unwrap_or_else(|| "primary".to_string());

    let mut config = ProjectConfig::new(project_name.clone());
    config.add_user(&user_uuid, &opts.email)?;
    let device_uuid = config.add_device(&user_uuid, &opts.email, &device_name)?;
    let project_uuid = config.project.uuid.clone();

    tracing::info!(project = %project_uuid, user = %user_uuid, "initializing project");
    let (private, public) = crypto::generate_keypair()?;
    let sym_key = SymmetricKey::generate();
    let wrapped = crypto::wrap(&sym_key, &public)?;
    cancel.check()?;

    let store = ProjectStore::create_layout(&ctx.project_root, &config)?;
    store.put_public_key(&user_uuid, &crypto::encode_pem_public(&public)?)?;
    store.put_wrapped_key(&user_uuid, &wrapped)?;

    let keystore = KeyStore::at(&ctx.key_store_root);
    keystore.save_keypair(&project_uuid, &private, &public)?;
    let now = Utc::now();
    keystore.save_metadata(
        &project_uuid,
        &KeyMetadata {
            project_name: project_name.clone(),
            project_path: ctx.project_root.clone(),
            created_at: now,
            last_accessed_at: now,
        },
    )?;

    user.remember_project(&project_uuid, &project_name, &device_name);
    user.save(&ctx.user_config_path)?;

    AuditLog::for_project(&store).record("init", &user_uuid, Some(&device_uuid), None);
    reporter.info(&format!(
        "initialized project {project_name} ({project_uuid})"
    ));

    Ok(InitOutcome {
        project_uuid,
        user_uuid,
        device_uuid,
    })
}
