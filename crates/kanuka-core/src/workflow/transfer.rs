//! `export` and `import`: move the encrypted artefacts between projects
//! as a single gzip tar. Export is read-only and needs no key material;
//! import is mutating and refuses to clobber an existing store unless
//! forced.

use std::path::PathBuf;

use chrono::Utc;

use crate::archive::{self, ExportSummary, ImportSummary};
use crate::audit::AuditLog;
use crate::config::UserConfig;
use crate::error::Result;
use crate::project::ProjectStore;
use crate::{CancelToken, Context, Reporter};

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Defaults to `kanuka-secrets-YYYY-MM-DD.tar.gz` in the project root.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub archive: PathBuf,
    /// Overwrite a non-empty `.kanuka/` store.
    pub force: bool,
}

pub fn export(
    ctx: &Context,
    opts: &ExportOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<ExportSummary> {
    let store = ProjectStore::open(&ctx.project_root)?;
    let output = opts.output.clone().unwrap_or_else(|| {
        ctx.project_root
            .join(archive::default_export_name(Utc::now().date_naive()))
    });

    let summary = archive::export_archive(&store, &output, cancel)?;

    if let Ok(user) = UserConfig::load(&ctx.user_config_path) {
        AuditLog::for_project(&store).record(
            "export",
            &user.user.uuid,
            None,
            Some(&summary.output.display().to_string()),
        );
    }
    reporter.info(&format!(
        "exported {} member(s) to {}",
        summary.members,
        summary.output.display()
    ));
    Ok(summary)
}

pub fn import(
    ctx: &Context,
    opts: &ImportOptions,
    reporter: &dyn Reporter,
    cancel: &CancelToken,
) -> Result<ImportSummary> {
    let summary = archive::import_archive(&ctx.project_root, &opts.archive, opts.force, cancel)?;

    // The store exists once the archive has been restored.
    if let Ok(store) = ProjectStore::open(&ctx.project_root) {
        if let Ok(user) = UserConfig::load(&ctx.user_config_path) {
            AuditLog::for_project(&store).record(
                "import",
                &user.user.uuid,
                None,
                Some(&opts.archive.display().to_string()),
            );
        }
    }
    reporter.info(&format!(
        "restored {} member(s) from {}",
        summary.members,
        opts.archive.display()
    ));
    Ok(summary)
}
