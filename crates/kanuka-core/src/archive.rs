//! Archive bundling: a gzip-compressed POSIX tar of the encrypted
//! artefacts only (store config, public keys, wrapped keys, `*.kanuka`
//! payloads), with member paths relative to the project root. Plaintext
//! secrets and private keys are never packed.

use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use crate::config::PROJECT_DIR;
use crate::error::{Error, Result};
use crate::fsio;
use crate::project::ProjectStore;
use crate::scanner::{self, ScanMode};
use crate::CancelToken;

/// Default archive filename for a given date: `kanuka-secrets-YYYY-MM-DD.tar.gz`.
pub fn default_export_name(date: NaiveDate) -> String {
    format!("kanuka-secrets-{}.tar.gz", date.format("%Y-%m-%d"))
}

#[derive(Debug)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub members: usize,
}

#[derive(Debug)]
pub struct ImportSummary {
    pub members: usize,
}

/// Pack the project's encrypted artefacts into `output`. The archive is
/// written atomically: a temp file in the destination directory, renamed
/// once the tar stream is finished.
pub fn export_archive(
    store: &ProjectStore,
    output: &Path,
    cancel: &CancelToken,
) -> Result<ExportSummary> {
    let root = store.project_root();
    let mut members: Vec<PathBuf> = Vec::new();
    members.push(store.config_path());
    for uuid in store.list_public_keys()? {
        members.push(store.public_key_path(&uuid));
    }
    for uuid in store.list_wrapped_keys()? {
        members.push(store.wrapped_key_path(&uuid));
    }
    members.extend(scanner::find_secret_files(root, &[], ScanMode::Encrypted)?);

    let dir = output.parent().unwrap_or(Path::new("."));
    fsio::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    let encoder = GzEncoder::new(tmp, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut count = 0usize;
    for member in &members {
        cancel.check()?;
        let rel = member
            .strip_prefix(root)
            .map_err(|_| Error::Internal(format!("{} is outside the project", member.display())))?;
        builder
            .append_path_with_name(member, rel)
            .map_err(|e| Error::io(member, e))?;
        count += 1;
        tracing::debug!(member = %rel.display(), "archived");
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::io(output, e))?;
    let mut tmp = encoder.finish().map_err(|e| Error::io(output, e))?;
    tmp.flush().map_err(|e| Error::io(output, e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| Error::io(output, e))?;
    tmp.persist(output).map_err(|e| Error::io(output, e.error))?;

    Ok(ExportSummary {
        output: output.to_path_buf(),
        members: count,
    })
}

/// Restore an archive into `project_root`. Refuses to overwrite a
/// non-empty `.kanuka/` unless `force` is set; member paths are validated
/// so an archive can never write outside the project.
pub fn import_archive(
    project_root: &Path,
    archive_path: &Path,
    force: bool,
    cancel: &CancelToken,
) -> Result<ImportSummary> {
    let store_dir = project_root.join(PROJECT_DIR);
    if !force && store_dir.is_dir() {
        let occupied = std::fs::read_dir(&store_dir)
            .map_err(|e| Error::io(&store_dir, e))?
            .next()
            .is_some();
        if occupied {
            return Err(Error::AlreadyInitialized(store_dir));
        }
    }

    let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut count = 0usize;
    for entry in archive.entries().map_err(|e| Error::io(archive_path, e))? {
        cancel.check()?;
        let mut entry = entry.map_err(|e| Error::io(archive_path, e))?;
        let rel = entry
            .path()
            .map_err(|e| Error::io(archive_path, e))?
            .into_owned();
        validate_member_path(&rel)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let dest = project_root.join(&rel);
        if let Some(parent) = dest.parent() {
            fsio::create_dir_all(parent)?;
        }
        entry.unpack(&dest).map_err(|e| Error::io(&dest, e))?;
        count += 1;
        tracing::debug!(member = %rel.display(), "restored");
    }

    Ok(ImportSummary { members: count })
}

/// Members must be relative, stay inside the project, and be either store
/// artefacts or encrypted payloads.
fn validate_member_path(rel: &Path) -> Result<()> {
    if rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(Error::Internal(format!(
            "archive member {} escapes the project root",
            rel.display()
        )));
    }
    let in_store = rel.starts_with(PROJECT_DIR);
    let is_payload = rel
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(scanner::is_encrypted_name);
    if !in_store && !is_payload {
        return Err(Error::Internal(format!(
            "archive member {} is not an encrypted artefact",
            rel.display()
        )));
    }
    Ok(())
}
