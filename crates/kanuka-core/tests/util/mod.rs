//! Shared scaffolding: a tempdir hosts the project plus one simulated
//! machine (user config + key store) per user, so multi-user scenarios
//! run against a single `.kanuka/` store.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kanuka_core::workflow::{self, InitOptions};
use kanuka_core::{CancelToken, Context, Reporter, SilentReporter};

/// Context for one (user, machine) pair operating on `project_root`.
pub fn user_context(home: &Path, project_root: &Path, name: &str) -> Context {
    Context::with_dirs(
        project_root,
        home.join(name).join("config.toml"),
        home.join(name).join("keys"),
    )
}

/// Fresh project initialized by user "alice". Returns (tempdir, alice).
pub fn init_project() -> (tempfile::TempDir, Context) {
    let dir = tempfile::tempdir().unwrap();
    let project_root = dir.path().join("project");
    fs::create_dir_all(&project_root).unwrap();
    let alice = user_context(dir.path(), &project_root, "alice");
    workflow::init(
        &alice,
        &InitOptions {
            project_name: Some("demo".into()),
            email: "alice@example.com".into(),
            device_name: Some("laptop".into()),
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    (dir, alice)
}

pub fn write_env(project_root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = project_root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// Reporter that records everything it is told.
#[derive(Default)]
pub struct RecordingReporter {
    pub infos: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}
