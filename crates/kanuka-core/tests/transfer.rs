mod util;

use std::fs;
use std::path::Path;

use kanuka_core::workflow::{self, CryptOptions, ExportOptions, ImportOptions};
use kanuka_core::{CancelToken, Context, Error, SilentReporter};
use util::{init_project, write_env};

fn read_sorted(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut out: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (
                e.file_name().to_string_lossy().into_owned(),
                fs::read(e.path()).unwrap(),
            )
        })
        .collect();
    out.sort();
    out
}

#[test]
fn export_then_import_reproduces_the_store() {
    let (dir, alice) = init_project();
    write_env(&alice.project_root, ".env", "FOO=bar\n");
    write_env(&alice.project_root, "api/.env.staging", "S=1\n");
    workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();

    let archive = dir.path().join("bundle.tar.gz");
    let summary = workflow::export(
        &alice,
        &ExportOptions {
            output: Some(archive.clone()),
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    // config + 1 public key + 1 wrapped key + 2 payloads
    assert_eq!(summary.members, 5);

    let target_root = dir.path().join("clone");
    fs::create_dir_all(&target_root).unwrap();
    let target = Context::with_dirs(
        &target_root,
        dir.path().join("alice/config.toml"),
        dir.path().join("alice/keys"),
    );
    workflow::import(
        &target,
        &ImportOptions {
            archive: archive.clone(),
            force: false,
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();

    // Byte-equal store artefacts and payloads; no plaintext travels.
    assert_eq!(
        fs::read(alice.project_root.join(".kanuka/config.toml")).unwrap(),
        fs::read(target_root.join(".kanuka/config.toml")).unwrap()
    );
    assert_eq!(
        read_sorted(&alice.project_root.join(".kanuka/public_keys")),
        read_sorted(&target_root.join(".kanuka/public_keys"))
    );
    assert_eq!(
        read_sorted(&alice.project_root.join(".kanuka/secrets")),
        read_sorted(&target_root.join(".kanuka/secrets"))
    );
    assert_eq!(
        fs::read(alice.project_root.join(".env.kanuka")).unwrap(),
        fs::read(target_root.join(".env.kanuka")).unwrap()
    );
    assert_eq!(
        fs::read(alice.project_root.join("api/.env.staging.kanuka")).unwrap(),
        fs::read(target_root.join("api/.env.staging.kanuka")).unwrap()
    );
    assert!(!target_root.join(".env").exists());
    assert!(!target_root.join("api/.env.staging").exists());

    // Alice's key material still opens the imported clone.
    workflow::decrypt(
        &target,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(fs::read(target_root.join(".env")).unwrap(), b"FOO=bar\n");
}

#[test]
fn import_refuses_a_populated_store_without_force() {
    let (dir, alice) = init_project();
    let archive = dir.path().join("bundle.tar.gz");
    workflow::export(
        &alice,
        &ExportOptions {
            output: Some(archive.clone()),
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();

    let err = workflow::import(
        &alice,
        &ImportOptions {
            archive: archive.clone(),
            force: false,
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized(_)));

    // Forced import over the same store is allowed.
    workflow::import(
        &alice,
        &ImportOptions {
            archive,
            force: true,
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
}

#[test]
fn export_skips_plaintext_and_private_keys() {
    let (dir, alice) = init_project();
    write_env(&alice.project_root, ".env", "FOO=bar\n");
    workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();

    let archive = dir.path().join("bundle.tar.gz");
    workflow::export(
        &alice,
        &ExportOptions {
            output: Some(archive.clone()),
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();

    let file = fs::File::open(&archive).unwrap();
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let names: Vec<String> = tar
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().display().to_string())
        .collect();
    assert!(names.contains(&".kanuka/config.toml".to_string()));
    assert!(names.contains(&".env.kanuka".to_string()));
    assert!(
        !names.iter().any(|n| n == ".env"),
        "plaintext must never be exported"
    );
    assert!(
        names.iter().all(|n| !n.contains("keys/")),
        "private key material must never be exported"
    );
}
