mod util;

use std::fs;

use kanuka_core::workflow::{self, CryptOptions};
use kanuka_core::{CancelToken, Error, SilentReporter};
use util::{init_project, write_env};

#[test]
fn init_encrypt_decrypt_round_trip() {
    let (_dir, alice) = init_project();
    let env = write_env(&alice.project_root, ".env", "FOO=bar\n");

    workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    let encrypted = alice.project_root.join(".env.kanuka");
    assert!(encrypted.exists());

    // The plaintext is kept and can be regenerated byte-exact.
    fs::remove_file(&env).unwrap();
    workflow::decrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(fs::read(&env).unwrap(), b"FOO=bar\n");
}

#[test]
fn reencrypting_produces_fresh_ciphertext() {
    let (_dir, alice) = init_project();
    write_env(&alice.project_root, ".env", "FOO=bar\n");

    workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    let first = fs::read(alice.project_root.join(".env.kanuka")).unwrap();
    workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    let second = fs::read(alice.project_root.join(".env.kanuka")).unwrap();
    assert_ne!(first, second, "fresh nonce per encryption");
}

#[test]
fn encrypt_without_secrets_reports_no_files() {
    let (_dir, alice) = init_project();
    let err = workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NoFilesFound));
}

#[test]
fn decrypt_with_nothing_to_do_is_informational() {
    let (_dir, alice) = init_project();
    let outcome = workflow::decrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(outcome.files.is_empty());
}

#[test]
fn tampered_ciphertext_is_fatal_and_writes_nothing() {
    let (_dir, alice) = init_project();
    let env = write_env(&alice.project_root, ".env", "FOO=bar\n");
    workflow::encrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();

    let encrypted = alice.project_root.join(".env.kanuka");
    let mut blob = fs::read(&encrypted).unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    fs::write(&encrypted, &blob).unwrap();

    fs::remove_file(&env).unwrap();
    let err = workflow::decrypt(
        &alice,
        &CryptOptions::default(),
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::TamperedCiphertext(_)));
    assert!(!env.exists(), "no plaintext may be written after a tag failure");
}

#[test]
fn init_refuses_an_initialized_project() {
    let (_dir, alice) = init_project();
    let err = workflow::init(
        &alice,
        &workflow::InitOptions {
            project_name: None,
            email: "alice@example.com".into(),
            device_name: None,
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized(_)));
}

#[test]
fn cancelled_token_stops_before_any_write() {
    let (_dir, alice) = init_project();
    write_env(&alice.project_root, ".env", "FOO=bar\n");
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = workflow::encrypt(&alice, &CryptOptions::default(), &SilentReporter, &cancel)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(!alice.project_root.join(".env.kanuka").exists());
}

#[test]
fn includes_restrict_encryption() {
    let (_dir, alice) = init_project();
    write_env(&alice.project_root, "api/.env", "A=1\n");
    write_env(&alice.project_root, "web/.env", "B=2\n");

    workflow::encrypt(
        &alice,
        &CryptOptions {
            includes: vec!["api".into()],
        },
        &SilentReporter,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(alice.project_root.join("api/.env.kanuka").exists());
    assert!(!alice.project_root.join("web/.env.kanuka").exists());
}
