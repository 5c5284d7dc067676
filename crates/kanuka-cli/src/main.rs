use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use chrono::DateTime;
use clap::{Parser, Subcommand};
use kanuka_core::audit::{AuditFilter, AuditLog};
use kanuka_core::project::ProjectStore;
use kanuka_core::workflow::{self, CheckStatus, CryptOptions};
use kanuka_core::{CancelToken, Context, Error, Reporter};

#[derive(Parser, Debug)]
#[command(name = "kanuka", version, about = "Kanuka: repository-embedded secret manager")]
struct Cli {
    /// Log workflow progress
    #[arg(long, global = true)]
    verbose: bool,
    /// Log per-file detail
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Manage encrypted secret files
    Secrets {
        #[command(subcommand)]
        cmd: SecretsCmd,
    },
}

#[derive(Subcommand, Debug)]
enum SecretsCmd {
    /// Initialize a project: keypair, symmetric key, .kanuka/ layout
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
        /// Your email (default: `git config user.email`)
        #[arg(long)]
        email: Option<String>,
        /// Device name for this machine
        #[arg(long)]
        device: Option<String>,
    },
    /// Generate your own keypair for an existing project (pending until synced)
    Create {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Register another user by public key or pending uuid
    Register {
        /// Path to a PEM public key (requires --user with the owner's uuid)
        #[arg(long, requires = "user")]
        pubkey: Option<PathBuf>,
        /// The key owner's uuid (with --pubkey), or a pending user to fulfil
        #[arg(long)]
        user: Option<String>,
        /// Email for the new user (with --pubkey)
        #[arg(long)]
        email: Option<String>,
    },
    /// Encrypt every plaintext secret file
    Encrypt {
        /// Restrict to these paths
        paths: Vec<PathBuf>,
    },
    /// Decrypt every encrypted secret file
    Decrypt {
        /// Restrict to these paths
        paths: Vec<PathBuf>,
    },
    /// Rotate the project symmetric key and fulfil pending users
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace your own keypair
    Rotate {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Remove a user (uuid or email) from the project
    Remove { user: String },
    /// Per-file freshness report
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Project health checks
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// Pack encrypted artefacts into a tar.gz
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore encrypted artefacts from a tar.gz
    Import {
        archive: PathBuf,
        /// Overwrite a non-empty .kanuka/ store
        #[arg(long)]
        force: bool,
    },
    /// Read the project audit log
    Audit {
        /// Filter by action (init, encrypt, sync, ...)
        #[arg(long)]
        action: Option<String>,
        /// Only entries at or after this RFC3339 timestamp
        #[arg(long)]
        since: Option<String>,
    },
}

/// Renders workflow progress on the terminal.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool, debug: bool) {
    let filter = if debug {
        "kanuka=debug,kanuka_core=debug"
    } else if verbose {
        "kanuka=info,kanuka_core=info"
    } else {
        "kanuka=warn,kanuka_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, Error> {
    let Cmd::Secrets { cmd } = cli.cmd;
    let reporter = ConsoleReporter;
    let cancel = CancelToken::new();
    let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;

    match cmd {
        SecretsCmd::Init {
            name,
            email,
            device,
        } => {
            // init runs where invoked; there is no project to discover yet
            let ctx = Context::new(&cwd)?;
            let opts = workflow::InitOptions {
                project_name: name,
                email: resolve_email(email)?,
                device_name: device,
            };
            workflow::init(&ctx, &opts, &reporter, &cancel)?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Create { email, device } => {
            let ctx = project_context(&cwd)?;
            let opts = workflow::CreateOptions {
                email: resolve_email(email)?,
                device_name: device,
            };
            workflow::create(&ctx, &opts, &reporter, &cancel)?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Register {
            pubkey,
            user,
            email,
        } => {
            let ctx = project_context(&cwd)?;
            let opts = workflow::RegisterOptions {
                pubkey_path: pubkey,
                user_uuid: user,
                email,
            };
            workflow::register(&ctx, &opts, &reporter, &cancel)?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Encrypt { paths } => {
            let ctx = project_context(&cwd)?;
            let outcome =
                workflow::encrypt(&ctx, &CryptOptions { includes: paths }, &reporter, &cancel)?;
            println!("encrypted {} file(s)", outcome.files.len());
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Decrypt { paths } => {
            let ctx = project_context(&cwd)?;
            let outcome =
                workflow::decrypt(&ctx, &CryptOptions { includes: paths }, &reporter, &cancel)?;
            println!("decrypted {} file(s)", outcome.files.len());
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Sync { dry_run } => {
            let ctx = project_context(&cwd)?;
            workflow::sync(&ctx, &workflow::SyncOptions { dry_run }, &reporter, &cancel)?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Rotate { force } => {
            let ctx = project_context(&cwd)?;
            if !force
                && !confirm("Replace your keypair for this project? This cannot be undone.")?
            {
                println!("aborted");
                return Ok(ExitCode::SUCCESS);
            }
            workflow::rotate(&ctx, &reporter, &cancel)?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Remove { user } => {
            let ctx = project_context(&cwd)?;
            workflow::remove_user(&ctx, &user, &reporter, &cancel)?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Status { json } => {
            let ctx = project_context(&cwd)?;
            let report = workflow::status(&ctx, &cancel)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report)
                        .map_err(|e| Error::Internal(e.to_string()))?
                );
            } else {
                render_status(&report);
            }
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Doctor { json } => {
            let ctx = project_context(&cwd)?;
            let report = workflow::doctor(&ctx, &cancel)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report)
                        .map_err(|e| Error::Internal(e.to_string()))?
                );
            } else {
                render_doctor(&report);
            }
            Ok(match report.overall {
                CheckStatus::Pass => ExitCode::SUCCESS,
                CheckStatus::Warning => ExitCode::from(1),
                CheckStatus::Error => ExitCode::from(2),
            })
        }
        SecretsCmd::Export { output } => {
            let ctx = project_context(&cwd)?;
            workflow::export(
                &ctx,
                &workflow::ExportOptions { output },
                &reporter,
                &cancel,
            )?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Import { archive, force } => {
            let ctx = Context::new(&cwd)?;
            workflow::import(
                &ctx,
                &workflow::ImportOptions { archive, force },
                &reporter,
                &cancel,
            )?;
            Ok(ExitCode::SUCCESS)
        }
        SecretsCmd::Audit { action, since } => {
            let ctx = project_context(&cwd)?;
            let since = match since {
                Some(text) => Some(
                    DateTime::parse_from_rfc3339(&text)
                        .map_err(|e| Error::Internal(format!("invalid --since timestamp: {e}")))?
                        .into(),
                ),
                None => None,
            };
            let store = ProjectStore::open(&ctx.project_root)?;
            let entries = AuditLog::for_project(&store).read(&AuditFilter {
                action,
                since,
                until: None,
            })?;
            for entry in &entries {
                let device = entry.device_uuid.as_deref().unwrap_or("-");
                let target = entry.target.as_deref().unwrap_or("-");
                println!(
                    "{}  {:<12} user={} device={} target={}",
                    entry.timestamp.to_rfc3339(),
                    entry.action,
                    entry.user_uuid,
                    device,
                    target
                );
            }
            if entries.is_empty() {
                println!("no audit entries");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Walk up from `start` to the directory holding `.kanuka/`; fall back to
/// `start` so workflows report `ProjectNotInitialized` themselves.
fn find_project_root(start: &Path) -> PathBuf {
    let mut dir = start;
    loop {
        if dir.join(".kanuka").is_dir() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return start.to_path_buf(),
        }
    }
}

fn project_context(cwd: &Path) -> Result<Context, Error> {
    let root = find_project_root(cwd);
    tracing::debug!(root = %root.display(), "resolved project root");
    Context::new(root)
}

/// Email for user records: the flag, or this machine's git identity.
fn resolve_email(flag: Option<String>) -> Result<String, Error> {
    if let Some(email) = flag {
        return Ok(email);
    }
    let output = Command::new("git")
        .args(["config", "user.email"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty());
    output.ok_or_else(|| {
        Error::InvalidUserConfig(
            "no email given; pass --email or set `git config user.email`".into(),
        )
    })
}

fn confirm(prompt: &str) -> Result<bool, Error> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| Error::io("stdin", e))?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn render_status(report: &workflow::StatusReport) {
    println!("Project: {}", report.project);
    if report.files.is_empty() {
        println!("no secret files");
        return;
    }
    for file in &report.files {
        let state = match file.status {
            workflow::FileState::Current => "current",
            workflow::FileState::Stale => "stale",
            workflow::FileState::Unencrypted => "unencrypted",
            workflow::FileState::EncryptedOnly => "encrypted-only",
        };
        println!("  {:<14} {}", state, file.path.display());
    }
    let s = &report.summary;
    println!(
        "{} current, {} stale, {} unencrypted, {} encrypted-only",
        s.current, s.stale, s.unencrypted, s.encrypted_only
    );
}

fn render_doctor(report: &workflow::DoctorReport) {
    for check in &report.checks {
        let mark = match check.status {
            CheckStatus::Pass => "✅",
            CheckStatus::Warning => "⚠️ ",
            CheckStatus::Error => "❌",
        };
        println!("{mark} {}: {}", check.name, check.message);
        if let Some(suggestion) = &check.suggestion {
            if check.status != CheckStatus::Pass {
                println!("   suggestion: {suggestion}");
            }
        }
    }
    println!("overall: {:?}", report.overall);
}
