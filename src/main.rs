use std::env;
use std::process;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use rcsync::config::{BackendKind, SyncConfig};
use rcsync::engine::{self, StatusOptions, SyncOptions};
use rcsync::error::SyncError;
use rcsync::prompt::StdinPrompt;
use rcsync::propagate::ProgressCallback;
use rcsync::reconcile::{
    ConflictResolver, FailOnConflict, Interactive, NewestWins, PreferReplica, SkipConflicts,
};
use rcsync::transfer::{self, TransferBackend};
use rcsync::{InitOutcome, Repository, Status};

#[derive(Parser)]
#[command(name = "rcsync")]
#[command(about = "Keep a directory in sync with any number of rclone remotes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// The rclone executable
    #[arg(long, env = "RCSYNC_RCLONE", default_value = "rclone", global = true)]
    rclone: String,

    /// How replicas are accessed
    #[arg(long, value_enum, default_value_t = Backend::Rclone, global = true)]
    backend: Backend,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Every location goes through rclone
    Rclone,
    /// Locations are plain directories
    Fs,
}

#[derive(Clone, Copy, ValueEnum)]
enum Conflicts {
    /// Ask which version wins
    Ask,
    /// Leave conflicts for the next sync
    Skip,
    /// The most recently modified version wins
    Newest,
    /// Stop at the first conflict
    Fail,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking the current directory
    Init,

    /// Show what changed since the last sync
    Status {
        /// Also list files that are in sync
        #[arg(long)]
        all: bool,
    },

    /// Propagate changes between the local directory and every remote
    Sync {
        /// Only show what would be done
        #[arg(long)]
        dry_run: bool,

        /// How conflicts are resolved
        #[arg(long, value_enum, default_value_t = Conflicts::Ask)]
        conflicts: Conflicts,

        /// Resolve every conflict in favour of this replica (`local` or a remote)
        #[arg(long, conflicts_with = "conflicts")]
        prefer: Option<String>,
    },

    /// Register a remote, copying every local file it lacks
    Addremote {
        /// rclone location, such as `drive:backup/docs`
        remote: String,

        /// Only show what would be copied
        #[arg(long)]
        dry_run: bool,
    },

    /// Forget a remote
    Rmremote { remote: String },

    /// List the registered remotes
    Remotes,
}

/// Prints propagation progress on the terminal.
struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn propagating(&self, path: &str, status: Status, from: &str) {
        println!("{}: {} ({})", status, path, from);
    }

    fn copying(&self, path: &str, _from: &str, to: &str) {
        println!("  -> {} ({})", path, to);
    }

    fn deleting(&self, path: &str, at: &str) {
        println!("  x {} ({})", path, at);
    }

    fn failed(&self, path: &str, error: &SyncError) {
        eprintln!("failed: {}: {}", path, error);
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns false if the command finished but left failures behind.
fn run(cli: Cli) -> Result<bool> {
    let config = SyncConfig {
        backend: match cli.backend {
            Backend::Rclone => BackendKind::Rclone,
            Backend::Fs => BackendKind::Filesystem,
        },
        rclone_program: cli.rclone,
    };
    let backend = transfer::backend_for(&config);
    let cwd = env::current_dir().context("can't determine the working directory")?;

    if let Commands::Init = cli.command {
        match Repository::init(&cwd, backend.as_ref())? {
            InitOutcome::Initialized(repo) => {
                println!("Initialized repo in: {}", repo.root().display())
            }
            InitOutcome::AlreadyInitialized(root) => {
                println!("Already initialized: {}", root.display())
            }
        }
        return Ok(true);
    }

    let repo = Repository::open(&cwd)?;
    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Status { all } => status(&repo, backend.as_ref(), all),
        Commands::Sync {
            dry_run,
            conflicts,
            prefer,
        } => {
            let _lock = repo.lock()?;
            let mut resolver: Box<dyn ConflictResolver> = match (prefer, conflicts) {
                (Some(label), _) => Box::new(PreferReplica { label }),
                (None, Conflicts::Ask) => Box::new(Interactive::new(StdinPrompt)),
                (None, Conflicts::Skip) => Box::new(SkipConflicts),
                (None, Conflicts::Newest) => Box::new(NewestWins),
                (None, Conflicts::Fail) => Box::new(FailOnConflict),
            };
            sync(&repo, backend.as_ref(), resolver.as_mut(), dry_run)
        }
        Commands::Addremote { remote, dry_run } => {
            let _lock = repo.lock()?;
            let report = repo.add_remote(&remote, backend.as_ref(), dry_run, &ConsoleProgress)?;
            if report.dry_run {
                println!("{} files would be copied to {}", report.seeded.len(), remote);
            } else {
                println!("Added {} ({} files copied)", remote, report.seeded.len());
            }
            Ok(true)
        }
        Commands::Rmremote { remote } => {
            let _lock = repo.lock()?;
            repo.remove_remote(&remote)?;
            println!("Removed {}", remote);
            Ok(true)
        }
        Commands::Remotes => {
            for remote in repo.remotes()? {
                println!("{}", remote);
            }
            Ok(true)
        }
    }
}

fn status(repo: &Repository, backend: &dyn TransferBackend, all: bool) -> Result<bool> {
    let version = backend.version()?;
    println!("Backend: {}", version.lines().next().unwrap_or(""));
    println!("Local Path: {}", repo.root().display());
    println!("Remote Paths:");
    for remote in repo.remotes()? {
        println!("  {}", remote);
    }
    println!();
    println!("Files:");

    let started = Instant::now();
    let state = repo.load_state(backend)?;
    let report = engine::status(&state, &StatusOptions { all });
    for line in &report.lines {
        println!("{}", line);
    }
    println!();
    println!(
        "Total Files: {}, Changed: {}, Time: {:.3}s",
        report.total_files,
        report.changed_files,
        started.elapsed().as_secs_f64()
    );
    Ok(true)
}

fn sync(
    repo: &Repository,
    backend: &dyn TransferBackend,
    resolver: &mut dyn ConflictResolver,
    dry_run: bool,
) -> Result<bool> {
    let started = Instant::now();
    let mut state = repo.load_state(backend)?;
    let options = SyncOptions { dry_run };
    let report = engine::sync(
        &mut state,
        repo.archive(),
        backend,
        resolver,
        &options,
        &ConsoleProgress,
    )?;

    for conflict in &report.unresolved {
        print!("{}", conflict);
    }
    if !report.failures.is_empty() {
        eprintln!("{} paths failed:", report.failures.len());
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.path, failure.error);
        }
    }
    println!("Time: {:.3}s", started.elapsed().as_secs_f64());

    if dry_run && report.propagated + report.unresolved.len() == 0 {
        println!("Nothing to do");
    }
    Ok(report.is_success())
}
