//! Recoverable File Sink operator tool
//!
//! Works on descriptor files, i.e. the encoded resume or commit descriptors a
//! job stored in its checkpoint state, against the local filesystem.
//!
//! # Usage
//!
//! ```bash
//! # Show what a descriptor refers to and where it stands
//! filesink-ctl inspect part-0.fsrd --state
//!
//! # Finish the commits of a checkpoint by hand
//! filesink-ctl --config sink.toml commit part-0.fsrd part-1.fsrd
//!
//! # Remove abandoned staging files older than an hour
//! filesink-ctl clean out/ --retention-secs 3600 --live part-2.fsrd
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filesink_core::commit::{CommitOutcome, Committer, LoggingListener};
use filesink_core::recoverable::{decode, CommitDescriptor, Descriptor};
use filesink_core::storage::{FileStore, LocalStorage};
use filesink_core::{SinkConfig, StagingJanitor};

/// Recoverable File Sink control tool
#[derive(Parser, Debug)]
#[command(name = "filesink-ctl")]
#[command(about = "Inspect, commit and clean up recoverable file sink state")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode and print descriptor files
    Inspect {
        /// Encoded descriptor files
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,

        /// Also report whether each file is pending or committed
        #[arg(long)]
        state: bool,
    },

    /// Commit descriptor files in order, stopping at the first failure
    Commit {
        /// Encoded descriptor files, in checkpoint order
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,
    },

    /// Remove abandoned staging files from a directory
    Clean {
        /// Directory to scan, relative to the storage base path
        dir: PathBuf,

        /// Override the configured retention in seconds
        #[arg(long)]
        retention_secs: Option<u64>,

        /// Report what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Descriptor files whose staging files must be kept
        #[arg(long)]
        live: Vec<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> filesink_core::Result<SinkConfig> {
    let config = match path {
        Some(path) => SinkConfig::from_file(path)?,
        None => SinkConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn read_descriptor(path: &Path) -> Result<Descriptor, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("failed to read descriptor '{}': {e}", path.display()))?;
    Ok(decode(&bytes)?)
}

fn inspect(
    storage: Arc<dyn FileStore>,
    config: &SinkConfig,
    files: &[PathBuf],
    show_state: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let committer = Committer::new(storage, config);

    for file in files {
        let descriptor = read_descriptor(file)?;
        let kind = descriptor.kind();
        let committable = descriptor.into_commit();

        println!("{}:", file.display());
        println!("  kind:        {kind:?}");
        println!("  commit name: {}", committable.commit_name());
        println!("  target:      {}", committable.target().display());
        println!("  staging:     {}", committable.staging().display());
        println!("  offset:      {}", committable.offset());
        if show_state {
            match committer.state_of(&committable) {
                Ok(state) => println!("  state:       {state:?}"),
                Err(e) => println!("  state:       unrecoverable ({e})"),
            }
        }
    }
    Ok(())
}

fn commit(
    storage: Arc<dyn FileStore>,
    config: &SinkConfig,
    files: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let committables = files
        .iter()
        .map(|f| read_descriptor(f).map(Descriptor::into_commit))
        .collect::<Result<Vec<CommitDescriptor>, _>>()?;

    let committer = Committer::new(storage, config).with_listener(LoggingListener);

    match committer.commit_all(&committables) {
        Ok(reports) => {
            for report in reports {
                let outcome = match report.outcome {
                    CommitOutcome::Committed => "committed",
                    CommitOutcome::AlreadyCommitted => "already committed",
                };
                println!("{}: {outcome}", report.commit_name);
                for err in &report.listener_errors {
                    tracing::warn!(error = %err, "listener failed");
                }
            }
            Ok(())
        }
        Err(failure) => {
            for report in &failure.committed {
                println!("{}: committed", report.commit_name);
            }
            Err(failure.into())
        }
    }
}

fn clean(
    storage: Arc<dyn FileStore>,
    mut config: SinkConfig,
    dir: &Path,
    retention_secs: Option<u64>,
    dry_run: bool,
    live_files: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(secs) = retention_secs {
        config.cleanup.retention_secs = secs;
    }
    config.cleanup.dry_run |= dry_run;
    config.validate()?;

    let mut live = HashSet::new();
    for file in live_files {
        let committable = read_descriptor(file)?.into_commit();
        live.insert(committable.staging().to_path_buf());
    }

    let janitor = StagingJanitor::new(storage, &config);
    let report = janitor.clean(dir, &live, SystemTime::now())?;

    let verb = if report.dry_run { "would remove" } else { "removed" };
    for path in &report.removed {
        println!("{verb} {}", path.display());
    }
    println!(
        "scanned {}, {verb} {}, retained {}, errors {}",
        report.scanned,
        report.removed.len(),
        report.retained,
        report.errors.len()
    );

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} staging files could not be cleaned", report.errors.len()).into())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(args.config.as_deref())?;
    let storage: Arc<dyn FileStore> = Arc::new(LocalStorage::new(&config.storage)?);

    tracing::debug!(base_path = %config.storage.base_path.display(), "using local storage");

    match args.command {
        Command::Inspect { descriptors, state } => inspect(storage, &config, &descriptors, state),
        Command::Commit { descriptors } => commit(storage, &config, &descriptors),
        Command::Clean {
            dir,
            retention_secs,
            dry_run,
            live,
        } => clean(storage, config, &dir, retention_secs, dry_run, &live),
    }
}
