//! CLI struct definitions for the `crew` command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "crew",
    version = env!("CARGO_PKG_VERSION"),
    about = "Install, update, back up and verify agent, command and hook files for the crew framework."
)]
pub(crate) struct Cli {
    /// Installation root (defaults to $CREW_HOME, then ~/.claude).
    #[clap(long, global = true)]
    pub dir: Option<PathBuf>,
    /// Operate on the project installation at `<PROJECT>/.claude` instead of the global one.
    #[clap(long, global = true)]
    pub project: Option<PathBuf>,
    /// Log at debug level.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Install components (all when none are named)
    Install(BatchCli),
    /// Update installed components, saving their previous files
    Update(BatchCli),
    /// Remove components' own files, leaving user files alone
    Uninstall(BatchCli),
    /// Show available and installed component versions
    Status,
    /// Create, inspect, restore and prune installation archives
    Backup(BackupCli),
    /// Maintain the unified metadata record
    Metadata(MetadataCli),
    /// Track and check file integrity
    Integrity(IntegrityCli),
    /// Toggle feature flags
    Feature(FeatureCli),
    /// Copy project-scoped files from the global installation into a project
    Sync(SyncCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct BatchCli {
    /// Component names, processed in the given order.
    pub components: Vec<String>,
    /// Log what would happen without touching anything.
    #[clap(long)]
    pub dry_run: bool,
    /// Overwrite existing target files.
    #[clap(long)]
    pub force: bool,
    /// Skip the pre-operation backup.
    #[clap(long)]
    pub no_backup: bool,
    /// Back up even when the installation is empty.
    #[clap(long, conflicts_with = "no_backup")]
    pub backup: bool,
    /// Template source root (overrides CREW_SOURCE and crew.toml).
    #[clap(long)]
    pub source: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct BackupCli {
    #[clap(subcommand)]
    pub command: BackupCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum BackupCommand {
    /// Archive the installation
    Create {
        /// Free-form description, sanitized into the file name.
        #[clap(long)]
        description: Option<String>,
        /// none, gzip or bzip2 (defaults to crew.toml).
        #[clap(long)]
        compression: Option<String>,
        /// Include `.crew/logs` and `*.log` files.
        #[clap(long)]
        include_logs: bool,
        /// Leave `.crew/config` out of the archive.
        #[clap(long)]
        no_config: bool,
        /// Write the archive here instead of `.crew/backups`.
        #[clap(long)]
        dest: Option<PathBuf>,
    },
    /// List archives, newest first
    List,
    /// Show one archive's metadata
    Info { archive: PathBuf },
    /// Restore an archive into the installation (or --target)
    Restore {
        archive: PathBuf,
        #[clap(long)]
        target: Option<PathBuf>,
        /// Replace files that already exist.
        #[clap(long)]
        overwrite: bool,
    },
    /// Re-hash an archive against its recorded checksum
    Verify { archive: PathBuf },
    /// Remove old archives
    Cleanup {
        /// Archives to keep (0 disables; defaults to crew.toml).
        #[clap(long)]
        keep: Option<usize>,
        /// Maximum age in days (0 disables; defaults to crew.toml).
        #[clap(long)]
        max_age_days: Option<u64>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct MetadataCli {
    #[clap(subcommand)]
    pub command: MetadataCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MetadataCommand {
    /// Reconcile the record with the files on disk
    Refresh,
    /// Print the record as JSON
    Show,
    /// Bump a document's version
    SetVersion { document: String, version: String },
    /// Mark components with a newer available version as outdated
    FlagOutdated,
}

#[derive(clap::Args, Debug)]
pub(crate) struct IntegrityCli {
    #[clap(subcommand)]
    pub command: IntegrityCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum IntegrityCommand {
    /// Re-hash every tracked file
    Check,
    /// Start tracking a file (path relative to the installation root)
    Track {
        path: String,
        #[clap(long, default_value = "core")]
        component: String,
    },
    /// Stop tracking a file
    Untrack { path: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct FeatureCli {
    #[clap(subcommand)]
    pub command: FeatureCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum FeatureCommand {
    Enable {
        name: String,
        #[clap(long, default_value = "")]
        version: String,
        #[clap(long, default_value = "")]
        description: String,
    },
    Disable { name: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct SyncCli {
    /// Replace project files that differ from the global copy.
    #[clap(long)]
    pub overwrite: bool,
    #[clap(long)]
    pub dry_run: bool,
}
