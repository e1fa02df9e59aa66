//! All the clap stuff for parsing/documenting the CLI surface: subcommands,
//! flags, and the argument types they share with `ops`.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::ops::ConflictPolicy;

#[derive(Parser, Clone, Debug)]
#[clap(version)]
#[clap(bin_name = "opkg")]
/// A cross-platform package manager for AI assistant configuration assets
/// — agents, skills, rules, commands, hooks, and MCP server entries.
pub struct Cli {
    /// Subcommand to run.
    #[clap(subcommand)]
    pub command: Commands,

    /// How verbose logging should be.
    #[clap(long, short)]
    #[clap(default_value_t = LevelFilter::WARN)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub verbose: LevelFilter,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Install a package (and its transitive dependencies) into the
    /// workspace.
    Install(InstallArgs),
    /// Remove a whole installed package, or every installed package with
    /// `--list`.
    Uninstall(UninstallArgs),
    /// Re-derive every installed package's source files from the
    /// workspace's current target files.
    Save(SaveArgs),
    /// Show what a package would install without installing it.
    View(ViewArgs),
    /// Summarize every package currently installed in the workspace.
    Status(StatusArgs),
    /// Add a dependency to the workspace manifest and install it.
    Add(InstallArgs),
    /// Remove a single resource, wherever it's installed.
    Remove(RemoveArgs),
}

/// Options shared by `install` and `add`.
#[derive(Args, Clone, Debug)]
pub struct InstallArgs {
    /// A registry name, Git URL, or local path identifying the package.
    pub input: Option<String>,

    /// Install into the shared/global platform bucket only.
    #[clap(long)]
    pub global: bool,

    /// Report what would happen without writing anything.
    #[clap(long)]
    pub dry_run: bool,

    /// Proceed without interactive prompts, taking the non-interactive
    /// default at every decision point.
    #[clap(long)]
    pub force: bool,

    /// How to arbitrate a target more than one package wants to write.
    #[clap(long, value_enum, default_value_t = ConflictsArg::KeepBoth)]
    pub conflicts: ConflictsArg,

    /// Restrict installation to these platform ids (default: every
    /// loaded platform).
    #[clap(long, value_delimiter(','))]
    pub platforms: Vec<String>,

    /// Always re-fetch from the registry, bypassing the local cache.
    #[clap(long, conflicts_with = "local")]
    pub remote: bool,

    /// Use the local registry cache only; never re-fetch.
    #[clap(long, conflicts_with = "remote")]
    pub local: bool,

    /// Select a named registry mirror/auth profile.
    #[clap(long)]
    pub profile: Option<String>,

    /// Registry API key, for registry backends that require one.
    #[clap(long)]
    pub api_key: Option<String>,

    /// Install every resource kind (default). Cannot be combined with
    /// `--agents`/`--skills`.
    #[clap(long)]
    pub plugins: bool,

    /// Restrict installation to these named agents.
    #[clap(long, value_delimiter(','))]
    pub agents: Vec<String>,

    /// Restrict installation to these named skills.
    #[clap(long, value_delimiter(','))]
    pub skills: Vec<String>,
}

/// `--conflicts` values, mirroring [`ConflictPolicy`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConflictsArg {
    /// Winner in place, losers relocated under `_conflicts/<package>/…`.
    KeepBoth,
    /// Winner in place, losers dropped.
    Overwrite,
    /// Contested target left untouched.
    Skip,
    /// Ask interactively (falls back to `keep-both` non-interactively).
    Ask,
}

impl From<ConflictsArg> for ConflictPolicy {
    fn from(value: ConflictsArg) -> Self {
        match value {
            ConflictsArg::KeepBoth => ConflictPolicy::KeepBoth,
            ConflictsArg::Overwrite => ConflictPolicy::Overwrite,
            ConflictsArg::Skip => ConflictPolicy::Skip,
            ConflictsArg::Ask => ConflictPolicy::Ask,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct UninstallArgs {
    /// The package to uninstall.
    pub name: Option<String>,

    /// Uninstall every package currently installed.
    #[clap(long)]
    pub list: bool,
}

#[derive(Args, Clone, Debug)]
pub struct SaveArgs {}

#[derive(Args, Clone, Debug)]
pub struct ViewArgs {
    /// A registry name, Git URL, or local path identifying the package.
    pub input: String,
}

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// Print as JSON instead of a table.
    #[clap(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RemoveArgs {
    /// The resource's name (its source file's stem), wherever it's
    /// installed.
    pub resource: String,

    /// Report what would happen without writing anything.
    #[clap(long)]
    pub dry_run: bool,
}
