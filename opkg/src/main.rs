#![deny(missing_docs)]

//! CLI binary interface for `opkg`.
//!
//! Deliberately thin: every command here does three things — build a
//! [`Workspace`], call straight into [`opkg::ops`], and render the report.
//! No business logic lives in this file.

use std::io::IsTerminal;

use camino::Utf8PathBuf;
use clap::Parser;
use console::Term;
use miette::IntoDiagnostic;
use opkg::cli::{Cli, Commands, InstallArgs, RemoveArgs, SaveArgs, StatusArgs, UninstallArgs, ViewArgs};
use opkg::errors::{OpkgError, Result};
use opkg::ops::{self, InstallOptions, ResourceFilter, Workspace};
use opkg::resolver::ConflictHandler;
use opkg::transport::{OfflineRegistryClient, ShellGitFetcher};
use opkg_schema::{PackageName, PlatformId, ResourceKind};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(report) = real_main(&cli) {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

fn init_tracing(level: tracing::level_filters::LevelFilter) {
    use tracing_subscriber::prelude::*;
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// A [`ConflictHandler`] that prompts on a real terminal;
/// never constructed when stdin isn't a TTY or `--force` was passed.
struct InteractiveConflictHandler;

impl ConflictHandler for InteractiveConflictHandler {
    fn resolve(&self, package: &PackageName, candidates: &[(PackageName, String)]) -> Option<semver::Version> {
        let items: Vec<String> = candidates
            .iter()
            .map(|(requester, range)| format!("{range} (requested by {requester})"))
            .collect();
        let choice = dialoguer::Select::new()
            .with_prompt(format!("`{package}` has conflicting version requirements — pick one"))
            .items(&items)
            .default(0)
            .interact_opt()
            .ok()??;
        let (_, range) = &candidates[choice];
        // A bare range isn't necessarily a concrete version; take its
        // minimal satisfying bound as the adopted version, same as the
        // wave resolver would for a single-constraint package.
        semver::VersionReq::parse(range)
            .ok()
            .and_then(|_| semver::Version::parse(range.trim_start_matches(['^', '~', '='])).ok())
    }
}

fn is_interactive(force: bool) -> bool {
    !force && std::io::stdin().is_terminal()
}

fn open_workspace<'a>(
    root: &Utf8PathBuf,
    registry: &'a OfflineRegistryClient,
    git: &'a ShellGitFetcher,
) -> Result<Workspace<'a>> {
    Workspace::open(root.clone(), registry, git)
}

fn real_main(cli: &Cli) -> Result<()> {
    let root = std::env::current_dir()
        .map_err(OpkgError::Io)
        .and_then(|p| Utf8PathBuf::from_path_buf(p).map_err(|p| OpkgError::validation(format!("workspace root {p:?} is not valid UTF-8"))))?;

    let git = ShellGitFetcher::new();
    let mirror_root = root.join(".opkg-cache").join("registry-mirror");
    let registry = OfflineRegistryClient::new(mirror_root);

    match &cli.command {
        Commands::Install(args) => cmd_install(&root, &registry, &git, args, false),
        Commands::Add(args) => cmd_install(&root, &registry, &git, args, true),
        Commands::Uninstall(args) => cmd_uninstall(&root, &registry, &git, args),
        Commands::Save(args) => cmd_save(&root, &registry, &git, args),
        Commands::View(args) => cmd_view(&root, &registry, &git, args),
        Commands::Status(args) => cmd_status(&root, &registry, &git, args),
        Commands::Remove(args) => cmd_remove(&root, &registry, &git, args),
    }
}

fn resource_filter(plugins: bool, agents: &[String], skills: &[String]) -> Result<ResourceFilter> {
    ops::validate_resource_flags(plugins, agents, skills)?;
    let mut filter = ResourceFilter::default();
    if !agents.is_empty() {
        filter.kinds.push(ResourceKind::Agent);
        filter.names.extend(agents.iter().cloned());
    }
    if !skills.is_empty() {
        filter.kinds.push(ResourceKind::Skill);
        filter.names.extend(skills.iter().cloned());
    }
    Ok(filter)
}

fn cmd_install(
    root: &Utf8PathBuf,
    registry: &OfflineRegistryClient,
    git: &ShellGitFetcher,
    args: &InstallArgs,
    is_add: bool,
) -> Result<()> {
    let Some(input) = &args.input else {
        return Err(OpkgError::validation(if is_add {
            "`opkg add` needs a package input"
        } else {
            "`opkg install` needs a package input"
        }));
    };

    let handler = InteractiveConflictHandler;
    let interactive = is_interactive(args.force);
    let mut workspace = open_workspace(root, registry, git)?;
    if interactive {
        workspace = workspace.with_conflict_handler(&handler);
    }

    let registry_mode = match (args.remote, args.local) {
        (true, _) => Some(opkg_source::RegistryMode::RemotePrimary),
        (_, true) => Some(opkg_source::RegistryMode::CacheFirst),
        _ => None,
    };

    let options = InstallOptions {
        input: input.clone(),
        platforms: args.platforms.iter().cloned().map(PlatformId::new).collect(),
        resources: resource_filter(args.plugins, &args.agents, &args.skills)?,
        dry_run: args.dry_run,
        force: args.force,
        conflicts: args.conflicts.into(),
        registry_mode,
    };

    let report = ops::install(&workspace, &options)?;
    print_install_report(&report, args.dry_run);
    Ok(())
}

fn print_install_report(report: &ops::InstallReport, dry_run: bool) {
    let out = Term::stdout();
    let verb = if dry_run { "would install" } else { "installed" };
    for pkg in &report.installed {
        let version = pkg.version.as_ref().map(|v| format!(" v{v}")).unwrap_or_default();
        println!(
            "{} {}{} ({} file{})",
            out.style().green().apply_to(verb),
            pkg.name,
            version,
            pkg.written.len(),
            if pkg.written.len() == 1 { "" } else { "s" },
        );
        for warning in &pkg.warnings {
            eprintln!("  {}: {warning}", out.style().yellow().apply_to("warning"));
        }
    }
    for name in &report.already_covered {
        println!("{} {name} (already fully installed)", out.style().dim().apply_to("skipped"));
    }
    if !report.conflicts.is_empty() {
        let mut table = comfy_table::Table::new();
        table.set_header(vec!["target", "winner", "losers"]);
        for conflict in &report.conflicts {
            let losers: Vec<String> = conflict.losers.iter().map(|l| l.package.to_string()).collect();
            table.add_row(vec![conflict.target.as_str().to_string(), conflict.winner.to_string(), losers.join(", ")]);
        }
        println!("{table}");
    }
    for failure in &report.failures {
        eprintln!("{}: {failure}", out.style().red().apply_to("failed"));
    }
}

fn cmd_uninstall(
    root: &Utf8PathBuf,
    registry: &OfflineRegistryClient,
    git: &ShellGitFetcher,
    args: &UninstallArgs,
) -> Result<()> {
    let workspace = open_workspace(root, registry, git)?;

    if args.list {
        for entry in ops::status(&workspace)? {
            let outcome = ops::uninstall_package(&workspace, &entry.name, None)?;
            print_uninstall_outcome(&entry.name, &outcome);
        }
        return Ok(());
    }

    let Some(name) = &args.name else {
        return Err(OpkgError::validation("`opkg uninstall` needs a package name, or --list"));
    };
    let name = PackageName::normalize(name);
    let outcome = ops::uninstall_package(&workspace, &name, None)?;
    print_uninstall_outcome(&name, &outcome);
    Ok(())
}

fn print_uninstall_outcome(name: &PackageName, outcome: &ops::UninstallReport) {
    use opkg::uninstall::TargetAction;
    println!("uninstalled {name}:");
    for action in &outcome.actions {
        match action {
            TargetAction::Deleted(p) => println!("  deleted {p}"),
            TargetAction::Rewritten(p) => println!("  rewrote {p}"),
            TargetAction::EmptiedAndDeleted(p) => println!("  emptied and deleted {p}"),
            TargetAction::AlreadyGone(p) => println!("  already gone: {p}"),
        }
    }
    for dir in &outcome.directories_removed {
        println!("  removed empty directory {dir}");
    }
}

fn cmd_remove(
    root: &Utf8PathBuf,
    registry: &OfflineRegistryClient,
    git: &ShellGitFetcher,
    args: &RemoveArgs,
) -> Result<()> {
    let workspace = open_workspace(root, registry, git)?;
    if args.dry_run {
        // `remove_resource` has no dry-run mode of its own; report intent
        // without touching the workspace index or filesystem.
        println!("would remove resource `{}`", args.resource);
        return Ok(());
    }
    let outcome = ops::remove_resource(&workspace, &args.resource)?;
    println!("removed resource `{}`:", args.resource);
    for action in &outcome.actions {
        println!("  {action:?}");
    }
    Ok(())
}

fn cmd_save(
    root: &Utf8PathBuf,
    registry: &OfflineRegistryClient,
    git: &ShellGitFetcher,
    _args: &SaveArgs,
) -> Result<()> {
    let workspace = open_workspace(root, registry, git)?;
    let report = ops::save_all(&workspace)?;
    for path in &report.written {
        println!("wrote {path}");
    }
    for path in &report.unchanged {
        println!("unchanged {path}");
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn cmd_view(
    root: &Utf8PathBuf,
    registry: &OfflineRegistryClient,
    git: &ShellGitFetcher,
    args: &ViewArgs,
) -> Result<()> {
    let workspace = open_workspace(root, registry, git)?;
    let (package, base, resources) = ops::view(&workspace, &args.input)?;
    println!("{} ({})", package.name, package.version.as_ref().map(ToString::to_string).unwrap_or_else(|| "no version".to_string()));
    println!("base: {}", if base.as_str().is_empty() { "." } else { base.as_str() });

    let mut table = comfy_table::Table::new();
    table.set_header(vec!["kind", "name", "source"]);
    for resource in &resources {
        table.add_row(vec![format!("{:?}", resource.kind), resource.name.clone(), resource.source_path.to_string()]);
    }
    println!("{table}");
    Ok(())
}

fn cmd_status(
    root: &Utf8PathBuf,
    registry: &OfflineRegistryClient,
    git: &ShellGitFetcher,
    args: &StatusArgs,
) -> Result<()> {
    let workspace = open_workspace(root, registry, git)?;
    let entries = ops::status(&workspace)?;

    if args.json {
        let json = serde_json::to_string_pretty(
            &entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "name": e.name.as_str(),
                        "version": e.version,
                        "path": e.path.as_str(),
                        "targets": e.target_count,
                    })
                })
                .collect::<Vec<_>>(),
        )
        .into_diagnostic()?;
        println!("{json}");
        return Ok(());
    }

    let mut table = comfy_table::Table::new();
    table.set_header(vec!["package", "version", "path", "targets"]);
    for entry in &entries {
        table.add_row(vec![
            entry.name.to_string(),
            entry.version.clone().unwrap_or_else(|| "-".to_string()),
            entry.path.to_string(),
            entry.target_count.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
