use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use patchset::config::load_from_path;
use patchset::orchestrator::{History, InstalledPackage, Orchestrator, OrchestratorError, PatchOutcome};
use patchset::{Fetcher, PatchTool, SemverMatcher};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_MANIFEST: &str = "patchset.toml";

#[derive(Parser)]
#[command(name = "patchset")]
#[command(about = "Resolve patch sets and apply them to installed packages", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Manifest of installed packages (default: $PATCHSET_MANIFEST, then ./patchset.toml)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Patch executable to use instead of searching PATH (or $PATCHSET_PATCH_BIN)
    #[arg(long, global = true)]
    patch_bin: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all patches to the installed packages
    Apply,

    /// Revert every patch affecting a package
    Restore {
        /// Package name as listed in the manifest
        package: String,
    },

    /// Show the patches that target a package
    List {
        /// Package name as listed in the manifest
        package: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let manifest = resolve_manifest(cli.manifest)?;
    let session = Session::load(&manifest, patch_bin(cli.patch_bin))?;

    match cli.command {
        Commands::Apply => cmd_apply(&session),
        Commands::Restore { package } => cmd_restore(&session, &package),
        Commands::List { package } => cmd_list(&session, &package),
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();
    Ok(())
}

/// Resolve the manifest path
///
/// Priority order:
/// 1. Explicit --manifest flag
/// 2. PATCHSET_MANIFEST environment variable
/// 3. ./patchset.toml
fn resolve_manifest(flag: Option<PathBuf>) -> Result<PathBuf> {
    let path = flag
        .or_else(|| env::var_os("PATCHSET_MANIFEST").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST));

    if path.is_file() {
        return Ok(path);
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}",
        format!("Manifest not found: {}", path.display()).red(),
        "Try one of:".bold(),
        "1. Specify explicitly: patchset --manifest path/to/patchset.toml apply",
        "2. Set environment variable: export PATCHSET_MANIFEST=path/to/patchset.toml"
    )
}

fn patch_bin(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| env::var_os("PATCHSET_PATCH_BIN").map(PathBuf::from))
}

/// Everything a command needs, built from the manifest.
struct Session {
    packages: Vec<InstalledPackage>,
    fetcher: Fetcher,
    matcher: SemverMatcher,
    tool: PatchTool,
}

impl Session {
    fn load(manifest: &Path, patch_bin: Option<PathBuf>) -> Result<Self> {
        let loaded = load_from_path(manifest)?;
        let tool = match patch_bin {
            Some(program) => PatchTool::new().with_program(program),
            None => PatchTool::new(),
        };

        Ok(Self {
            packages: loaded.packages(),
            fetcher: loaded.fetcher(),
            matcher: SemverMatcher,
            tool,
        })
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.fetcher, &self.matcher, &self.tool)
    }
}

fn cmd_apply(session: &Session) -> Result<()> {
    println!("{}", "Maintaining patches".bold());

    let report = match session
        .orchestrator()
        .apply(&session.packages, &mut History::new())
    {
        Ok(report) => report,
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    };

    for entry in &report.entries {
        let symbol = match entry.outcome {
            PatchOutcome::Applied => "✓".green(),
            PatchOutcome::AlreadyApplied => "⊙".yellow(),
            _ => "⊘".cyan(),
        };
        println!(
            "{} {}: {} ({})",
            symbol,
            entry.package,
            entry.label(),
            entry.outcome
        );
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} applied",
        report.count(&PatchOutcome::Applied).to_string().green()
    );
    println!(
        "  {} already applied",
        report.count(&PatchOutcome::AlreadyApplied).to_string().yellow()
    );
    println!(
        "  {} duplicates skipped",
        report.count(&PatchOutcome::Duplicate).to_string().cyan()
    );

    Ok(())
}

fn cmd_restore(session: &Session, package: &str) -> Result<()> {
    let report = session
        .orchestrator()
        .restore(package, &session.packages, &mut History::new())?;

    if report.entries.is_empty() {
        println!("{}", format!("No patches affect {package}").dimmed());
        return Ok(());
    }

    for entry in &report.entries {
        match &entry.outcome {
            PatchOutcome::RevertFailed { reason } => {
                eprintln!(
                    "{} {}: {} could not be reverted (was probably not applied)",
                    "✗".red(),
                    entry.package,
                    entry.label()
                );
                eprintln!("  {}", reason.dimmed());
            }
            outcome => println!(
                "{} {}: {} ({})",
                "✓".green(),
                entry.package,
                entry.label(),
                outcome
            ),
        }
    }

    let failures = report.failures();
    if failures > 0 {
        println!(
            "{}",
            format!("{failures} patch(es) could not be reverted").yellow()
        );
    }
    Ok(())
}

fn cmd_list(session: &Session, package: &str) -> Result<()> {
    let listed = session.orchestrator().list(package, &session.packages)?;

    if listed.is_empty() {
        println!("{}", format!("No patches for {package}").dimmed());
        return Ok(());
    }

    for (source, patches) in listed {
        println!("{} {}", "From".bold(), source.cyan());
        for patch in patches {
            match patch.title() {
                Some(title) => println!("  {} {}", patch.checksum().dimmed(), title),
                None => println!("  {} {}", patch.checksum().dimmed(), patch.url()),
            }
            for path in patch.file_additions()? {
                println!("      {} {}", "+".green(), path);
            }
            for path in patch.file_deletions()? {
                println!("      {} {}", "-".red(), path);
            }
        }
    }

    Ok(())
}

fn report_failure(err: &OrchestratorError) {
    eprintln!("{} {}", "✗".red(), err.to_string().red());
    if let OrchestratorError::PatchFailed { rolled_back, .. } = err {
        if *rolled_back > 0 {
            eprintln!("  {}", format!("Rolled back {rolled_back} patch(es)").yellow());
        }
    }
}
