//! syncplan - snapshot, diff and reconciliation planning for file trees.
//!
//! Usage:
//!   syncplan scan PATH [-o FILE]          Export an inventory as JSON
//!   syncplan diff BEFORE AFTER            Show changes between two states
//!   syncplan plan TARGET SOURCE           Build a reconciliation plan
//!   syncplan --help                       Show help
//!
//! Every BEFORE/AFTER/TARGET/SOURCE argument is either a directory, which is
//! scanned, or an inventory JSON file written by `syncplan scan`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncplan_core::{Inventory, ScanConfig};
use syncplan_reconcile::{
    ChangeAction, ChangeRecord, ConflictMode, DiffStats, Differ, NoPriorState, Override,
    ReconcileConfig, ReconciliationPlan, Resolution, reconcile,
};
use syncplan_scan::InventoryScanner;

#[derive(Parser)]
#[command(
    name = "syncplan",
    version,
    about = "Snapshot, diff and reconciliation planning for file trees",
    long_about = "syncplan compares two states of a file tree and works out which \
                  changes can be propagated safely, which would overwrite newer \
                  data, and in what order to apply them."
)]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip hidden files and directories when scanning
    #[arg(long, global = true)]
    no_hidden: bool,

    /// Glob patterns to ignore when scanning (repeatable)
    #[arg(short, long = "ignore", global = true)]
    ignore: Vec<String>,

    /// Do not compute content checksums (size and mtime only)
    #[arg(long, global = true)]
    no_checksums: bool,

    /// Report same-size files without checksums as uncertain changes when
    /// their modification times differ
    #[arg(long, global = true)]
    timestamps: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and export its inventory
    Scan {
        /// Directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show changes between two states
    Diff {
        /// Earlier state (directory or inventory file)
        before: PathBuf,

        /// Later state (directory or inventory file)
        after: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Plan how to bring TARGET up to date with SOURCE
    Plan {
        /// State being replaced (directory or inventory file)
        target: PathBuf,

        /// State being propagated (directory or inventory file)
        source: PathBuf,

        /// Inventory of the last synchronized state
        #[arg(short, long)]
        prior: Option<PathBuf>,

        /// JSON file of operator decisions for conflicted paths
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Let the newer side win conflicts where timestamps decide
        #[arg(long)]
        auto_resolve: bool,

        /// Seconds within which modification times count as equal
        #[arg(long, default_value = "0")]
        clock_skew: u64,

        /// Fail if an inventory has entries whose parent is missing
        #[arg(long)]
        require_complete: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let scan = ScanOptions {
        include_hidden: !cli.no_hidden,
        ignore: cli.ignore,
        compute_checksums: !cli.no_checksums,
    };

    match cli.command {
        Command::Scan { path, output } => run_scan(&path, output, &scan)?,
        Command::Diff {
            before,
            after,
            format,
        } => run_diff(&before, &after, &scan, cli.timestamps, format)?,
        Command::Plan {
            target,
            source,
            prior,
            overrides,
            auto_resolve,
            clock_skew,
            require_complete,
            format,
        } => {
            let config = ReconcileConfig::builder()
                .conflict_mode(if auto_resolve {
                    ConflictMode::AutoResolve
                } else {
                    ConflictMode::Flag
                })
                .clock_skew_tolerance(clock_skew)
                .require_complete(require_complete)
                .timestamp_heuristic(cli.timestamps)
                .build()
                .context("Invalid reconcile configuration")?;
            tracing::debug!(?config, "reconcile configuration");
            run_plan(
                &target,
                &source,
                prior.as_deref(),
                overrides.as_deref(),
                &config,
                &scan,
                format,
            )?;
        }
    }

    Ok(())
}

/// Scan settings shared by every subcommand.
struct ScanOptions {
    include_hidden: bool,
    ignore: Vec<String>,
    compute_checksums: bool,
}

/// Scan a directory, or read an inventory file.
fn load_inventory(path: &Path, options: &ScanOptions) -> Result<Inventory> {
    if path.is_dir() {
        return scan_directory(path, options);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid inventory {}", path.display()))
}

fn scan_directory(path: &Path, options: &ScanOptions) -> Result<Inventory> {
    let path = path.canonicalize().context("Invalid path")?;

    eprintln!("Scanning {}...", path.display());

    let config = ScanConfig::builder()
        .root(path.clone())
        .include_hidden(options.include_hidden)
        .ignore_patterns(options.ignore.clone())
        .compute_checksums(options.compute_checksums)
        .build()
        .context("Invalid scan configuration")?;

    let scanner = InventoryScanner::new();
    let mut progress_rx = scanner.subscribe();
    let inventory = scanner.scan(&config).context("Scan failed")?;

    // The final update is sent last; older ones may have been dropped.
    let mut last = None;
    loop {
        match progress_rx.try_recv() {
            Ok(progress) => last = Some(progress),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    if let Some(progress) = last {
        eprintln!(
            " {} entries, {} in {:.2}s ({:.0} entries/s)",
            progress.entries_scanned,
            format_size(progress.bytes_scanned),
            progress.elapsed.as_secs_f64(),
            progress.entries_per_second()
        );
    }

    if inventory.has_warnings() {
        eprintln!(" {} warning(s) during scan", inventory.warnings.len());
        for warning in &inventory.warnings {
            eprintln!("   {}: {}", warning.path, warning.message);
        }
    }

    Ok(inventory)
}

/// Export an inventory to JSON.
fn run_scan(path: &Path, output: Option<PathBuf>, options: &ScanOptions) -> Result<()> {
    let inventory = scan_directory(path, options)?;
    let json = serde_json::to_string_pretty(&inventory)?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)?;
            let stats = inventory.stats();
            eprintln!(
                "Exported {} entries ({} files, {} directories, {}) to {}",
                stats.total_entries(),
                stats.total_files,
                stats.total_dirs,
                format_size(stats.total_size),
                output_path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Show the change records between two states.
fn run_diff(
    before: &Path,
    after: &Path,
    options: &ScanOptions,
    timestamps: bool,
    format: OutputFormat,
) -> Result<()> {
    let before = load_inventory(before, options)?;
    let after = load_inventory(after, options)?;

    let records = Differ::new()
        .with_timestamp_heuristic(timestamps)
        .diff(&before, &after);
    let stats = DiffStats::from_records(&records);

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" Changes");
            println!("{}", "─".repeat(70));
            println!();

            if records.is_empty() {
                println!(" No changes.");
            }
            for record in &records {
                println!(" {}", format_record(record));
            }

            println!();
            println!(
                " {} created, {} updated, {} deleted, {} type changes ({} low confidence)",
                stats.creates, stats.updates, stats.deletes, stats.type_changes, stats.low_confidence
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// Build and print a reconciliation plan.
fn run_plan(
    target: &Path,
    source: &Path,
    prior: Option<&Path>,
    overrides: Option<&Path>,
    config: &ReconcileConfig,
    options: &ScanOptions,
    format: OutputFormat,
) -> Result<()> {
    let target = load_inventory(target, options)?;
    let source = load_inventory(source, options)?;

    let overrides: Vec<Override> = match overrides {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read overrides {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("Invalid overrides {}", path.display()))?
        }
        None => Vec::new(),
    };

    let plan = match prior {
        Some(path) => {
            let prior = load_inventory(path, options)?;
            reconcile(&target, &source, &prior, config, overrides)
        }
        None => reconcile(&target, &source, &NoPriorState, config, overrides),
    }
    .context("Failed to build plan")?;

    match format {
        OutputFormat::Text => print_plan(&plan),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    Ok(())
}

fn print_plan(plan: &ReconciliationPlan) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" Reconciliation Plan");
    println!("{}", "─".repeat(70));
    println!();

    if plan.is_empty() {
        println!(" Nothing to do.");
    }

    for (position, action) in plan.actions().iter().enumerate() {
        let status = match action.resolution() {
            Resolution::Apply => "apply".to_string(),
            Resolution::Skip { reason } => format!("skip: {reason}"),
            Resolution::Conflict(_) => "CONFLICT".to_string(),
        };
        println!(
            " {:>4}  {:<50} {}",
            position + 1,
            truncate(&format_record(action.record()), 50),
            status
        );
    }

    let conflicts: Vec<_> = plan.conflicts().collect();
    if !conflicts.is_empty() {
        println!();
        println!(" Conflicts:");
        for conflict in conflicts {
            println!("   {} (suggested: {:?})", conflict, conflict.suggestion);
        }
    }

    let summary = plan.summary();
    println!();
    println!(" {}", summary);
    println!(" {} to transfer", format_size(summary.bytes_to_transfer));
}

/// One-line rendering of a change record.
fn format_record(record: &ChangeRecord) -> String {
    let marker = match record.action() {
        ChangeAction::Create => '+',
        ChangeAction::Update => '~',
        ChangeAction::Delete => '-',
        ChangeAction::TypeChange => '!',
    };
    let size = match record.action() {
        ChangeAction::Delete => String::new(),
        _ => format!(" ({})", format_size(record.transfer_size())),
    };
    let confidence = if record.is_low_confidence() { " ?" } else { "" };

    format!("{} {}{}{}", marker, record.path(), size, confidence)
}

/// Format bytes as human-readable size.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 1).collect();
        format!("{}…", truncated)
    }
}
