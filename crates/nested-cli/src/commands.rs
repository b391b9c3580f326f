use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use colored::Colorize;
use nested_store::{CompactionReport, Filestore, StoreConfig, ValidationMode};
use nested_types::HierarchyConfig;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = base_config(&cli)?;
    match cli.command {
        Command::UpgradeToArchive(args) => cmd_upgrade(config, args),
        Command::Validate(args) => cmd_validate(config, args),
        Command::Ingest(args) => cmd_ingest(config, args),
    }
}

fn base_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => Ok(StoreConfig::default().with_hierarchy(HierarchyConfig {
            widths: cli.widths.clone(),
            pad_character: cli.pad,
            ..HierarchyConfig::default()
        })),
    }
}

fn open_store(mut config: StoreConfig, root: PathBuf) -> anyhow::Result<Filestore> {
    config.root = root;
    let display = config.root.display().to_string();
    Filestore::open(config).with_context(|| format!("failed to open filestore at {display}"))
}

fn cmd_upgrade(config: StoreConfig, args: UpgradeArgs) -> anyhow::Result<ExitCode> {
    let store = open_store(config, args.root)?;
    let report = store.compact_all();
    print_compaction(&report);
    Ok(exit_status(report.is_clean()))
}

fn cmd_validate(config: StoreConfig, args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let store = open_store(config, args.root)?;
    let mode = if args.fail_fast {
        ValidationMode::FailFast
    } else {
        ValidationMode::CollectAll
    };
    Ok(exit_status(validate(&store, mode)))
}

fn cmd_ingest(config: StoreConfig, args: IngestArgs) -> anyhow::Result<ExitCode> {
    let store = open_store(config, args.output)?;
    let report = ingest(&store, &args.input)?;
    Ok(exit_status(report.is_clean()))
}

fn exit_status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Print one line per group and a summary. Returns true if every group is valid.
fn validate(store: &Filestore, mode: ValidationMode) -> bool {
    let report = store.validate_all(mode);
    for (path, result) in &report.results {
        match result {
            Ok(()) => println!("{} {path} valid", "✓".green()),
            Err(e) => println!("{} {path} invalid: {e}", "✗".red()),
        }
    }

    if report.is_valid() {
        println!("{} Index is valid ({} groups)", "✓".green().bold(), report.checked());
    } else {
        println!("{}", "Bad groups:".red().bold());
        for (path, _) in report.invalid() {
            println!("  {}", path.to_string().yellow());
        }
    }
    report.is_valid()
}

fn ingest(store: &Filestore, input: &Path) -> anyhow::Result<CompactionReport> {
    let report = store
        .ingest_filesystem(input)
        .with_context(|| format!("failed to ingest {}", input.display()))?;
    for (path, reason) in &report.skipped {
        println!("  {} {} ({reason})", "skipped:".yellow(), path.display());
    }
    println!(
        "{} Ingested {} objects from {}",
        "✓".green().bold(),
        report.ingested.to_string().bold(),
        input.display()
    );

    let compaction = store.compact_all();
    print_compaction(&compaction);
    Ok(compaction)
}

fn print_compaction(report: &CompactionReport) {
    for path in &report.compacted {
        println!("  {} {path}", "archived:".green());
    }
    for (path, e) in &report.failed {
        println!("  {} {path}: {e}", "failed:".red());
    }
    let summary = format!(
        "Compacted {} groups, skipped {}, failed {}",
        report.compacted.len(),
        report.skipped,
        report.failed.len()
    );
    if report.is_clean() {
        println!("{} {summary}", "✓".green().bold());
    } else {
        println!("{} {summary}", "✗".red().bold());
    }
}
