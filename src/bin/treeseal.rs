//! # treeseal CLI - integrity audits for directory trees
//!
//! ## Usage
//! ```bash
//! # Create a repository and record the first state
//! treeseal init -c "initial import"
//!
//! # What changed since the last state?
//! treeseal diff
//!
//! # Record the current state
//! treeseal ci -c "after cleanup"
//!
//! # List states
//! treeseal log
//!
//! # Files with identical content
//! treeseal fdup
//!
//! # Restore modification times of files whose content did not change
//! treeseal rdates
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use treeseal::utils::format_bytes;
use treeseal::{
    CompareMode, CompareResult, HashMode, Modification, Repository, RepositoryBuilder, Result,
    ScanStats,
};

/// treeseal - detect corruption, unexpected edits and bit-rot in a directory tree
#[derive(Parser)]
#[command(name = "treeseal")]
#[command(version)]
#[command(about = "Tamper-evident snapshots of directory trees")]
#[command(long_about = None)]
struct Cli {
    /// Repository root (defaults to current directory)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// How file content is hashed
    #[arg(short, long, global = true, value_enum)]
    mode: Option<ModeArg>,

    /// Number of hashing threads (defaults to the CPU count)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Compare lengths and dates only, never fingerprints
    #[arg(long, global = true)]
    fast: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository and commit its first state
    Init {
        /// State comment
        #[arg(short, long, default_value = "Initial state")]
        comment: String,
    },

    /// Commit the current state
    #[command(alias = "ci")]
    Commit {
        /// Only rescan this subdirectory
        dir: Option<PathBuf>,

        /// State comment
        #[arg(short, long, default_value = "")]
        comment: String,
    },

    /// Compare the tree with the last committed state
    Diff {
        /// Only compare this subdirectory
        dir: Option<PathBuf>,
    },

    /// Find files with identical content
    #[command(alias = "fdup")]
    FindDuplicates,

    /// List committed states
    Log,

    /// Restore the modification date of files whose content is unchanged
    #[command(alias = "rdates")]
    ResetDates,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// File attributes only
    DontHash,
    /// Second 4 KB block of each file
    SmallBlock,
    /// Second 1 MB block of each file
    MediumBlock,
    /// Complete file content
    Full,
}

impl From<ModeArg> for HashMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::DontHash => HashMode::DontHash,
            ModeArg::SmallBlock => HashMode::HashSmallBlock,
            ModeArg::MediumBlock => HashMode::HashMediumBlock,
            ModeArg::Full => HashMode::HashAll,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut builder = RepositoryBuilder::new().verbose(cli.verbose);
    if let Some(mode) = cli.mode {
        builder = builder.hash_mode(mode.into());
    }
    if let Some(threads) = cli.threads {
        builder = builder.thread_count(threads);
    }
    if cli.fast {
        builder = builder.compare_mode(CompareMode::Fast);
    }

    match cli.command {
        Commands::Init { comment } => cmd_init(builder, &root, &comment, cli.verbose),
        Commands::Commit { dir, comment } => {
            let repo = builder.open(&root)?;
            cmd_commit(&repo, dir.as_deref(), &comment, cli.verbose)
        }
        Commands::Diff { dir } => cmd_diff(&builder.open(&root)?, dir.as_deref(), cli.verbose),
        Commands::FindDuplicates => cmd_find_duplicates(&builder.open(&root)?, cli.verbose),
        Commands::Log => cmd_log(&builder.open(&root)?),
        Commands::ResetDates => cmd_reset_dates(&builder.open(&root)?, cli.verbose),
    }
}

/// Spinner shown while scanning; progress markers replace it in verbose mode
fn spinner(verbose: bool, message: &str) -> Option<ProgressBar> {
    if verbose {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn with_spinner<T>(verbose: bool, message: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
    let pb = spinner(verbose, message);
    let result = op();
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    result
}

fn cmd_init(builder: RepositoryBuilder, root: &Path, comment: &str, verbose: bool) -> Result<()> {
    let repo = builder.init(root)?;
    println!(
        "{} Initialized repository in {}",
        "✓".green().bold(),
        repo.root().display().to_string().yellow()
    );
    cmd_commit(&repo, None, comment, verbose)
}

fn cmd_commit(repo: &Repository, dir: Option<&Path>, comment: &str, verbose: bool) -> Result<()> {
    let start = Instant::now();
    let outcome = with_spinner(verbose, "Scanning files...", || match dir {
        Some(dir) => repo.commit_dir(dir, comment),
        None => repo.commit(comment),
    })?;

    match outcome.state_number {
        Some(number) => {
            println!(
                "{} Committed state {}",
                "✓".green().bold(),
                number.to_string().yellow().bold()
            );
            print_counts(&outcome.result);
        }
        None => println!("{}", "Nothing modified, no state committed".blue()),
    }
    print_stats(&outcome.stats, start.elapsed());
    Ok(())
}

fn cmd_diff(repo: &Repository, dir: Option<&Path>, verbose: bool) -> Result<()> {
    let start = Instant::now();
    let outcome = with_spinner(verbose, "Scanning files...", || match dir {
        Some(dir) => repo.diff_dir(dir),
        None => repo.diff(),
    })?;

    println!(
        "{} {}",
        "Compared with state".blue().bold(),
        outcome.state_number.to_string().yellow()
    );
    for (modification, file) in outcome.result.iter() {
        let label = format!("{:<17}", format!("{}:", modification));
        let label = match modification {
            Modification::Added => label.green(),
            Modification::Deleted => label.red(),
            Modification::ContentModified => label.yellow(),
            Modification::DateModified => label.cyan(),
        };
        println!("{} {}", label, file);
    }

    if outcome.result.something_modified() {
        println!();
        print_counts(&outcome.result);
    } else {
        println!("{}", "Nothing modified".green());
    }
    print_stats(&outcome.stats, start.elapsed());
    Ok(())
}

fn cmd_find_duplicates(repo: &Repository, verbose: bool) -> Result<()> {
    let report = with_spinner(verbose, "Hashing files...", || repo.find_duplicates())?;

    if report.is_empty() {
        println!("{}", "No duplicated files".green());
        return Ok(());
    }

    for group in &report.groups {
        println!(
            "{} {} duplicates of {}",
            "-".yellow(),
            group.files.len().to_string().yellow(),
            format_bytes(group.file_length).cyan()
        );
        for file in &group.files {
            println!("      {}", file);
        }
    }
    println!();
    println!(
        "{} duplicated files in {} groups, {} wasted",
        report.duplicated_file_count().to_string().yellow().bold(),
        report.groups.len().to_string().yellow(),
        format_bytes(report.wasted_bytes()).red()
    );
    Ok(())
}

fn cmd_log(repo: &Repository) -> Result<()> {
    let entries = repo.log()?;
    if entries.is_empty() {
        println!("{}", "No state committed yet".blue());
        return Ok(());
    }

    for entry in entries {
        println!(
            "{} {}",
            "State".blue().bold(),
            entry.state_number.to_string().yellow().bold()
        );
        println!(
            "  Date: {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string().cyan()
        );
        if !entry.comment.is_empty() {
            println!("  Comment: {}", entry.comment.cyan());
        }
        println!(
            "  Files: {} ({}), hash mode {}",
            entry.file_count.to_string().cyan(),
            format_bytes(entry.files_content_length),
            entry.hash_mode
        );
        let counts = entry.modification_counts;
        println!(
            "  Added {}, deleted {}, content modified {}, date modified {}",
            counts.added, counts.deleted, counts.content_modified, counts.date_modified
        );
        println!();
    }
    Ok(())
}

fn cmd_reset_dates(repo: &Repository, verbose: bool) -> Result<()> {
    let reset = with_spinner(verbose, "Scanning files...", || repo.reset_dates())?;
    for file in &reset {
        println!("{} {}", "Date reset:".cyan(), file);
    }
    if reset.is_empty() {
        println!("{}", "No file date to reset".green());
    } else {
        println!(
            "{} Reset {} file dates",
            "✓".green().bold(),
            reset.len().to_string().yellow()
        );
    }
    Ok(())
}

fn print_counts(result: &CompareResult) {
    let counts = result.modification_counts();
    println!(
        "  {} added, {} deleted, {} content modified, {} date modified",
        counts.added.to_string().green(),
        counts.deleted.to_string().red(),
        counts.content_modified.to_string().yellow(),
        counts.date_modified.to_string().cyan()
    );
}

fn print_stats(stats: &ScanStats, elapsed: Duration) {
    println!(
        "  Scanned {} files ({}), hashed {} in {} using {} threads",
        stats.file_count.to_string().cyan(),
        format_bytes(stats.content_bytes),
        format_bytes(stats.bytes_hashed),
        format_duration(Duration::from_millis(elapsed.as_millis() as u64)),
        stats.thread_count
    );
}
