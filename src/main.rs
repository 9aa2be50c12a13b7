use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cryption_rs::{
    run_worker, Action, DispatcherBuilder, DispatcherConfig, EnvFileKeySource, EnvKeySource,
    KeySource, ReaderKeySource, SpawnMode,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Encrypt or decrypt files in place with AES-256-CBC.
///
/// The key is read from CRYPTION_KEY (or --key-file) and must be at least 32
/// bytes. Queue and worker settings can also come from CRYPTION_CAPACITY,
/// CRYPTION_MAX_WORKERS, CRYPTION_SPAWN_MODE and CRYPTION_SHARED.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    /// File or directory to process (hidden files are skipped)
    #[arg(value_name = "PATH", required = true)]
    path: Option<PathBuf>,

    /// encrypt | decrypt (e | d)
    #[arg(value_name = "ACTION", required = true)]
    action: Option<Action>,

    /// Maximum number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// inline | threads | processes | deferred
    #[arg(short, long)]
    mode: Option<SpawnMode>,

    /// Queue capacity in tasks
    #[arg(long)]
    capacity: Option<usize>,

    /// Read the key from a .env-style file instead of the environment
    #[arg(short, long, value_name = "FILE")]
    key_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Drain a shared queue; the key arrives on stdin, outcomes leave on stdout
    #[command(hide = true)]
    Worker {
        #[arg(value_name = "QUEUE")]
        queue: String,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Some(Command::Worker { queue }) => worker(queue),
        None => run(&cli),
    }
}

fn worker(queue: &str) -> Result<ExitCode> {
    let key = ReaderKeySource::new(io::stdin());
    run_worker(queue, &key, io::stdout().lock())
        .with_context(|| format!("worker on queue '{queue}' failed"))?;
    Ok(ExitCode::SUCCESS)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let (Some(path), Some(action)) = (&cli.path, cli.action) else {
        anyhow::bail!("PATH and ACTION are required");
    };

    let mut config = DispatcherConfig::from_env()?;
    if let Some(workers) = cli.workers {
        config.max_workers = workers;
    }
    if let Some(mode) = cli.mode {
        config.spawn_mode = mode;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }

    let key_source: Box<dyn KeySource> = match &cli.key_file {
        Some(file) => Box::new(EnvFileKeySource::new(file)),
        None => Box::new(EnvKeySource::default()),
    };

    // Key and config errors abort here, before the tree is even walked.
    let dispatcher = DispatcherBuilder::from_config(config)
        .build(key_source.as_ref())
        .context("cannot start batch")?;

    let files = collect_files(path)?;
    info!(count = files.len(), %action, root = %path.display(), "submitting files");
    dispatcher.submit_all(action, &files)?;
    let report = dispatcher.finish();

    println!("{action}: {report}");
    for failure in &report.failed {
        eprintln!("  {failure}");
    }
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Regular files under `root`, skipping anything whose name starts with '.'.
fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        anyhow::bail!("{} does not exist", root.display());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        } else {
            debug!(path = %entry.path().display(), "not a regular file");
        }
    }
    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn setup_logging(verbose: u8, quiet: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match (quiet, verbose) {
            (true, _) => "error",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    });

    // stdout belongs to the batch summary and the worker outcome stream.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn hidden_files_and_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join(".secret"), b"s").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("config"), b"c").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), b"b").unwrap();

        let mut files = collect_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("sub").join("b.txt")]
        );
    }

    #[test]
    fn single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".only");
        fs::write(&file, b"x").unwrap();
        assert_eq!(collect_files(&file).unwrap(), vec![file]);
    }

    #[test]
    fn cli_parses_run_and_worker_forms() {
        let cli = Cli::try_parse_from(["cryption", "dir", "e", "--workers", "2"]).unwrap();
        assert_eq!(cli.action, Some(Action::Encrypt));
        assert_eq!(cli.workers, Some(2));
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["cryption", "worker", "cq-1"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Worker { ref queue }) if queue == "cq-1"));

        assert!(Cli::try_parse_from(["cryption", "dir", "scramble"]).is_err());
    }
}
