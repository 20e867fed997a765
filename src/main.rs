//! ntlog: append a log file into a running NestedText log, pruning old entries.

mod append;
mod editor;
mod entry;
mod nestedtext;
mod policy;
mod running_log;

use append::{AppendRequest, Input};
use chrono::{DateTime, FixedOffset};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use colored::Colorize;
use editor::{Editor, FoldMarkers};
use policy::PolicyConfig;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ntlog", version)]
#[command(about = "Append a log file into a running NestedText log")]
#[command(
    after_help = "Copies <LOGFILE> into <LOGFILE>.nt (or --output) while deleting any log entries \
                  that are older than the limit specified by --keep-for."
)]
struct Cli {
    /// Log file to incorporate. Reads standard input when absent or '-'.
    #[arg(value_name = "LOGFILE", conflicts_with = "message")]
    logfile: Option<PathBuf>,

    /// Running log to update (default: LOGFILE with its extension replaced by .log.nt).
    #[arg(short, long, value_name = "PATH", required_unless_present = "logfile")]
    output: Option<PathBuf>,

    /// Text of the new entry, instead of reading a log file.
    #[arg(short, long, value_name = "TEXT")]
    message: Option<String>,

    /// Drop entries older than this (days by default; units s, m, h, d, w, M, y).
    #[arg(short, long, value_name = "AGE", value_parser = parse_keep_for)]
    keep_for: Option<Duration>,

    /// Maximum number of log entries to keep.
    #[arg(short = 'n', long, value_name = "N", value_parser = parse_positive)]
    max_entries: Option<usize>,

    /// Minimum number of log entries to keep [default: 1].
    #[arg(short = 'N', long, value_name = "N", value_parser = parse_positive)]
    min_entries: Option<usize>,

    /// JSON file with keep_for, max_entries and min_entries; flags take precedence.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Time of the new entry, RFC 3339 (default: LOGFILE modification time, or now).
    #[arg(short, long, value_name = "TIME", value_parser = parse_timestamp)]
    timestamp: Option<DateTime<FixedOffset>>,

    /// Delete the given log file after incorporating it.
    #[arg(short, long, requires = "logfile")]
    delete: bool,

    /// Add an editor mode line to the top of the running log.
    #[arg(short, long, value_enum)]
    editor: Option<Editor>,

    /// Two tokens that replace the {{{ and }}} fold markers found in the log text.
    #[arg(long, value_name = "MAPPING")]
    fold_marker: Option<FoldMarkers>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_keep_for(s: &str) -> Result<Duration, String> {
    policy::parse_keep_for(s).map_err(|e| e.to_string())
}

fn parse_positive(s: &str) -> Result<usize, String> {
    let n: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("could not convert to number: {}", s))?;
    if n == 0 {
        return Err("expected strictly positive number.".to_string());
    }
    Ok(n)
}

fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, String> {
    entry::parse_key(s)
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn build_request(cli: Cli) -> anyhow::Result<AppendRequest> {
    let input = match (cli.message, cli.logfile) {
        (Some(text), _) => Input::Message(text),
        (None, Some(path)) if path != Path::new("-") => Input::File(path),
        (None, _) => Input::Stdin,
    };
    let output = match (cli.output, &input) {
        (Some(path), _) => path,
        (None, Input::File(path)) => append::default_output(path),
        (None, _) => Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "--output is required when reading standard input",
            )
            .exit(),
    };

    let config = match &cli.config {
        Some(path) => PolicyConfig::load(path)?,
        None => PolicyConfig::default(),
    };
    let policy = config.resolve(cli.keep_for, cli.max_entries, cli.min_entries)?;

    let mut request = AppendRequest::new(input, output);
    request.policy = policy;
    request.timestamp = cli.timestamp;
    request.delete_input = cli.delete;
    request.editor = cli.editor;
    request.fold_markers = cli.fold_marker;
    Ok(request)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let request = build_request(cli)?;
    let report = append::run(&request, std::io::stdin().lock(), entry::now())?;
    tracing::debug!(
        key = %report.key,
        inserted = ?report.inserted,
        dropped = report.dropped,
        entries = report.entries,
        "done"
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "error".red(), e);
        std::process::exit(1);
    }
}
