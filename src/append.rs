//! Append command: read the new entry, prune the running log, insert, write back.

use crate::editor::{Editor, FoldMarkers};
use crate::entry::{self, Entry};
use crate::nestedtext::normalize_newlines;
use crate::policy::RetentionPolicy;
use crate::running_log::{Inserted, RunningLog};
use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, FixedOffset};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the text of the new entry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    File(PathBuf),
    Stdin,
    Message(String),
}

#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub input: Input,
    pub output: PathBuf,
    pub policy: RetentionPolicy,
    /// Entry time; defaults to the input file's mtime, or now.
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub delete_input: bool,
    pub editor: Option<Editor>,
    pub fold_markers: Option<FoldMarkers>,
}

impl AppendRequest {
    pub fn new(input: Input, output: PathBuf) -> Self {
        Self {
            input,
            output,
            policy: RetentionPolicy::default(),
            timestamp: None,
            delete_input: false,
            editor: None,
            fold_markers: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    pub key: String,
    pub inserted: Inserted,
    pub dropped: usize,
    pub entries: usize,
}

/// Running log path for a given input log: `build.log` becomes `build.log.nt`.
pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("log.nt")
}

fn read_input(
    input: &Input,
    stdin: impl Read,
    now: DateTime<FixedOffset>,
) -> anyhow::Result<(String, DateTime<FixedOffset>)> {
    match input {
        Input::File(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow!("Failed to read log file {}: {}", path.display(), e))?;
            let modified = std::fs::metadata(path)
                .and_then(|m| m.modified())
                .with_context(|| format!("Failed to stat log file {}", path.display()))?;
            Ok((text, entry::from_system_time(modified)))
        }
        Input::Stdin => {
            let mut text = String::new();
            let mut stdin = stdin;
            stdin
                .read_to_string(&mut text)
                .map_err(|e| anyhow!("Failed to read standard input: {}", e))?;
            Ok((text, now))
        }
        Input::Message(text) => Ok((text.clone(), now)),
    }
}

/// Run the append pipeline. `stdin` is only read for `Input::Stdin`; `now` is
/// the reference time for age pruning.
pub fn run(
    request: &AppendRequest,
    stdin: impl Read,
    now: DateTime<FixedOffset>,
) -> anyhow::Result<AppendReport> {
    if let Input::File(path) = &request.input {
        if path == &request.output {
            bail!(
                "{}: log file and running log must be different files.",
                path.display()
            );
        }
    }

    let (text, default_time) = read_input(&request.input, stdin, now)?;
    let time = request.timestamp.unwrap_or(default_time);
    let text = normalize_newlines(&text);
    let text = match &request.fold_markers {
        Some(markers) => markers.apply(&text),
        None => text,
    };

    let mut log = RunningLog::load(&request.output)?;
    let dropped = request.policy.apply(&mut log, now);

    let entry = Entry::new(time, text);
    let key = entry.key().to_string();
    let inserted = log.insert(entry)?;
    if inserted == Inserted::Unchanged {
        debug!(%key, "entry already present");
    }

    log.save(request.editor.map(Editor::mode_line))?;
    info!(
        path = %request.output.display(),
        %key,
        entries = log.len(),
        "appended log entry"
    );

    if request.delete_input {
        if let Input::File(path) = &request.input {
            std::fs::remove_file(path)
                .map_err(|e| anyhow!("Failed to delete log file {}: {}", path.display(), e))?;
            debug!(path = %path.display(), "deleted input log file");
        }
    }

    Ok(AppendReport {
        key,
        inserted,
        dropped,
        entries: log.len(),
    })
}
