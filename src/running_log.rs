//! The running log: timestamp-keyed entries persisted as NestedText, newest first.

use crate::entry::Entry;
use crate::nestedtext::{self, ParseError};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: String, source: io::Error },

    #[error("{path}, {source}")]
    Parse { path: String, source: ParseError },

    #[error("{path}: {message}")]
    InvalidKey { path: String, message: String },

    #[error("{key}: attempt to overwrite log entry.")]
    Overwrite { key: String },
}

/// Outcome of inserting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    New,
    /// An entry with the same time and text was already present.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct RunningLog {
    path: PathBuf,
    /// Leading comment of the file, without its `# ` prefix.
    header: Option<String>,
    entries: Vec<Entry>,
}

impl RunningLog {
    /// Load the running log at `path`. A missing file yields an empty log.
    pub fn load(path: &Path) -> Result<Self, LogError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "running log not found, starting empty");
                Ok(Self::empty(path))
            }
            Err(e) => Err(LogError::Read {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            header: None,
            entries: Vec::new(),
        }
    }

    /// Parse document text; entries are re-sorted newest first.
    pub fn parse(path: &Path, text: &str) -> Result<Self, LogError> {
        let label = path.display().to_string();
        let items = nestedtext::loads(text).map_err(|source| LogError::Parse {
            path: label.clone(),
            source,
        })?;
        let mut entries = items
            .into_iter()
            .map(|(key, body)| {
                Entry::from_stored(&key, body).map_err(|message| LogError::InvalidKey {
                    path: label.clone(),
                    message,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| b.time().cmp(&a.time()));
        debug!(path = %label, entries = entries.len(), "loaded running log");
        Ok(Self {
            path: path.to_path_buf(),
            header: leading_comment(text),
            entries,
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the `n` newest entries.
    pub fn truncate(&mut self, n: usize) {
        self.entries.truncate(n);
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Entry) -> bool,
    {
        self.entries.retain(keep);
    }

    /// Insert an entry in time order. Re-inserting identical text at the same
    /// time is a no-op; different text at an existing time is an error.
    pub fn insert(&mut self, entry: Entry) -> Result<Inserted, LogError> {
        if let Some(existing) = self.entries.iter().find(|e| e.time() == entry.time()) {
            if existing.body() == entry.body() {
                return Ok(Inserted::Unchanged);
            }
            return Err(LogError::Overwrite {
                key: existing.key().to_string(),
            });
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.time() < entry.time())
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
        Ok(Inserted::New)
    }

    /// Render the document. A given mode line replaces the comment line read
    /// from the file; otherwise that comment line is kept.
    pub fn render(&self, mode_line: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(line) = mode_line.or(self.header.as_deref()) {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&nestedtext::dumps(
            self.entries.iter().map(|e| (e.key(), e.body())),
        ));
        out
    }

    /// Write the document atomically: temporary sibling file, fsync, rename.
    pub fn save(&self, mode_line: Option<&str>) -> Result<(), LogError> {
        let text = self.render(mode_line);
        let temp_path = temp_path_for(&self.path);
        let result = write_synced(&temp_path, text.as_bytes())
            .and_then(|()| fs::rename(&temp_path, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(LogError::Write {
                path: self.path.display().to_string(),
                source: e,
            });
        }
        debug!(path = %self.path.display(), entries = self.entries.len(), "wrote running log");
        Ok(())
    }
}

fn leading_comment(text: &str) -> Option<String> {
    let first = text.lines().next()?;
    let comment = first.strip_prefix('#')?;
    Some(comment.strip_prefix(' ').unwrap_or(comment).to_string())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
