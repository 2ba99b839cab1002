//! Completed-terms tracking.
//!
//! One term per line in a plain text file. A restarted run loads it and skips
//! anything already finished (or deliberately abandoned), so a crash halfway
//! through a long term list costs only the in-flight term.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct ProgressLog {
    path: PathBuf,
    done: HashSet<String>,
}

impl ProgressLog {
    /// Load an existing progress file; a missing file is an empty log.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let done = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };
        info!("loaded {} completed terms from {:?}", done.len(), path);
        Ok(Self { path, done })
    }

    pub fn is_done(&self, term: &str) -> bool {
        self.done.contains(term.trim())
    }

    /// Record a term as finished (appended immediately, not buffered).
    pub fn mark_done(&mut self, term: &str) -> std::io::Result<()> {
        let term = term.trim();
        if self.done.insert(term.to_string()) {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(f, "{}", term)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}
