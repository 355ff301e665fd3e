//! Append-only log of reference transitions.

use crate::error::{Error, Result};
use crate::hash::Digest;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Placeholder written for "no digest" (ref created or deleted).
const NONE_MARKER: &str = "-";

/// One reference transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflogEntry {
    /// Unix timestamp of the transition.
    pub timestamp: i64,
    /// Previous target, `None` when the ref was created.
    pub old: Option<Digest>,
    /// New target, `None` when the ref was deleted.
    pub new: Option<Digest>,
    /// Why the ref moved (e.g. "commit: add README").
    pub reason: String,
}

impl ReflogEntry {
    /// Entry stamped with the current time.
    pub fn now(old: Option<Digest>, new: Option<Digest>, reason: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            old,
            new,
            // Keep the line format intact.
            reason: reason.replace(['\n', '\r'], " "),
        }
    }

    /// Serialize the entry to a pipe-delimited line.
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.timestamp,
            render(self.old.as_ref()),
            render(self.new.as_ref()),
            self.reason
        )
    }

    /// Parse an entry from a pipe-delimited line. The reason may itself
    /// contain pipes.
    pub fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.splitn(4, '|').collect();
        if parts.len() != 4 {
            return Err(Error::corrupted_object(
                "reflog",
                format!("expected 4 fields, got {}", parts.len()),
            ));
        }

        let timestamp = parts[0].parse::<i64>().map_err(|_| {
            Error::corrupted_object("reflog", format!("Invalid timestamp: {}", parts[0]))
        })?;

        Ok(Self {
            timestamp,
            old: parse(parts[1])?,
            new: parse(parts[2])?,
            reason: parts[3].to_string(),
        })
    }
}

fn render(digest: Option<&Digest>) -> String {
    digest.map_or_else(|| NONE_MARKER.to_string(), Digest::to_hex)
}

fn parse(field: &str) -> Result<Option<Digest>> {
    if field == NONE_MARKER {
        return Ok(None);
    }
    Digest::from_hex(field)
        .map(Some)
        .map_err(|_| Error::corrupted_object("reflog", format!("Invalid digest: {}", field)))
}

/// Reflog file of a single reference.
#[derive(Debug)]
pub struct Reflog {
    path: PathBuf,
}

impl Reflog {
    /// Reflog stored at `path`. The file is created on first append.
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append an entry.
    pub fn append(&self, entry: &ReflogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        file.flush()?;
        Ok(())
    }

    /// All entries, oldest first. Unparseable lines are skipped.
    pub fn read(&self) -> Result<Vec<ReflogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if let Ok(entry) = ReflogEntry::from_line(line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Remove the log, if present.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_line_format() {
        let new = Digest::hash_bytes(b"commit");
        let entry = ReflogEntry {
            timestamp: 1737556252,
            old: None,
            new: Some(new),
            reason: "branch: created | from cli".to_string(),
        };

        let line = entry.to_line();
        assert!(line.starts_with("1737556252|-|"));
        assert_eq!(ReflogEntry::from_line(&line).unwrap(), entry);
    }

    #[test]
    fn test_entry_invalid_format() {
        assert!(ReflogEntry::from_line("invalid|format").is_err());
        assert!(ReflogEntry::from_line("x|-|-|reason").is_err());
        assert!(ReflogEntry::from_line("1|nothex|-|reason").is_err());
    }

    #[test]
    fn test_reason_newlines_flattened() {
        let entry = ReflogEntry::now(None, None, "commit: first line\nsecond");
        assert_eq!(entry.reason, "commit: first line second");
    }

    #[test]
    fn test_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let log = Reflog::at(temp_dir.path().join("logs/refs/heads/master"));
        assert!(log.read().unwrap().is_empty());

        let a = Digest::hash_bytes(b"a");
        let b = Digest::hash_bytes(b"b");
        log.append(&ReflogEntry::now(None, Some(a), "create")).unwrap();
        log.append(&ReflogEntry::now(Some(a), Some(b), "commit")).unwrap();

        let entries = log.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].new, Some(a));
        assert_eq!(entries[1].old, Some(a));
        assert_eq!(entries[1].new, Some(b));
    }

    #[test]
    fn test_read_skips_garbage_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log");
        let good = ReflogEntry::now(None, Some(Digest::hash_bytes(b"x")), "ok");
        fs::write(&path, format!("garbage\n\n{}\n", good.to_line())).unwrap();

        let log = Reflog::at(&path);
        assert_eq!(log.read().unwrap(), vec![good]);

        log.remove().unwrap();
        assert!(!path.exists());
        log.remove().unwrap();
    }
}
