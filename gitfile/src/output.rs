//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use chrono::DateTime;
use gitfile_core::{Commit, Digest, EntryInfo, RefKind, ReflogEntry};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write raw bytes to stdout (text mode only).
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut handle = self.stdout.lock();
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error message directly.
    pub fn write_error(&self, error: &anyhow::Error, kind: Option<&'static str>, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    kind,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, or the raw number if out of range.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
    pub default_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<Digest>,
}

/// Output for `blob put`.
#[derive(Debug, Serialize)]
pub struct BlobPutOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: Digest,
    pub size: u64,
}

/// Output for `blob cat` in JSON mode.
#[derive(Debug, Serialize)]
pub struct BlobCatOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: Digest,
    pub size: u64,
    pub content: String,
}

/// Reference information for list commands.
#[derive(Debug, Clone, Serialize)]
pub struct RefInfo {
    pub name: String,
    pub target: Digest,
}

/// Output for `branch list` / `tag list`.
#[derive(Debug, Serialize)]
pub struct RefsListOutput {
    pub success: bool,
    pub result_code: u8,
    pub kind: RefKind,
    pub refs: Vec<RefInfo>,
}

/// Output for `branch create` / `tag create`.
#[derive(Debug, Serialize)]
pub struct RefCreateOutput {
    pub success: bool,
    pub result_code: u8,
    pub kind: RefKind,
    pub name: String,
    pub target: Digest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_object: Option<Digest>,
}

/// Output for `branch rm` / `tag rm`.
#[derive(Debug, Serialize)]
pub struct RefRemoveOutput {
    pub success: bool,
    pub result_code: u8,
    pub kind: RefKind,
    pub name: String,
    pub last_target: Digest,
}

/// A commit together with its digest.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub digest: Digest,
    #[serde(flatten)]
    pub commit: Commit,
}

impl CommitInfo {
    /// Multi-line text rendering, in the style of `git log`.
    pub fn to_text(&self) -> String {
        let mut out = format!("commit {}\n", self.digest);
        for parent in &self.commit.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!(
            "Author: {} <{}>\nDate:   {}\n\n",
            self.commit.author.name(),
            self.commit.author.email(),
            self.commit.author.when().format("%Y-%m-%d %H:%M:%S %z")
        ));
        for line in self.commit.message.lines() {
            out.push_str(&format!("    {}\n", line));
        }
        out
    }
}

/// Data variants for `show`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShowData {
    Commit(CommitInfo),
    Entry(EntryInfo),
}

/// Output for `show`.
#[derive(Debug, Serialize)]
pub struct ShowOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub data: ShowData,
}

/// Output for `ls`.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub revision: String,
    pub path: String,
    pub entries: Vec<EntryInfo>,
}

/// Output for `put`, `update` and `rm`.
#[derive(Debug, Serialize)]
pub struct CommitOutput {
    pub success: bool,
    pub result_code: u8,
    pub branch: String,
    pub path: String,
    pub commit: Digest,
}

/// Output for `log`.
#[derive(Debug, Serialize)]
pub struct LogOutput {
    pub success: bool,
    pub result_code: u8,
    pub commits: Vec<CommitInfo>,
}

/// Reflog entry information.
#[derive(Debug, Clone, Serialize)]
pub struct ReflogEntryInfo {
    pub timestamp: i64,
    pub timestamp_human: String,
    pub old: Option<Digest>,
    pub new: Option<Digest>,
    pub reason: String,
}

impl From<ReflogEntry> for ReflogEntryInfo {
    fn from(entry: ReflogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            timestamp_human: format_timestamp(entry.timestamp),
            old: entry.old,
            new: entry.new,
            reason: entry.reason,
        }
    }
}

/// Output for `reflog`.
#[derive(Debug, Serialize)]
pub struct ReflogOutput {
    pub success: bool,
    pub result_code: u8,
    pub kind: RefKind,
    pub name: String,
    pub entries: Vec<ReflogEntryInfo>,
}
