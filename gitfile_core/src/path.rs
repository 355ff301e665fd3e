//! Normalized slash-separated paths inside a tree.

use crate::error::{Error, Result};
use crate::validate;
use std::fmt;
use std::str::FromStr;

/// A path from the root tree, e.g. `/docs/guide/intro.md`.
///
/// Leading, trailing and repeated slashes are insignificant: `"a/b"`,
/// `"/a/b/"` and `"//a//b"` are the same path. `""` and `"/"` are the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RepoPath {
    segments: Vec<String>,
}

impl RepoPath {
    /// The root tree itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a path. Every segment must be a valid entry name.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                validate::entry_name(s)
                    .map(|_| s.to_string())
                    .map_err(|e| Error::invalid_path(raw, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// Whether this path names the root tree.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// All segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Directory segments leading to the leaf, outermost first.
    pub fn dirs(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, dirs)) => dirs,
            None => &[],
        }
    }

    /// Final segment, `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path one level up; the root is its own parent.
    pub fn parent(&self) -> RepoPath {
        Self {
            segments: self.dirs().to_vec(),
        }
    }

    /// Path of a child entry.
    pub fn join(&self, name: &str) -> Result<RepoPath> {
        validate::entry_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }
}

impl FromStr for RepoPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RepoPath::parse(s)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
