//! Naming a snapshot to read from.

use crate::error::{Error, Result};
use crate::hash::{DIGEST_HEX_LEN, Digest};
use crate::validate;
use std::fmt;
use std::str::FromStr;

/// A branch, a tag or a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Revision {
    /// Head commit of a branch.
    Branch(String),
    /// Target of a tag, peeled through annotated tag objects.
    Tag(String),
    /// A commit by digest.
    Commit(Digest),
}

impl Revision {
    /// Parse `branch:NAME`, `tag:NAME`, a 64-hex commit digest or a bare
    /// branch name.
    pub fn parse(s: &str) -> Result<Self> {
        validate::required("revision", s)?;

        if let Some(name) = s.strip_prefix("branch:") {
            validate::ref_name(name)?;
            return Ok(Revision::Branch(name.to_string()));
        }
        if let Some(name) = s.strip_prefix("tag:") {
            validate::ref_name(name)?;
            return Ok(Revision::Tag(name.to_string()));
        }
        if let Some(hex) = s.strip_prefix("commit:") {
            return Ok(Revision::Commit(Digest::from_hex(hex)?));
        }
        if s.len() == DIGEST_HEX_LEN
            && let Ok(digest) = Digest::from_hex(s)
        {
            return Ok(Revision::Commit(digest));
        }

        validate::ref_name(s).map_err(|e| match e {
            Error::InvalidRef { reason } => {
                Error::invalid_ref(format!("Not a revision: {} ({})", s, reason))
            }
            other => other,
        })?;
        Ok(Revision::Branch(s.to_string()))
    }
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Revision::parse(s)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Branch(name) => write!(f, "branch:{}", name),
            Revision::Tag(name) => write!(f, "tag:{}", name),
            Revision::Commit(digest) => write!(f, "commit:{}", digest),
        }
    }
}
