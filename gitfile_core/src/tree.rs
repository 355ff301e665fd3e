//! Tree encoding and directory entries.

use crate::error::{Error, Result};
use crate::hash::{DIGEST_SIZE, Digest};
use crate::object::ObjectType;
use crate::validate;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Mode of a tree entry, using git's numeric file modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Non-executable file.
    Regular,
    /// Executable file.
    Executable,
    /// Symbolic link; the blob holds the link target.
    Symlink,
    /// Directory.
    Subtree,
}

impl EntryMode {
    /// Numeric mode as stored in trees.
    pub fn to_u32(self) -> u32 {
        match self {
            EntryMode::Regular => 0o100644,
            EntryMode::Executable => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Subtree => 0o040000,
        }
    }

    /// Parse a numeric mode.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0o100644 => Some(EntryMode::Regular),
            0o100755 => Some(EntryMode::Executable),
            0o120000 => Some(EntryMode::Symlink),
            0o040000 => Some(EntryMode::Subtree),
            _ => None,
        }
    }

    /// Type of object an entry with this mode points at.
    pub fn object_type(self) -> ObjectType {
        match self {
            EntryMode::Subtree => ObjectType::Tree,
            _ => ObjectType::Blob,
        }
    }

    /// Whether this entry is a directory.
    pub fn is_tree(self) -> bool {
        self == EntryMode::Subtree
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.to_u32())
    }
}

impl FromStr for EntryMode {
    type Err = Error;

    /// Accepts an octal mode (`100644`, `0o100755`) or a name
    /// (`regular`, `executable`, `symlink`, `tree`).
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regular" | "file" => return Ok(EntryMode::Regular),
            "executable" => return Ok(EntryMode::Executable),
            "symlink" | "link" => return Ok(EntryMode::Symlink),
            "tree" | "subtree" | "dir" => return Ok(EntryMode::Subtree),
            _ => {}
        }

        let digits = s.trim_start_matches("0o");
        u32::from_str_radix(digits, 8)
            .ok()
            .and_then(EntryMode::from_u32)
            .ok_or_else(|| Error::invalid_tree_entry(format!("Unknown mode: {}", s)))
    }
}

impl Serialize for EntryMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An entry in a tree (file or subdirectory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Name of the entry (UTF-8, no `/`).
    pub name: String,
    /// Entry mode.
    pub mode: EntryMode,
    /// Digest of the object the entry points at.
    pub target: Digest,
}

impl Entry {
    /// Create a new tree entry, validating the name.
    pub fn new(name: impl Into<String>, mode: EntryMode, target: Digest) -> Result<Self> {
        let name = name.into();
        validate::entry_name(&name)?;
        Ok(Self { name, mode, target })
    }

    /// A directory entry.
    pub fn subtree(name: impl Into<String>, target: Digest) -> Result<Self> {
        Self::new(name, EntryMode::Subtree, target)
    }

    /// Encode the entry to bytes.
    ///
    /// Format:
    /// - 4 bytes: mode (u32 LE)
    /// - 32 bytes: digest
    /// - 1 byte: name_len
    /// - N bytes: name (UTF-8)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + DIGEST_SIZE + 1 + self.name.len());
        buf.extend_from_slice(&self.mode.to_u32().to_le_bytes());
        buf.extend_from_slice(self.target.as_bytes());
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());
        buf
    }

    /// Decode an entry from a reader.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut mode_buf = [0u8; 4];
        reader.read_exact(&mut mode_buf)?;
        let raw_mode = u32::from_le_bytes(mode_buf);
        let mode = EntryMode::from_u32(raw_mode)
            .ok_or_else(|| Error::corrupted_object("tree", format!("Unknown mode {:o}", raw_mode)))?;

        let mut digest_buf = [0u8; DIGEST_SIZE];
        reader.read_exact(&mut digest_buf)?;
        let target = Digest::from_bytes(digest_buf);

        let mut name_len_buf = [0u8; 1];
        reader.read_exact(&mut name_len_buf)?;
        let name_len = name_len_buf[0] as usize;

        let mut name_buf = vec![0u8; name_len];
        reader.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf)
            .map_err(|e| Error::corrupted_object("tree", format!("Invalid UTF-8 in name: {}", e)))?;

        Self::new(name, mode, target)
            .map_err(|e| Error::corrupted_object("tree", e.to_string()))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Compare by name (bytewise UTF-8) for canonical ordering.
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.as_bytes().cmp(other.name.as_bytes())
    }
}

/// Encode a list of tree entries, sorted by name.
///
/// Duplicate names are rejected: they would make the encoding ambiguous.
pub fn encode_tree(mut entries: Vec<Entry>) -> Result<Vec<u8>> {
    entries.sort();

    if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(Error::invalid_tree_entry(format!(
            "Duplicate entry name: {}",
            pair[0].name
        )));
    }

    let mut buf = Vec::new();
    for entry in &entries {
        buf.extend_from_slice(&entry.encode());
    }
    Ok(buf)
}

/// Decode a list of tree entries from bytes.
pub fn decode_tree(data: &[u8]) -> Result<Vec<Entry>> {
    let mut reader = std::io::Cursor::new(data);
    let mut entries: Vec<Entry> = Vec::new();

    while reader.position() < data.len() as u64 {
        let entry = Entry::decode(&mut reader)
            .map_err(|e| match e {
                Error::Io { source } => {
                    Error::corrupted_object("tree", format!("Truncated entry: {}", source))
                }
                other => other,
            })?;

        if let Some(last) = entries.last()
            && last.name.as_bytes() >= entry.name.as_bytes()
        {
            return Err(Error::corrupted_object(
                "tree",
                format!("Entries out of order at {}", entry.name),
            ));
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Binary search a sorted entry list by name.
pub fn find<'a>(entries: &'a [Entry], name: &str) -> Option<&'a Entry> {
    entries
        .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
        .ok()
        .map(|idx| &entries[idx])
}
