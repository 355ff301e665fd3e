//! Walking a root tree down a path.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::path::RepoPath;
use crate::store::ObjectStore;
use crate::tree::{self, Entry, EntryMode};
use tracing::debug;

/// What to do when a directory on the way to the leaf does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDirs {
    /// Treat it as an empty directory to be written later.
    Create,
    /// Fail with `PathNotFound`.
    Fail,
}

/// One directory on the way from the root to the leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stored digest, `None` for a directory that does not exist yet.
    pub digest: Option<Digest>,
    /// Entries of the directory, sorted.
    pub entries: Vec<Entry>,
}

/// Result of resolving a path for writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Root first; the last frame is the directory holding the leaf.
    pub frames: Vec<Frame>,
    /// The leaf entry, if present.
    pub leaf: Option<Entry>,
}

/// Look up the entry at `path` under `root`, for reading.
///
/// A missing segment, or a segment that names a file where a directory is
/// needed, yields `None`. The root path yields a synthetic subtree entry with
/// an empty name.
pub fn find_entry(store: &dyn ObjectStore, root: &Digest, path: &RepoPath) -> Result<Option<Entry>> {
    let Some(leaf) = path.leaf() else {
        return Ok(Some(Entry {
            name: String::new(),
            mode: EntryMode::Subtree,
            target: *root,
        }));
    };

    let mut current = *root;
    for segment in path.dirs() {
        let entries = store.get_tree(&current)?;
        match tree::find(&entries, segment) {
            Some(entry) if entry.mode.is_tree() => current = entry.target,
            _ => return Ok(None),
        }
    }

    let entries = store.get_tree(&current)?;
    Ok(tree::find(&entries, leaf).cloned())
}

/// Resolve the directory chain leading to `path`, for writing.
///
/// A directory segment that names a file is a `PathConflict`. The root path
/// is not a valid target for a write.
pub fn resolve(
    store: &dyn ObjectStore,
    root: &Digest,
    path: &RepoPath,
    missing: MissingDirs,
) -> Result<Resolution> {
    let leaf = path
        .leaf()
        .ok_or_else(|| Error::invalid_path(path.to_string(), "the root cannot be replaced"))?;

    let mut frames = Vec::with_capacity(path.segments().len());
    frames.push(Frame {
        digest: Some(*root),
        entries: store.get_tree(root)?,
    });

    for segment in path.dirs() {
        let Some(parent) = frames.last() else {
            break;
        };
        let next = match tree::find(&parent.entries, segment) {
            Some(entry) if entry.mode.is_tree() => Frame {
                digest: Some(entry.target),
                entries: store.get_tree(&entry.target)?,
            },
            Some(_) => return Err(Error::path_conflict(path.to_string(), segment.as_str())),
            None if missing == MissingDirs::Create => {
                debug!(%path, %segment, "synthesizing missing directory");
                Frame {
                    digest: None,
                    entries: Vec::new(),
                }
            }
            None => return Err(Error::path_not_found(path.to_string())),
        };
        frames.push(next);
    }

    let leaf = frames
        .last()
        .and_then(|frame| tree::find(&frame.entries, leaf))
        .cloned();

    Ok(Resolution { frames, leaf })
}
