//! Producing a new root tree from an insert, update or delete at a path.
//!
//! Only the directories on the path from the root to the leaf are rewritten;
//! every other subtree is carried over by digest.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::path::RepoPath;
use crate::resolve::{self, MissingDirs};
use crate::store::ObjectStore;
use crate::tree::{Entry, EntryMode};
use tracing::debug;

/// Change to apply at the leaf of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Insert the entry, or replace an existing one of the same name.
    Upsert {
        /// Mode of the new entry.
        mode: EntryMode,
        /// Object the entry points at.
        target: Digest,
    },
    /// Remove the entry.
    Delete,
}

/// Apply `mutation` at `path` under `root` and return the new root digest.
///
/// Missing directories are created for an upsert and are an error for a
/// delete. Deleting an absent leaf from an existing directory returns `root`
/// unchanged. Directories left empty are kept.
pub fn mutate(
    store: &dyn ObjectStore,
    root: &Digest,
    path: &RepoPath,
    mutation: Mutation,
) -> Result<Digest> {
    let missing = match mutation {
        Mutation::Upsert { .. } => MissingDirs::Create,
        Mutation::Delete => MissingDirs::Fail,
    };
    let resolution = resolve::resolve(store, root, path, missing)?;

    if mutation == Mutation::Delete && resolution.leaf.is_none() {
        debug!(%path, "delete of absent entry leaves root unchanged");
        return Ok(*root);
    }

    let segments = path.segments();
    let leaf = path
        .leaf()
        .ok_or_else(|| Error::invalid_path(path.to_string(), "the root cannot be replaced"))?;
    let mut replacement = match mutation {
        Mutation::Upsert { mode, target } => Some(Entry::new(leaf, mode, target)?),
        Mutation::Delete => None,
    };
    let mut removed = leaf;
    let mut new_root = *root;

    for (depth, frame) in resolution.frames.into_iter().enumerate().rev() {
        let mut entries = frame.entries;
        splice(&mut entries, removed, replacement.take());

        let digest = store.put_tree(entries)?;
        debug!(depth, %digest, "rewrote directory");

        if depth == 0 {
            new_root = digest;
        } else {
            let name = segments[depth - 1].as_str();
            replacement = Some(Entry::subtree(name, digest)?);
            removed = name;
        }
    }

    if new_root == *root {
        debug!(%path, "mutation produced identical root");
    }
    Ok(new_root)
}

/// Replace, insert or remove `name` in a sorted entry list.
fn splice(entries: &mut Vec<Entry>, name: &str, replacement: Option<Entry>) {
    let position = entries.binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()));
    match (position, replacement) {
        (Ok(idx), Some(entry)) => entries[idx] = entry,
        (Ok(idx), None) => {
            entries.remove(idx);
        }
        (Err(idx), Some(entry)) => entries.insert(idx, entry),
        (Err(_), None) => {}
    }
}
