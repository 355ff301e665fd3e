//! # gitfile core
//!
//! Edit files on a branch of a content-addressed repository without a
//! working copy.
//!
//! Objects (blobs, trees, commits, tags) are immutable and addressed by their
//! BLAKE3 digest. Writing a file at a path rebuilds only the directories
//! between the root and that path, reusing every other subtree, wraps the new
//! root in a commit and moves the branch with compare-and-swap.
//!
//! ## Features
//!
//! - Content-addressed storage on disk or in memory
//! - Canonical tree encoding: same entries, same digest
//! - Path-level put, update and delete committed onto a branch
//! - Branches and (annotated) tags with compare-and-swap updates and reflogs
//!
//! ## Example
//!
//! ```no_run
//! use gitfile_core::{RepoConfig, Repository, Revision, Signature};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::init("./my-repo", &RepoConfig::default())?;
//! let me = Signature::now("Ada", "ada@example.com")?;
//! repo.create_root_commit("master", &me, "Initial commit")?;
//!
//! let blob = repo.put_blob(b"# Notes\n")?;
//! let commit = repo.put_file("master", "/docs/notes.md", &blob, None, &me, "Add notes")?;
//! println!("master is now {}", commit);
//!
//! let rev = Revision::Branch("master".into());
//! let entry = repo.resolve_path(&rev, "/docs/notes.md")?;
//! assert_eq!(entry.map(|e| e.digest), Some(blob));
//! # Ok(())
//! # }
//! ```

mod commit;
mod config;
mod error;
mod hash;
mod memory;
pub mod mutate;
mod object;
mod path;
mod reflog;
mod refs;
mod repo;
pub mod resolve;
mod revision;
mod store;
mod tree;
pub mod validate;

pub use commit::{Commit, Signature, Tag};
pub use config::{DEFAULT_BRANCH, RepoConfig};
pub use error::{Error, ErrorKind, Result};
pub use hash::{Algorithm, DIGEST_HEX_LEN, Digest};
pub use memory::{MemoryRefs, MemoryStore};
pub use mutate::Mutation;
pub use object::{ObjectHeader, ObjectType};
pub use path::RepoPath;
pub use reflog::ReflogEntry;
pub use refs::{RefKind, RefManager, RefStore, STALE_LOCK_AGE};
pub use repo::{EntryInfo, Repository};
pub use resolve::MissingDirs;
pub use revision::Revision;
pub use store::{ObjectStore, RawObject, Store};
pub use tree::{Entry, EntryMode};
