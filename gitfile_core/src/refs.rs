//! Named references: branches and tags.
//!
//! References are the only mutable state in a repository. Every write goes
//! through compare-and-swap so that two writers racing on the same branch
//! cannot silently overwrite each other.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::reflog::{Reflog, ReflogEntry};
use crate::validate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// A `.lock` file older than this is taken to be left over from a crashed
/// writer rather than held by a live one.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(10);

/// Namespace of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// `refs/heads/<name>`, always points at a commit.
    Branch,
    /// `refs/tags/<name>`, may point at any object.
    Tag,
}

impl RefKind {
    /// Directory under `refs/`.
    pub fn dir(self) -> &'static str {
        match self {
            RefKind::Branch => "heads",
            RefKind::Tag => "tags",
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            RefKind::Branch => "branch",
            RefKind::Tag => "tag",
        }
    }

    /// Fully qualified name, e.g. `refs/heads/master`.
    pub fn qualify(self, name: &str) -> String {
        format!("refs/{}/{}", self.dir(), name)
    }
}

/// Storage of references with compare-and-swap updates.
pub trait RefStore: Send + Sync {
    /// Current target of a reference.
    fn read(&self, kind: RefKind, name: &str) -> Result<Option<Digest>>;

    /// All references of one kind, by name.
    fn list(&self, kind: RefKind) -> Result<BTreeMap<String, Digest>>;

    /// Create a reference. Fails with `RefExists` if it is already present.
    fn create(&self, kind: RefKind, name: &str, target: &Digest, reason: &str) -> Result<()>;

    /// Move a reference from `expected` to `new`. Fails with
    /// `ConcurrentUpdate` if it no longer points at `expected`.
    fn update(
        &self,
        kind: RefKind,
        name: &str,
        expected: &Digest,
        new: &Digest,
        reason: &str,
    ) -> Result<()>;

    /// Delete a reference and return its last target.
    fn delete(&self, kind: RefKind, name: &str) -> Result<Digest>;

    /// Transitions of a reference, oldest first.
    fn reflog(&self, kind: RefKind, name: &str) -> Result<Vec<ReflogEntry>>;
}

/// Failure to compare-and-swap, with the value actually found.
pub(crate) fn cas_failure(
    kind: RefKind,
    name: &str,
    expected: Option<&Digest>,
    actual: Option<&Digest>,
) -> Error {
    let full = kind.qualify(name);
    let expected = expected.map_or_else(|| "<none>".to_string(), Digest::to_hex);
    let actual = actual.map(Digest::to_hex);
    warn!(reference = %full, %expected, actual = ?actual, "lost compare-and-swap");
    Error::concurrent_update(full, expected, actual)
}

/// On-disk reference store: one file per ref holding the target's hex digest.
///
/// Writers take `<ref>.lock` with an exclusive create, write the new value
/// into it and rename it over the ref file. A lock held by someone else is
/// reported as a concurrent update, unless it is older than
/// [`STALE_LOCK_AGE`]: then it is reported as `RefLocked` and must be removed
/// by hand. The reflog is written after the rename; failing to write it does
/// not fail the update.
#[derive(Debug, Clone)]
pub struct RefManager {
    root: PathBuf,
}

impl RefManager {
    /// Reference manager for the repository at `root`.
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Get the path to a reference file.
    fn ref_path(&self, kind: RefKind, name: &str) -> Result<PathBuf> {
        validate::ref_name(name)?;
        Ok(self.root.join("refs").join(kind.dir()).join(name))
    }

    fn log_for(&self, kind: RefKind, name: &str) -> Reflog {
        Reflog::at(self.root.join("logs").join("refs").join(kind.dir()).join(name))
    }

    /// Read a ref file; absent file means absent ref.
    fn read_file(path: &Path) -> Result<Option<Digest>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Digest::from_hex(content.trim())
            .map(Some)
            .map_err(|e| Error::corrupted_object(path.display().to_string(), e.to_string()))
    }

    /// Append to the reflog of a ref that has already moved. A failed append
    /// is logged and otherwise ignored.
    fn record(&self, kind: RefKind, name: &str, entry: &ReflogEntry) {
        if let Err(e) = self.log_for(kind, name).append(entry) {
            warn!(reference = %kind.qualify(name), error = %e, "failed to append reflog entry");
        }
    }

    fn lock(&self, kind: RefKind, name: &str, expected: Option<&Digest>) -> Result<RefLock> {
        let path = self.ref_path(kind, name)?;
        RefLock::acquire(path.clone()).map_err(|e| match e {
            LockError::Held(lock_path) => {
                if lock_age(&lock_path).is_some_and(|age| age >= STALE_LOCK_AGE) {
                    warn!(reference = %kind.qualify(name), lock = %lock_path.display(), "stale reference lock");
                    return Error::ref_locked(kind.qualify(name), lock_path);
                }
                let current = Self::read_file(&path).ok().flatten();
                cas_failure(kind, name, expected, current.as_ref())
            }
            LockError::Other(err) => err,
        })
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    fs::metadata(path).ok()?.modified().ok()?.elapsed().ok()
}

impl RefStore for RefManager {
    fn read(&self, kind: RefKind, name: &str) -> Result<Option<Digest>> {
        Self::read_file(&self.ref_path(kind, name)?)
    }

    fn list(&self, kind: RefKind) -> Result<BTreeMap<String, Digest>> {
        let dir = self.root.join("refs").join(kind.dir());
        let mut refs = BTreeMap::new();

        if !dir.exists() {
            return Ok(refs);
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
                && validate::ref_name(name).is_ok()
                && let Some(digest) = Self::read_file(&path)?
            {
                refs.insert(name.to_string(), digest);
            }
        }

        Ok(refs)
    }

    fn create(&self, kind: RefKind, name: &str, target: &Digest, reason: &str) -> Result<()> {
        let lock = self.lock(kind, name, None)?;
        if Self::read_file(lock.target())?.is_some() {
            return Err(Error::ref_exists(kind.qualify(name)));
        }

        lock.commit(target)?;
        self.record(kind, name, &ReflogEntry::now(None, Some(*target), reason));

        info!(reference = %kind.qualify(name), %target, "created reference");
        Ok(())
    }

    fn update(
        &self,
        kind: RefKind,
        name: &str,
        expected: &Digest,
        new: &Digest,
        reason: &str,
    ) -> Result<()> {
        let lock = self.lock(kind, name, Some(expected))?;
        let current = Self::read_file(lock.target())?;
        if current.as_ref() != Some(expected) {
            return Err(cas_failure(kind, name, Some(expected), current.as_ref()));
        }

        lock.commit(new)?;
        self.record(kind, name, &ReflogEntry::now(Some(*expected), Some(*new), reason));

        info!(reference = %kind.qualify(name), old = %expected, new = %new, "updated reference");
        Ok(())
    }

    fn delete(&self, kind: RefKind, name: &str) -> Result<Digest> {
        let lock = self.lock(kind, name, None)?;
        let current = Self::read_file(lock.target())?
            .ok_or_else(|| Error::ref_not_found(kind.qualify(name)))?;

        fs::remove_file(lock.target())?;
        if let Err(e) = self.log_for(kind, name).remove() {
            warn!(reference = %kind.qualify(name), error = %e, "failed to remove reflog");
        }
        drop(lock);

        info!(reference = %kind.qualify(name), old = %current, "deleted reference");
        Ok(current)
    }

    fn reflog(&self, kind: RefKind, name: &str) -> Result<Vec<ReflogEntry>> {
        validate::ref_name(name)?;
        self.log_for(kind, name).read()
    }
}

enum LockError {
    Held(PathBuf),
    Other(Error),
}

/// Exclusive `<ref>.lock` file. Removed on drop unless committed.
struct RefLock {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl RefLock {
    fn acquire(target: PathBuf) -> std::result::Result<Self, LockError> {
        let mut lock_name = target.as_os_str().to_owned();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::Other(e.into()))?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => Ok(Self {
                target,
                lock_path,
                file: Some(file),
                committed: false,
            }),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => Err(LockError::Held(lock_path)),
            Err(e) => Err(LockError::Other(e.into())),
        }
    }

    fn target(&self) -> &Path {
        &self.target
    }

    /// Write `digest` and atomically rename the lock over the ref.
    fn commit(mut self, digest: &Digest) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            writeln!(file, "{}", digest.to_hex())?;
            file.sync_all()?;
        }
        fs::rename(&self.lock_path, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        // Once renamed, the lock path may already belong to the next writer.
        if !self.committed {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;
    use crate::store::Store;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn new_refs(temp_dir: &TempDir) -> RefManager {
        Store::init(temp_dir.path().join("repo"), &RepoConfig::default())
            .unwrap()
            .refs()
    }

    #[test]
    fn test_create_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let digest = Digest::hash_bytes(b"test");
        refs.create(RefKind::Branch, "master", &digest, "init").unwrap();

        assert_eq!(refs.read(RefKind::Branch, "master").unwrap(), Some(digest));
        assert_eq!(refs.read(RefKind::Tag, "master").unwrap(), None);
        assert!(temp_dir.path().join("repo/refs/heads/master").exists());
        assert!(!temp_dir.path().join("repo/refs/heads/master.lock").exists());
    }

    #[test]
    fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);
        assert_eq!(refs.read(RefKind::Branch, "nonexistent").unwrap(), None);
    }

    #[test]
    fn test_create_existing_fails() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let digest = Digest::hash_bytes(b"test");
        refs.create(RefKind::Tag, "v1", &digest, "").unwrap();
        let err = refs.create(RefKind::Tag, "v1", &digest, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_update_compare_and_swap() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let two = Digest::hash_bytes(b"two");
        let three = Digest::hash_bytes(b"three");

        refs.create(RefKind::Branch, "master", &one, "init").unwrap();
        refs.update(RefKind::Branch, "master", &one, &two, "commit").unwrap();
        assert_eq!(refs.read(RefKind::Branch, "master").unwrap(), Some(two));

        // Stale expectation loses.
        let err = refs
            .update(RefKind::Branch, "master", &one, &three, "commit")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentUpdate);
        assert_eq!(refs.read(RefKind::Branch, "master").unwrap(), Some(two));
    }

    #[test]
    fn test_update_missing_ref_is_concurrent_update() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let err = refs
            .update(RefKind::Branch, "gone", &one, &one, "commit")
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_held_lock_is_concurrent_update() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let two = Digest::hash_bytes(b"two");
        refs.create(RefKind::Branch, "master", &one, "init").unwrap();

        let lock_path = temp_dir.path().join("repo/refs/heads/master.lock");
        fs::write(&lock_path, "").unwrap();

        let err = refs
            .update(RefKind::Branch, "master", &one, &two, "commit")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentUpdate);
        // Someone else's lock is left alone.
        assert!(lock_path.exists());
        assert_eq!(refs.read(RefKind::Branch, "master").unwrap(), Some(one));
    }

    #[test]
    fn test_stale_lock_is_not_retryable() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let two = Digest::hash_bytes(b"two");
        refs.create(RefKind::Branch, "master", &one, "init").unwrap();

        let lock_path = temp_dir.path().join("repo/refs/heads/master.lock");
        fs::write(&lock_path, "").unwrap();
        let old = std::time::SystemTime::now() - STALE_LOCK_AGE * 6;
        File::options()
            .write(true)
            .open(&lock_path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let err = refs
            .update(RefKind::Branch, "master", &one, &two, "commit")
            .unwrap_err();
        assert!(matches!(err, Error::RefLocked { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("master.lock"));
        assert!(lock_path.exists());

        fs::remove_file(&lock_path).unwrap();
        refs.update(RefKind::Branch, "master", &one, &two, "commit")
            .unwrap();
        assert_eq!(refs.read(RefKind::Branch, "master").unwrap(), Some(two));
    }

    #[test]
    fn test_unwritable_reflog_does_not_fail_moved_ref() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let two = Digest::hash_bytes(b"two");
        refs.create(RefKind::Branch, "master", &one, "init").unwrap();

        // A directory where the log file belongs makes every append fail.
        let log_path = temp_dir.path().join("repo/logs/refs/heads/master");
        fs::remove_file(&log_path).unwrap();
        fs::create_dir_all(&log_path).unwrap();

        refs.update(RefKind::Branch, "master", &one, &two, "commit")
            .unwrap();
        assert_eq!(refs.read(RefKind::Branch, "master").unwrap(), Some(two));

        refs.create(RefKind::Tag, "v1", &two, "tag").unwrap();
        fs::remove_file(temp_dir.path().join("repo/logs/refs/tags/v1")).unwrap();
        fs::create_dir_all(temp_dir.path().join("repo/logs/refs/tags/v1/x")).unwrap();
        assert_eq!(refs.delete(RefKind::Tag, "v1").unwrap(), two);
        assert_eq!(refs.read(RefKind::Tag, "v1").unwrap(), None);
    }

    #[test]
    fn test_list_by_kind() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let two = Digest::hash_bytes(b"two");

        refs.create(RefKind::Branch, "zeta", &one, "").unwrap();
        refs.create(RefKind::Branch, "alpha", &two, "").unwrap();
        refs.create(RefKind::Tag, "v1", &one, "").unwrap();

        let branches = refs.list(RefKind::Branch).unwrap();
        let names: Vec<_> = branches.keys().cloned().collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert_eq!(branches["alpha"], two);

        let tags = refs.list(RefKind::Tag).unwrap();
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let digest = Digest::hash_bytes(b"test");
        refs.create(RefKind::Branch, "topic", &digest, "").unwrap();

        assert_eq!(refs.delete(RefKind::Branch, "topic").unwrap(), digest);
        assert_eq!(refs.read(RefKind::Branch, "topic").unwrap(), None);
        assert!(refs.reflog(RefKind::Branch, "topic").unwrap().is_empty());

        let err = refs.delete(RefKind::Branch, "topic").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_reflog_records_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let one = Digest::hash_bytes(b"one");
        let two = Digest::hash_bytes(b"two");
        refs.create(RefKind::Branch, "master", &one, "branch: created").unwrap();
        refs.update(RefKind::Branch, "master", &one, &two, "commit: edit").unwrap();

        let log = refs.reflog(RefKind::Branch, "master").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!((log[0].old, log[0].new), (None, Some(one)));
        assert_eq!((log[1].old, log[1].new), (Some(one), Some(two)));
        assert_eq!(log[1].reason, "commit: edit");
    }

    #[test]
    fn test_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        let refs = new_refs(&temp_dir);

        let digest = Digest::hash_bytes(b"test");
        for bad in ["../etc/passwd", "foo/bar", "", "x.lock"] {
            let err = refs.create(RefKind::Branch, bad, &digest, "").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{:?}", bad);
        }
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Valid ref names are accepted and read back
        #[test]
        fn prop_valid_ref_names_accepted(name in "[a-zA-Z0-9_][a-zA-Z0-9_-]{0,49}") {
            let temp_dir = TempDir::new().unwrap();
            let refs = new_refs(&temp_dir);

            let digest = Digest::hash_bytes(b"test data");
            prop_assert!(refs.create(RefKind::Tag, &name, &digest, "").is_ok());
            prop_assert_eq!(refs.read(RefKind::Tag, &name)?, Some(digest));
        }
    }
}
