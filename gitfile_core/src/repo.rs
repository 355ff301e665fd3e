//! The repository handle and every operation on it.

use crate::commit::{Commit, Signature, Tag};
use crate::config::{DEFAULT_BRANCH, RepoConfig};
use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::memory::{MemoryRefs, MemoryStore};
use crate::mutate::{self, Mutation};
use crate::object::ObjectType;
use crate::path::RepoPath;
use crate::reflog::ReflogEntry;
use crate::refs::{RefKind, RefStore};
use crate::resolve;
use crate::revision::Revision;
use crate::store::{ObjectStore, Store};
use crate::tree::{Entry, EntryMode};
use crate::validate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Description of a tree entry as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Entry name; empty for the root tree.
    pub name: String,
    /// Target digest.
    pub digest: Digest,
    /// Entry mode.
    pub mode: EntryMode,
    /// Type of the target.
    pub object_type: ObjectType,
    /// Size in bytes, blobs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A repository: one object store and one reference store.
///
/// Cheap to clone; clones share the same stores and may be used from
/// several threads.
#[derive(Clone)]
pub struct Repository {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    default_branch: String,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("default_branch", &self.default_branch)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Repository over the given stores.
    pub fn new(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self {
            objects,
            refs,
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }

    /// Empty repository held in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryRefs::new()))
    }

    /// Create an on-disk repository at `path`. No branch exists until the
    /// first commit is created.
    pub fn init<P: AsRef<Path>>(path: P, config: &RepoConfig) -> Result<Self> {
        Self::from_store(Store::init(path, config)?)
    }

    /// Open an existing on-disk repository.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_store(Store::open(path)?)
    }

    fn from_store(store: Store) -> Result<Self> {
        let refs = store.refs();
        let default_branch = store.config().default_branch.clone();
        Ok(Self {
            objects: Arc::new(store),
            refs: Arc::new(refs),
            default_branch,
        })
    }

    /// Branch used when the caller names none.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// The object store.
    pub fn objects(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    /// The reference store.
    pub fn refs(&self) -> &dyn RefStore {
        self.refs.as_ref()
    }

    // ---------------------------------------------------------------------
    // References
    // ---------------------------------------------------------------------

    /// All references of one kind.
    pub fn list_references(&self, kind: RefKind) -> Result<BTreeMap<String, Digest>> {
        self.refs.list(kind)
    }

    /// Create a branch or lightweight tag. Branches must point at commits;
    /// tags may point at any stored object.
    pub fn create_reference(&self, kind: RefKind, name: &str, target: &Digest) -> Result<()> {
        validate::ref_name(name)?;
        let object_type = self.require(target)?;
        if kind == RefKind::Branch && object_type != ObjectType::Commit {
            return Err(Error::invalid_object_type(
                ObjectType::Commit.as_str(),
                object_type.as_str(),
            ));
        }
        self.refs
            .create(kind, name, target, &format!("{}: created", kind.as_str()))
    }

    /// Delete a reference and return its last target. Objects are untouched.
    pub fn delete_reference(&self, kind: RefKind, name: &str) -> Result<Digest> {
        validate::ref_name(name)?;
        self.refs.delete(kind, name)
    }

    /// Transitions of a reference, oldest first.
    pub fn reflog(&self, kind: RefKind, name: &str) -> Result<Vec<ReflogEntry>> {
        self.refs.reflog(kind, name)
    }

    // ---------------------------------------------------------------------
    // Objects
    // ---------------------------------------------------------------------

    /// Store file content.
    pub fn put_blob(&self, data: &[u8]) -> Result<Digest> {
        self.objects.put_blob(data)
    }

    /// File content, or `None` if the digest is absent or not a blob.
    pub fn get_blob(&self, digest: &Digest) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .get(digest)?
            .filter(|obj| obj.object_type == ObjectType::Blob)
            .map(|obj| obj.payload))
    }

    /// Read a commit.
    pub fn read_commit(&self, digest: &Digest) -> Result<Commit> {
        self.objects.get_commit(digest)
    }

    /// Type of a stored object, `ObjectNotFound` if absent.
    fn require(&self, digest: &Digest) -> Result<ObjectType> {
        self.objects
            .object_type(digest)?
            .ok_or_else(|| Error::object_not_found(digest.to_hex()))
    }

    // ---------------------------------------------------------------------
    // Reading snapshots
    // ---------------------------------------------------------------------

    fn branch_head(&self, branch: &str) -> Result<Digest> {
        validate::ref_name(branch)?;
        self.refs
            .read(RefKind::Branch, branch)?
            .ok_or_else(|| Error::ref_not_found(RefKind::Branch.qualify(branch)))
    }

    fn tag_target(&self, name: &str) -> Result<Digest> {
        validate::ref_name(name)?;
        self.refs
            .read(RefKind::Tag, name)?
            .ok_or_else(|| Error::ref_not_found(RefKind::Tag.qualify(name)))
    }

    /// Follow annotated tags until something that is not a tag.
    fn peel_tags(&self, mut digest: Digest) -> Result<(Digest, ObjectType)> {
        loop {
            match self.require(&digest)? {
                ObjectType::Tag => digest = self.objects.get_tag(&digest)?.object,
                other => return Ok((digest, other)),
            }
        }
    }

    /// Root tree of a revision.
    pub fn root_tree(&self, revision: &Revision) -> Result<Digest> {
        let start = match revision {
            Revision::Branch(name) => self.branch_head(name)?,
            Revision::Tag(name) => self.tag_target(name)?,
            Revision::Commit(digest) => return Ok(self.objects.get_commit(digest)?.tree),
        };

        match self.peel_tags(start)? {
            (digest, ObjectType::Commit) => Ok(self.objects.get_commit(&digest)?.tree),
            (digest, ObjectType::Tree) => Ok(digest),
            (_, other) => Err(Error::invalid_object_type("commit or tree", other.as_str())),
        }
    }

    /// Commit named by a revision.
    pub fn resolve_commit(&self, revision: &Revision) -> Result<Digest> {
        let start = match revision {
            Revision::Branch(name) => return self.branch_head(name),
            Revision::Tag(name) => self.tag_target(name)?,
            Revision::Commit(digest) => *digest,
        };

        match self.peel_tags(start)? {
            (digest, ObjectType::Commit) => Ok(digest),
            (_, other) => Err(Error::invalid_object_type(
                ObjectType::Commit.as_str(),
                other.as_str(),
            )),
        }
    }

    fn entry_info(&self, entry: &Entry) -> Result<EntryInfo> {
        let object_type = entry.mode.object_type();
        let size = match object_type {
            ObjectType::Blob => self
                .objects
                .get(&entry.target)?
                .map(|obj| obj.payload.len() as u64),
            _ => None,
        };
        Ok(EntryInfo {
            name: entry.name.clone(),
            digest: entry.target,
            mode: entry.mode,
            object_type,
            size,
        })
    }

    /// Entry at `path` in a revision, `None` if there is none.
    pub fn resolve_path(&self, revision: &Revision, path: &str) -> Result<Option<EntryInfo>> {
        let path = RepoPath::parse(path)?;
        let root = self.root_tree(revision)?;
        resolve::find_entry(self.objects.as_ref(), &root, &path)?
            .map(|entry| self.entry_info(&entry))
            .transpose()
    }

    /// Entries of the directory at `path` in a revision.
    pub fn list_directory(&self, revision: &Revision, path: &str) -> Result<Vec<EntryInfo>> {
        let parsed = RepoPath::parse(path)?;
        let root = self.root_tree(revision)?;
        let entry = resolve::find_entry(self.objects.as_ref(), &root, &parsed)?
            .ok_or_else(|| Error::path_not_found(parsed.to_string()))?;
        if !entry.mode.is_tree() {
            return Err(Error::invalid_object_type(
                ObjectType::Tree.as_str(),
                entry.mode.object_type().as_str(),
            ));
        }

        self.objects
            .get_tree(&entry.target)?
            .iter()
            .map(|e| self.entry_info(e))
            .collect()
    }

    /// First-parent history starting at a revision, newest first.
    pub fn history(&self, revision: &Revision, limit: Option<usize>) -> Result<Vec<(Digest, Commit)>> {
        let mut next = Some(self.resolve_commit(revision)?);
        let mut commits = Vec::new();

        while let Some(digest) = next {
            if limit.is_some_and(|max| commits.len() >= max) {
                break;
            }
            let commit = self.objects.get_commit(&digest)?;
            next = commit.parent();
            commits.push((digest, commit));
        }

        Ok(commits)
    }

    // ---------------------------------------------------------------------
    // Commits
    // ---------------------------------------------------------------------

    /// Commit `root` on top of the branch's current head.
    pub fn commit(
        &self,
        branch: &str,
        root: &Digest,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Digest> {
        let parent = self.branch_head(branch)?;
        self.commit_onto(branch, &parent, root, author, committer, message)
    }

    /// Commit `root` with `parent` and move the branch from `parent` to the
    /// new commit. Fails with `ConcurrentUpdate` if the branch has moved.
    pub fn commit_onto(
        &self,
        branch: &str,
        parent: &Digest,
        root: &Digest,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Digest> {
        validate::ref_name(branch)?;
        self.objects.get_typed(root, ObjectType::Tree)?;

        let commit = Commit {
            tree: *root,
            parents: vec![*parent],
            author: author.clone(),
            committer: committer.clone(),
            message: message.to_string(),
        };
        let digest = self.objects.put_commit(&commit)?;

        self.refs.update(
            RefKind::Branch,
            branch,
            parent,
            &digest,
            &format!("commit: {}", summary(message)),
        )?;

        info!(branch, commit = %digest, parent = %parent, tree = %root, "committed");
        Ok(digest)
    }

    /// Start a new branch with an empty tree and a parentless commit.
    pub fn create_root_commit(
        &self,
        branch: &str,
        author: &Signature,
        message: &str,
    ) -> Result<Digest> {
        validate::ref_name(branch)?;
        if self.refs.read(RefKind::Branch, branch)?.is_some() {
            return Err(Error::ref_exists(RefKind::Branch.qualify(branch)));
        }

        let tree = self.objects.put_tree(Vec::new())?;
        let commit = Commit {
            tree,
            parents: Vec::new(),
            author: author.clone(),
            committer: author.clone(),
            message: message.to_string(),
        };
        let digest = self.objects.put_commit(&commit)?;

        self.refs.create(
            RefKind::Branch,
            branch,
            &digest,
            &format!("commit (initial): {}", summary(message)),
        )?;

        info!(branch, commit = %digest, "created root commit");
        Ok(digest)
    }

    /// Create an annotated tag object pointing at `target` and a tag ref
    /// `name` pointing at the tag object.
    pub fn create_annotated_tag(
        &self,
        name: &str,
        target: &Digest,
        tagger: &Signature,
        message: &str,
    ) -> Result<Digest> {
        validate::ref_name(name)?;
        let object_type = self.require(target)?;
        if self.refs.read(RefKind::Tag, name)?.is_some() {
            return Err(Error::ref_exists(RefKind::Tag.qualify(name)));
        }

        let tag = Tag {
            object: *target,
            object_type,
            name: name.to_string(),
            tagger: tagger.clone(),
            message: message.to_string(),
        };
        let digest = self.objects.put_tag(&tag)?;
        self.refs
            .create(RefKind::Tag, name, &digest, "tag: created annotated")?;

        Ok(digest)
    }

    // ---------------------------------------------------------------------
    // File operations
    // ---------------------------------------------------------------------

    /// Head of `branch` and its root tree.
    fn head_and_root(&self, branch: &str) -> Result<(Digest, Digest)> {
        let head = self.branch_head(branch)?;
        let root = self.objects.get_commit(&head)?.tree;
        Ok((head, root))
    }

    /// Apply a mutation against the head it was computed from.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        branch: &str,
        head: &Digest,
        root: &Digest,
        path: &RepoPath,
        mutation: Mutation,
        author: &Signature,
        message: &str,
    ) -> Result<Digest> {
        let new_root = mutate::mutate(self.objects.as_ref(), root, path, mutation)?;
        debug!(branch, %path, old_root = %root, new_root = %new_root, "mutated tree");
        self.commit_onto(branch, head, &new_root, author, author, message)
    }

    /// Create or replace the entry at `path` on `branch`.
    ///
    /// Missing directories are created. With no `mode`, a blob becomes a
    /// regular file and a tree becomes a directory.
    pub fn put_file(
        &self,
        branch: &str,
        path: &str,
        content: &Digest,
        mode: Option<EntryMode>,
        author: &Signature,
        message: &str,
    ) -> Result<Digest> {
        validate::ref_name(branch)?;
        let path = file_path(path)?;
        let mode = validate::mode_for(mode, self.require(content)?)?;

        let (head, root) = self.head_and_root(branch)?;
        self.apply(
            branch,
            &head,
            &root,
            &path,
            Mutation::Upsert {
                mode,
                target: *content,
            },
            author,
            message,
        )
    }

    /// Change the content and/or mode of an existing entry.
    ///
    /// Omitted values keep the entry's current ones. A kept mode that does not
    /// fit new content of another type is derived from the content instead.
    pub fn update_file(
        &self,
        branch: &str,
        path: &str,
        content: Option<&Digest>,
        mode: Option<EntryMode>,
        author: &Signature,
        message: &str,
    ) -> Result<Digest> {
        validate::ref_name(branch)?;
        let path = file_path(path)?;
        if content.is_none() && mode.is_none() {
            return Err(Error::missing_field("content or mode"));
        }
        let content_type = content.map(|c| self.require(c)).transpose()?;

        let (head, root) = self.head_and_root(branch)?;
        let existing = resolve::find_entry(self.objects.as_ref(), &root, &path)?
            .ok_or_else(|| Error::path_not_found(path.to_string()))?;

        let target = content.copied().unwrap_or(existing.target);
        let object_type = content_type.unwrap_or(existing.mode.object_type());
        let mode = match mode {
            Some(mode) => Some(mode),
            None if existing.mode.object_type() == object_type => Some(existing.mode),
            None => None,
        };
        let mode = validate::mode_for(mode, object_type)?;

        self.apply(
            branch,
            &head,
            &root,
            &path,
            Mutation::Upsert { mode, target },
            author,
            message,
        )
    }

    /// Remove the entry at `path` on `branch`.
    pub fn delete_file(
        &self,
        branch: &str,
        path: &str,
        author: &Signature,
        message: &str,
    ) -> Result<Digest> {
        validate::ref_name(branch)?;
        let path = file_path(path)?;

        let (head, root) = self.head_and_root(branch)?;
        if resolve::find_entry(self.objects.as_ref(), &root, &path)?.is_none() {
            return Err(Error::path_not_found(path.to_string()));
        }

        self.apply(branch, &head, &root, &path, Mutation::Delete, author, message)
    }
}

/// Parse a path that must name an entry, not the root.
fn file_path(raw: &str) -> Result<RepoPath> {
    let path = RepoPath::parse(raw)?;
    if path.is_root() {
        return Err(Error::invalid_path(raw, "path must name an entry below the root"));
    }
    Ok(path)
}

/// First line of a commit message, for reflogs.
fn summary(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim()
}
