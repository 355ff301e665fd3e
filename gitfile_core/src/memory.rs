//! In-memory object and reference stores.
//!
//! Same contracts as the on-disk backends, for tests and for hosts that keep
//! a repository for the lifetime of a process.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::object::ObjectType;
use crate::reflog::ReflogEntry;
use crate::refs::{RefKind, RefStore, cas_failure};
use crate::store::{ObjectStore, RawObject};
use crate::validate;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Object store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Digest, RawObject>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, object_type: ObjectType, payload: &[u8]) -> Result<Digest> {
        let digest = Digest::of_object(object_type, payload);
        self.objects
            .write()
            .entry(digest)
            .or_insert_with(|| RawObject {
                object_type,
                payload: payload.to_vec(),
            });
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> Result<Option<RawObject>> {
        Ok(self.objects.read().get(digest).cloned())
    }

    fn contains(&self, digest: &Digest) -> Result<bool> {
        Ok(self.objects.read().contains_key(digest))
    }

    fn object_type(&self, digest: &Digest) -> Result<Option<ObjectType>> {
        Ok(self.objects.read().get(digest).map(|obj| obj.object_type))
    }
}

#[derive(Debug, Default)]
struct RefState {
    targets: HashMap<(RefKind, String), Digest>,
    logs: HashMap<(RefKind, String), Vec<ReflogEntry>>,
}

/// Reference store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryRefs {
    state: Mutex<RefState>,
}

impl MemoryRefs {
    /// Empty reference store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(kind: RefKind, name: &str) -> Result<(RefKind, String)> {
    validate::ref_name(name)?;
    Ok((kind, name.to_string()))
}

impl RefStore for MemoryRefs {
    fn read(&self, kind: RefKind, name: &str) -> Result<Option<Digest>> {
        let key = key(kind, name)?;
        Ok(self.state.lock().targets.get(&key).copied())
    }

    fn list(&self, kind: RefKind) -> Result<BTreeMap<String, Digest>> {
        Ok(self
            .state
            .lock()
            .targets
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, name), digest)| (name.clone(), *digest))
            .collect())
    }

    fn create(&self, kind: RefKind, name: &str, target: &Digest, reason: &str) -> Result<()> {
        let key = key(kind, name)?;
        let mut state = self.state.lock();
        if state.targets.contains_key(&key) {
            return Err(Error::ref_exists(kind.qualify(name)));
        }
        state.targets.insert(key.clone(), *target);
        state
            .logs
            .entry(key)
            .or_default()
            .push(ReflogEntry::now(None, Some(*target), reason));

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
        let key = key(kind, name)?;
        let mut state = self.state.lock();
        let current = state.targets.get(&key).copied();
        if current.as_ref() != Some(expected) {
            return Err(cas_failure(kind, name, Some(expected), current.as_ref()));
        }
        state.targets.insert(key.clone(), *new);
        state
            .logs
            .entry(key)
            .or_default()
            .push(ReflogEntry::now(Some(*expected), Some(*new), reason));

        info!(reference = %kind.qualify(name), old = %expected, new = %new, "updated reference");
        Ok(())
    }

    fn delete(&self, kind: RefKind, name: &str) -> Result<Digest> {
        let key = key(kind, name)?;
        let mut state = self.state.lock();
        let old = state
            .targets
            .remove(&key)
            .ok_or_else(|| Error::ref_not_found(kind.qualify(name)))?;
        state.logs.remove(&key);

        info!(reference = %kind.qualify(name), %old, "deleted reference");
        Ok(old)
    }

    fn reflog(&self, kind: RefKind, name: &str) -> Result<Vec<ReflogEntry>> {
        let key = key(kind, name)?;
        Ok(self.state.lock().logs.get(&key).cloned().unwrap_or_default())
    }
}
