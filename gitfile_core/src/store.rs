//! Object storage: the `ObjectStore` seam and the on-disk store.

use crate::commit::{Commit, Tag};
use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest};
use crate::object::{CompressionType, HEADER_SIZE, ObjectHeader, ObjectType};
use crate::refs::RefManager;
use crate::tree::{self, Entry};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Compression threshold: blobs >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// An object as held by a store: its type and canonical payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    /// Object type.
    pub object_type: ObjectType,
    /// Canonical (uncompressed) payload.
    pub payload: Vec<u8>,
}

/// Content-addressed storage of immutable objects.
///
/// Implementations must make `put` idempotent: storing the same payload
/// twice yields the same digest and does not grow the store. `get` returns
/// `Ok(None)` for an absent digest and an error only for an unreadable or
/// corrupt store.
pub trait ObjectStore: Send + Sync {
    /// Store an object and return its digest.
    fn put(&self, object_type: ObjectType, payload: &[u8]) -> Result<Digest>;

    /// Fetch an object.
    fn get(&self, digest: &Digest) -> Result<Option<RawObject>>;

    /// Whether an object is present.
    fn contains(&self, digest: &Digest) -> Result<bool>;

    /// Type of a stored object, `None` if absent.
    fn object_type(&self, digest: &Digest) -> Result<Option<ObjectType>> {
        Ok(self.get(digest)?.map(|obj| obj.object_type))
    }

    /// Fetch an object that must exist and have type `expected`.
    fn get_typed(&self, digest: &Digest, expected: ObjectType) -> Result<Vec<u8>> {
        let obj = self
            .get(digest)?
            .ok_or_else(|| Error::object_not_found(digest.to_hex()))?;
        if obj.object_type != expected {
            return Err(Error::invalid_object_type(
                expected.as_str(),
                obj.object_type.as_str(),
            ));
        }
        Ok(obj.payload)
    }

    /// Store a blob.
    fn put_blob(&self, data: &[u8]) -> Result<Digest> {
        self.put(ObjectType::Blob, data)
    }

    /// Store a tree. Entries are sorted into canonical order.
    fn put_tree(&self, entries: Vec<Entry>) -> Result<Digest> {
        let payload = tree::encode_tree(entries)?;
        self.put(ObjectType::Tree, &payload)
    }

    /// Store a commit.
    fn put_commit(&self, commit: &Commit) -> Result<Digest> {
        self.put(ObjectType::Commit, &commit.encode())
    }

    /// Store an annotated tag.
    fn put_tag(&self, tag: &Tag) -> Result<Digest> {
        self.put(ObjectType::Tag, &tag.encode())
    }

    /// Fetch a tree's entries.
    fn get_tree(&self, digest: &Digest) -> Result<Vec<Entry>> {
        let payload = self.get_typed(digest, ObjectType::Tree)?;
        tree::decode_tree(&payload).map_err(|e| with_location(e, digest))
    }

    /// Fetch a commit.
    fn get_commit(&self, digest: &Digest) -> Result<Commit> {
        let payload = self.get_typed(digest, ObjectType::Commit)?;
        Commit::decode(&payload).map_err(|e| with_location(e, digest))
    }

    /// Fetch an annotated tag.
    fn get_tag(&self, digest: &Digest) -> Result<Tag> {
        let payload = self.get_typed(digest, ObjectType::Tag)?;
        Tag::decode(&payload).map_err(|e| with_location(e, digest))
    }
}

/// Point a decode failure at the object it came from.
fn with_location(err: Error, digest: &Digest) -> Error {
    match err {
        Error::CorruptedObject { reason, .. } => Error::corrupted_object(digest.to_hex(), reason),
        other => other,
    }
}

/// An on-disk object store.
///
/// Layout under the repository root:
/// - `config` with version, algorithm and default branch
/// - `objects/<algo>/<xx>/<rest>` one file per object
/// - `refs/heads/`, `refs/tags/` one file per reference
/// - `logs/refs/...` reflogs
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    config: RepoConfig,
}

impl Store {
    /// Initialize a new store at the given path.
    pub fn init<P: AsRef<Path>>(root: P, config: &RepoConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if root.join("config").exists() {
            return Err(Error::invalid_store(&root, "already initialized"));
        }

        fs::create_dir_all(root.join("objects").join(config.algorithm.as_str()))?;
        fs::create_dir_all(root.join("refs").join("heads"))?;
        fs::create_dir_all(root.join("refs").join("tags"))?;
        fs::create_dir_all(root.join("logs").join("refs"))?;
        fs::write(root.join("config"), config.render())?;

        debug!(root = %root.display(), "initialized store");

        Ok(Self {
            root,
            config: config.clone(),
        })
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config = RepoConfig::parse(&fs::read_to_string(&config_path)?, &config_path)?;

        if !root.join("objects").join(config.algorithm.as_str()).exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        if !root.join("refs").exists() {
            return Err(Error::invalid_store(&root, "refs directory missing"));
        }

        Ok(Self { root, config })
    }

    /// Get the path to an object file given its digest.
    ///
    /// Returns: `objects/{algorithm}/{prefix}/{suffix}`
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("objects")
            .join(self.config.algorithm.as_str())
            .join(digest.prefix())
            .join(digest.suffix())
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    /// Repository configuration.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Reference manager over this store's `refs/` directory.
    pub fn refs(&self) -> RefManager {
        RefManager::new(&self.root)
    }

    /// Read an object header from a file.
    pub(crate) fn read_object_header(&self, path: &Path) -> Result<ObjectHeader> {
        let mut file = fs::File::open(path)?;
        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf).map_err(|e| {
            Error::corrupted_object(path.display().to_string(), format!("Short header: {}", e))
        })?;
        ObjectHeader::decode(&header_buf)
    }

    /// Read a whole object file and return its header and stored payload.
    fn read_object_file(&self, path: &Path) -> Result<(ObjectHeader, Vec<u8>)> {
        let data = fs::read(path)?;
        let header = ObjectHeader::decode(&data)
            .map_err(|e| Error::corrupted_object(path.display().to_string(), e.to_string()))?;
        let payload = data[HEADER_SIZE..].to_vec();

        if payload.len() as u64 != header.payload_len {
            return Err(Error::corrupted_object(
                path.display().to_string(),
                format!(
                    "Payload length mismatch: expected {}, got {}",
                    header.payload_len,
                    payload.len()
                ),
            ));
        }

        Ok((header, payload))
    }

    /// Write an object atomically using tempfile.
    fn write_object_atomic(
        &self,
        digest: &Digest,
        header: &ObjectHeader,
        payload: &[u8],
    ) -> Result<()> {
        let obj_path = self.object_path(digest);
        let shard_dir = obj_path
            .parent()
            .ok_or_else(|| Error::invalid_store(&self.root, "object path has no parent"))?;
        fs::create_dir_all(shard_dir)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(shard_dir)?;
        temp_file.write_all(&header.encode())?;
        temp_file.write_all(payload)?;
        temp_file.flush()?;

        // Rename is atomic, so concurrent writers of the same object converge.
        temp_file.persist(&obj_path)?;

        Ok(())
    }
}

impl ObjectStore for Store {
    fn put(&self, object_type: ObjectType, payload: &[u8]) -> Result<Digest> {
        let digest = Digest::of_object(object_type, payload);

        // Deduplication
        let obj_path = self.object_path(&digest);
        if obj_path.exists() {
            return Ok(digest);
        }

        let (stored, compression) =
            if object_type == ObjectType::Blob && payload.len() >= COMPRESSION_THRESHOLD {
                (compress_zstd(payload)?, CompressionType::Zstd)
            } else {
                (payload.to_vec(), CompressionType::None)
            };

        let header = ObjectHeader::new(
            object_type,
            self.config.algorithm,
            compression,
            stored.len() as u64,
        );
        self.write_object_atomic(&digest, &header, &stored)?;

        debug!(%digest, kind = %object_type, size = payload.len(), "wrote object");
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> Result<Option<RawObject>> {
        let obj_path = self.object_path(digest);
        if !obj_path.exists() {
            return Ok(None);
        }

        let (header, stored) = self.read_object_file(&obj_path)?;
        let payload = match header.compression {
            CompressionType::None => stored,
            CompressionType::Zstd => decompress_zstd(&stored)?,
        };

        // Corruption detection
        let computed = Digest::of_object(header.object_type, &payload);
        if computed != *digest {
            return Err(Error::corrupted_object(
                obj_path.display().to_string(),
                format!("Digest mismatch: expected {}, got {}", digest, computed),
            ));
        }

        Ok(Some(RawObject {
            object_type: header.object_type,
            payload,
        }))
    }

    fn contains(&self, digest: &Digest) -> Result<bool> {
        Ok(self.object_path(digest).exists())
    }

    fn object_type(&self, digest: &Digest) -> Result<Option<ObjectType>> {
        let obj_path = self.object_path(digest);
        if !obj_path.exists() {
            return Ok(None);
        }
        Ok(Some(self.read_object_header(&obj_path)?.object_type))
    }
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3).map_err(|e| {
        Error::from(std::io::Error::other(format!("zstd compression failed: {}", e)))
    })
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::corrupted_object("zstd payload", format!("decompression failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::EntryMode;
    use tempfile::TempDir;

    fn new_store(temp_dir: &TempDir) -> Store {
        Store::init(temp_dir.path().join("repo"), &RepoConfig::default()).unwrap()
    }

    #[test]
    fn test_store_init() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("repo");

        let store = Store::init(&store_path, &RepoConfig::default()).unwrap();
        assert_eq!(store.root(), store_path);
        assert_eq!(store.algorithm(), Algorithm::Blake3);

        assert!(store_path.join("objects/blake3-256").exists());
        assert!(store_path.join("refs/heads").exists());
        assert!(store_path.join("refs/tags").exists());

        let config = fs::read_to_string(store_path.join("config")).unwrap();
        assert!(config.contains("version=1"));
        assert!(config.contains("algo=blake3-256"));
        assert!(config.contains("default_branch=master"));
    }

    #[test]
    fn test_store_init_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        new_store(&temp_dir);
        let again = Store::init(temp_dir.path().join("repo"), &RepoConfig::default());
        assert!(again.is_err());
    }

    #[test]
    fn test_store_open() {
        let temp_dir = TempDir::new().unwrap();
        let config = RepoConfig::default().with_default_branch("main").unwrap();
        Store::init(temp_dir.path().join("repo"), &config).unwrap();

        let store = Store::open(temp_dir.path().join("repo")).unwrap();
        assert_eq!(store.config(), &config);
    }

    #[test]
    fn test_store_open_nonexistent_or_unconfigured() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Store::open(temp_dir.path().join("nonexistent")).is_err());

        let bare = temp_dir.path().join("bare");
        fs::create_dir_all(&bare).unwrap();
        let err = Store::open(&bare).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageFault);
    }

    #[test]
    fn test_object_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let digest = Digest::hash_bytes(b"test");
        let path = store.object_path(&digest);

        assert!(path.ends_with(format!(
            "objects/blake3-256/{}/{}",
            digest.prefix(),
            digest.suffix()
        )));
    }

    #[test]
    fn test_put_get_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let digest = store.put_blob(b"hello world").unwrap();
        assert_eq!(digest, Digest::hash_bytes(b"hello world"));
        assert!(store.contains(&digest).unwrap());

        let obj = store.get(&digest).unwrap().unwrap();
        assert_eq!(obj.object_type, ObjectType::Blob);
        assert_eq!(obj.payload, b"hello world");
    }

    #[test]
    fn test_blob_deduplication() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let first = store.put_blob(b"same content").unwrap();
        let written = fs::metadata(store.object_path(&first)).unwrap().modified().unwrap();
        let second = store.put_blob(b"same content").unwrap();

        assert_eq!(first, second);
        let after = fs::metadata(store.object_path(&first)).unwrap().modified().unwrap();
        assert_eq!(written, after);
    }

    #[test]
    fn test_get_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let digest = Digest::hash_bytes(b"nonexistent");
        assert!(store.get(&digest).unwrap().is_none());
        assert!(!store.contains(&digest).unwrap());
        assert!(store.object_type(&digest).unwrap().is_none());

        let err = store.get_typed(&digest, ObjectType::Blob).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn test_large_blob_is_compressed() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let data = vec![0xAB; 64 * 1024];
        let digest = store.put_blob(&data).unwrap();

        let header = store.read_object_header(&store.object_path(&digest)).unwrap();
        assert_eq!(header.compression, CompressionType::Zstd);
        assert!(header.payload_len < data.len() as u64);

        assert_eq!(store.get(&digest).unwrap().unwrap().payload, data);
    }

    #[test]
    fn test_corruption_detection() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let digest = store.put_blob(b"test").unwrap();

        let obj_path = store.object_path(&digest);
        let mut file_data = fs::read(&obj_path).unwrap();
        file_data[HEADER_SIZE] ^= 0xFF;
        fs::write(&obj_path, file_data).unwrap();

        let err = store.get(&digest).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageFault);
    }

    #[test]
    fn test_truncated_object_detected() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let digest = store.put_blob(b"some longer content").unwrap();
        let obj_path = store.object_path(&digest);
        let file_data = fs::read(&obj_path).unwrap();
        fs::write(&obj_path, &file_data[..file_data.len() - 3]).unwrap();

        assert!(store.get(&digest).is_err());
    }

    #[test]
    fn test_typed_access_checks_type() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let blob = store.put_blob(b"not a tree").unwrap();
        let err = store.get_tree(&blob).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::TypeConflict);
        assert_eq!(store.object_type(&blob).unwrap(), Some(ObjectType::Blob));
    }

    #[test]
    fn test_put_get_tree_canonical() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let blob = store.put_blob(b"x").unwrap();
        let make = |names: &[&str]| {
            names
                .iter()
                .map(|n| Entry::new(*n, EntryMode::Regular, blob).unwrap())
                .collect::<Vec<_>>()
        };

        let first = store.put_tree(make(&["z.txt", "a.txt", "m.txt"])).unwrap();
        let second = store.put_tree(make(&["a.txt", "m.txt", "z.txt"])).unwrap();
        assert_eq!(first, second);

        let entries = store.get_tree(&first).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "m.txt", "z.txt"]);
    }

    #[test]
    fn test_empty_tree_is_stored() {
        let temp_dir = TempDir::new().unwrap();
        let store = new_store(&temp_dir);

        let digest = store.put_tree(Vec::new()).unwrap();
        assert!(store.object_path(&digest).exists());
        assert!(store.get_tree(&digest).unwrap().is_empty());
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            max_shrink_iters: 1000,
            ..ProptestConfig::default()
        })]

        /// Compression round-trip preserves data
        #[test]
        fn prop_compression_roundtrip(data in prop::collection::vec(any::<u8>(), 0..100_000)) {
            let compressed = compress_zstd(&data)?;
            let decompressed = decompress_zstd(&compressed)?;
            prop_assert_eq!(decompressed, data, "Compression must be lossless");
        }

        /// Compression threshold is respected
        #[test]
        fn prop_compression_threshold(data in prop::collection::vec(any::<u8>(), 0..10_000)) {
            let temp_dir = TempDir::new().unwrap();
            let store = new_store(&temp_dir);

            let digest = store.put_blob(&data)?;
            let header = store.read_object_header(&store.object_path(&digest))?;

            if data.len() < COMPRESSION_THRESHOLD {
                prop_assert_eq!(header.compression, CompressionType::None);
            } else {
                prop_assert_eq!(header.compression, CompressionType::Zstd);
            }
        }
    }
}
