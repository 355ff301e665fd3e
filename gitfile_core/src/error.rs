//! Error types for gitfile_core.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using gitfile_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], for callers that map failures onto
/// their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed digest, name, path or missing field. Never worth retrying.
    InvalidArgument,
    /// Branch, tag, path or object is absent.
    NotFound,
    /// A path traverses a non-directory, or an object has the wrong type.
    TypeConflict,
    /// Create on a name that already exists, or a reference held by a stale
    /// lock file.
    Conflict,
    /// A reference moved between read and compare-and-swap.
    ConcurrentUpdate,
    /// The underlying store is unreachable or corrupt.
    StorageFault,
}

impl ErrorKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TypeConflict => "type_conflict",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ConcurrentUpdate => "concurrent_update",
            ErrorKind::StorageFault => "storage_fault",
        }
    }
}

/// Errors that can occur during repository operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Stored object is corrupted or cannot be decoded.
    #[error("Corrupted object {location}: {reason}")]
    CorruptedObject { location: String, reason: String },

    /// Repository directory is invalid or not initialized.
    #[error("Invalid repository at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Invalid digest format or encoding.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Invalid reference name.
    #[error("Invalid reference: {reason}")]
    InvalidRef { reason: String },

    /// Invalid path.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Invalid tree entry.
    #[error("Invalid tree entry: {reason}")]
    InvalidTreeEntry { reason: String },

    /// Invalid author/committer/tagger identity.
    #[error("Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Required argument missing or empty.
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Entry mode does not fit the object it points at.
    #[error("Mode {mode} cannot point at a {object_type}")]
    ModeMismatch { mode: String, object_type: String },

    /// Object not found in store.
    #[error("Object not found: {digest}")]
    ObjectNotFound { digest: String },

    /// Reference not found.
    #[error("Reference not found: {name}")]
    RefNotFound { name: String },

    /// No entry at the given path.
    #[error("No entry at path: {path}")]
    PathNotFound { path: String },

    /// Object has a different type than required.
    #[error("Invalid object type: expected {expected}, got {got}")]
    InvalidObjectType { expected: String, got: String },

    /// A directory segment of the path names a non-directory entry.
    #[error("Path {path} conflicts with non-directory entry {segment}")]
    PathConflict { path: String, segment: String },

    /// Reference already exists.
    #[error("Reference already exists: {name}")]
    RefExists { name: String },

    /// Reference lock file outlived its writer and must be removed by hand.
    #[error("Reference {name} is locked by {lock}; remove it if no writer is running")]
    RefLocked { name: String, lock: PathBuf },

    /// Reference no longer points where the caller saw it.
    #[error("Concurrent update of {name}: expected {expected}, found {actual}")]
    ConcurrentUpdate {
        name: String,
        expected: String,
        actual: String,
    },
}

impl Error {
    /// Classify this error into the domain taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. }
            | Error::CorruptedObject { .. }
            | Error::InvalidStore { .. }
            | Error::UnsupportedAlgorithm { .. } => ErrorKind::StorageFault,
            Error::InvalidDigest { .. }
            | Error::InvalidRef { .. }
            | Error::InvalidPath { .. }
            | Error::InvalidTreeEntry { .. }
            | Error::InvalidSignature { .. }
            | Error::MissingField { .. }
            | Error::ModeMismatch { .. } => ErrorKind::InvalidArgument,
            Error::ObjectNotFound { .. }
            | Error::RefNotFound { .. }
            | Error::PathNotFound { .. } => ErrorKind::NotFound,
            Error::InvalidObjectType { .. } | Error::PathConflict { .. } => {
                ErrorKind::TypeConflict
            }
            Error::RefExists { .. } | Error::RefLocked { .. } => ErrorKind::Conflict,
            Error::ConcurrentUpdate { .. } => ErrorKind::ConcurrentUpdate,
        }
    }

    /// Whether redoing the whole operation from a fresh branch head may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrentUpdate
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }

    /// Create an InvalidRef error.
    pub fn invalid_ref(reason: impl Into<String>) -> Self {
        Error::InvalidRef {
            reason: reason.into(),
        }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidTreeEntry error.
    pub fn invalid_tree_entry(reason: impl Into<String>) -> Self {
        Error::InvalidTreeEntry {
            reason: reason.into(),
        }
    }

    /// Create an InvalidSignature error.
    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Error::InvalidSignature {
            reason: reason.into(),
        }
    }

    /// Create a MissingField error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }

    /// Create a ModeMismatch error.
    pub fn mode_mismatch(mode: impl Into<String>, object_type: impl Into<String>) -> Self {
        Error::ModeMismatch {
            mode: mode.into(),
            object_type: object_type.into(),
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(digest: impl Into<String>) -> Self {
        Error::ObjectNotFound {
            digest: digest.into(),
        }
    }

    /// Create a RefNotFound error.
    pub fn ref_not_found(name: impl Into<String>) -> Self {
        Error::RefNotFound { name: name.into() }
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Error::PathNotFound { path: path.into() }
    }

    /// Create an InvalidObjectType error.
    pub fn invalid_object_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::InvalidObjectType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a PathConflict error.
    pub fn path_conflict(path: impl Into<String>, segment: impl Into<String>) -> Self {
        Error::PathConflict {
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Create a RefExists error.
    pub fn ref_exists(name: impl Into<String>) -> Self {
        Error::RefExists { name: name.into() }
    }

    /// Create a RefLocked error.
    pub fn ref_locked(name: impl Into<String>, lock: impl Into<PathBuf>) -> Self {
        Error::RefLocked {
            name: name.into(),
            lock: lock.into(),
        }
    }

    /// Create a ConcurrentUpdate error. `actual` is `None` when the ref vanished.
    pub fn concurrent_update(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: Option<String>,
    ) -> Self {
        Error::ConcurrentUpdate {
            name: name.into(),
            expected: expected.into(),
            actual: actual.unwrap_or_else(|| "<deleted>".to_string()),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::invalid_digest("x").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(Error::path_not_found("/a").kind(), ErrorKind::NotFound);
        assert_eq!(Error::ref_not_found("master").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::path_conflict("/a/b", "a").kind(),
            ErrorKind::TypeConflict
        );
        assert_eq!(Error::ref_exists("master").kind(), ErrorKind::Conflict);
        assert_eq!(
            Error::corrupted_object("abc", "bad").kind(),
            ErrorKind::StorageFault
        );
        let io = Error::from(std::io::Error::other("disk gone"));
        assert_eq!(io.kind(), ErrorKind::StorageFault);
    }

    #[test]
    fn test_only_concurrent_update_is_retryable() {
        let err = Error::concurrent_update("refs/heads/master", "aa", Some("bb".to_string()));
        assert!(err.is_retryable());
        assert!(!Error::path_not_found("/x").is_retryable());
        assert!(!Error::ref_exists("x").is_retryable());
        let locked = Error::ref_locked("refs/heads/master", "/repo/refs/heads/master.lock");
        assert_eq!(locked.kind(), ErrorKind::Conflict);
        assert!(!locked.is_retryable());
    }

    #[test]
    fn test_concurrent_update_deleted_ref_message() {
        let err = Error::concurrent_update("refs/heads/topic", "aa", None);
        assert!(err.to_string().contains("<deleted>"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ConcurrentUpdate).unwrap();
        assert_eq!(json, "\"concurrent_update\"");
        assert_eq!(ErrorKind::TypeConflict.as_str(), "type_conflict");
    }
}
