//! Content digests using BLAKE3.

use crate::error::{Error, Result};
use crate::object::ObjectType;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Digest size in bytes (BLAKE3 produces 256-bit hashes).
pub const DIGEST_SIZE: usize = 32;

/// Length of a digest rendered as hex.
pub const DIGEST_HEX_LEN: usize = DIGEST_SIZE * 2;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Returns the algorithm ID byte (for object headers).
    pub fn id(&self) -> u8 {
        match self {
            Algorithm::Blake3 => 1,
        }
    }

    /// Parse algorithm from ID byte.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(format!("ID {}", id))),
        }
    }
}

/// A 32-byte BLAKE3 digest identifying an object by its canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Create a Digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }

    /// Parse a digest from exactly 64 lowercase hex characters.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != DIGEST_HEX_LEN {
            return Err(Error::invalid_digest(format!(
                "Expected {} hex characters, got {}",
                DIGEST_HEX_LEN,
                hex_str.len()
            )));
        }

        if !hex_str
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(Error::invalid_digest(format!(
                "Not lowercase hex: {}",
                hex_str
            )));
        }

        let bytes =
            hex::decode(hex_str).map_err(|e| Error::invalid_digest(format!("Invalid hex: {}", e)))?;

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&bytes);
        Ok(Digest(digest))
    }

    /// Convert to hex string (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 7 hex characters, for human-facing output.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(7);
        hex
    }

    /// Get the first 2 hex characters (for directory sharding).
    pub fn prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Get the remaining 62 hex characters (for filename).
    pub fn suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Hash raw bytes using BLAKE3. This is a blob's identity.
    pub fn hash_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Digest(*hash.as_bytes())
    }

    /// Digest of an object's canonical payload.
    ///
    /// Blobs hash their raw bytes. Structured objects hash in BLAKE3's
    /// key-derivation mode with a per-type context, which keeps them disjoint
    /// from blob digests.
    pub fn of_object(object_type: ObjectType, payload: &[u8]) -> Self {
        match object_type.hash_context() {
            None => Self::hash_bytes(payload),
            Some(context) => {
                let mut hasher = blake3::Hasher::new_derive_key(context);
                hasher.update(payload);
                Digest(*hasher.finalize().as_bytes())
            }
        }
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Digest::from_hex(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_empty() {
        let digest = Digest::hash_bytes(b"");
        assert_eq!(digest.to_hex().len(), 64);
    }

    #[test]
    fn test_hash_hello_world() {
        let digest = Digest::hash_bytes(b"hello world");

        // BLAKE3 of "hello world"
        assert_eq!(
            digest.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_blob_digest_is_raw_hash() {
        let data = b"file content";
        assert_eq!(
            Digest::of_object(ObjectType::Blob, data),
            Digest::hash_bytes(data)
        );
    }

    #[test]
    fn test_structured_objects_are_domain_separated() {
        let payload = b"same bytes";
        let blob = Digest::of_object(ObjectType::Blob, payload);
        let tree = Digest::of_object(ObjectType::Tree, payload);
        let commit = Digest::of_object(ObjectType::Commit, payload);
        let tag = Digest::of_object(ObjectType::Tag, payload);

        assert_ne!(blob, tree);
        assert_ne!(tree, commit);
        assert_ne!(commit, tag);
        assert_ne!(blob, tag);
    }

    #[test]
    fn test_from_hex_invalid_length() {
        assert!(Digest::from_hex("abcd").is_err());
        assert!(Digest::from_hex("").is_err());
    }

    #[test]
    fn test_from_hex_invalid_chars() {
        let invalid = "z".repeat(64);
        assert!(Digest::from_hex(&invalid).is_err());
    }

    #[test]
    fn test_from_hex_rejects_uppercase() {
        let upper = Digest::hash_bytes(b"x").to_hex().to_uppercase();
        let err = Digest::from_hex(&upper).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_short_and_prefix_suffix() {
        let digest = Digest::hash_bytes(b"test");
        assert_eq!(digest.short().len(), 7);
        assert!(digest.to_hex().starts_with(&digest.short()));

        let full = format!("{}{}", digest.prefix(), digest.suffix());
        assert_eq!(full, digest.to_hex());
    }

    #[test]
    fn test_serialize_as_hex() {
        let digest = Digest::hash_bytes(b"json");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
    }

    #[test]
    fn test_algorithm_conversions() {
        let algo = Algorithm::Blake3;
        assert_eq!(algo.as_str(), "blake3-256");
        assert_eq!(algo.id(), 1);

        assert_eq!(Algorithm::parse("blake3-256").unwrap(), Algorithm::Blake3);
        assert_eq!(Algorithm::from_id(1).unwrap(), Algorithm::Blake3);

        assert!(Algorithm::parse("sha1").is_err());
        assert!(Algorithm::from_id(99).is_err());
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Hashing the same data always produces the same digest
        #[test]
        fn prop_hash_deterministic(data: Vec<u8>) {
            prop_assert_eq!(Digest::hash_bytes(&data), Digest::hash_bytes(&data));
        }

        /// Hex parsing accepts exactly what to_hex produces
        #[test]
        fn prop_hex_parse(bytes in prop::array::uniform32(any::<u8>())) {
            let digest = Digest::from_bytes(bytes);
            let parsed: Digest = digest.to_hex().parse()?;
            prop_assert_eq!(digest, parsed);
        }

        /// Invalid hex length always fails
        #[test]
        fn prop_invalid_hex_length_fails(
            s in "[0-9a-f]{0,63}|[0-9a-f]{65,128}"
        ) {
            prop_assert!(Digest::from_hex(&s).is_err());
        }
    }
}
