//! Argument checks applied before any storage access.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::object::ObjectType;
use crate::tree::EntryMode;

/// Longest allowed entry name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Require a non-empty string argument.
pub fn required(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::missing_field(field));
    }
    Ok(())
}

/// Parse a required digest argument.
pub fn digest(field: &str, value: &str) -> Result<Digest> {
    required(field, value)?;
    Digest::from_hex(value)
}

/// Check a tree entry name.
pub fn entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_tree_entry("Name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_tree_entry(format!(
            "Name too long: {} bytes (max {})",
            name.len(),
            MAX_NAME_LEN
        )));
    }

    if name.contains('\0') {
        return Err(Error::invalid_tree_entry("Name cannot contain null bytes"));
    }

    if name.contains('/') {
        return Err(Error::invalid_tree_entry(format!(
            "Name cannot contain '/': {}",
            name
        )));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_tree_entry(format!("Reserved name: {}", name)));
    }

    Ok(())
}

/// Check a branch or tag name.
pub fn ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref("Ref name cannot be empty"));
    }

    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_ref(format!(
            "Invalid ref name: {} (must not contain .. or path separators)",
            name
        )));
    }

    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::invalid_ref(format!(
            "Invalid ref name: {:?} (whitespace or control characters)",
            name
        )));
    }

    if name.starts_with('.') || name.starts_with('-') || name.ends_with(".lock") {
        return Err(Error::invalid_ref(format!(
            "Invalid ref name: {} (leading '.'/'-' or trailing .lock)",
            name
        )));
    }

    Ok(())
}

/// Check one half of a signature. `<`, `>` and newlines would break the
/// commit encoding.
pub fn signature_part(field: &str, value: &str) -> Result<()> {
    if value.contains(['<', '>', '\n', '\r']) {
        return Err(Error::invalid_signature(format!(
            "{} must not contain '<', '>' or newlines: {:?}",
            field, value
        )));
    }
    Ok(())
}

/// Choose the entry mode for a target of `object_type`.
///
/// With no explicit mode, blobs become regular files and trees become
/// subtrees. An explicit mode must agree with the target's type.
pub fn mode_for(mode: Option<EntryMode>, object_type: ObjectType) -> Result<EntryMode> {
    let mode = match (mode, object_type) {
        (Some(mode), _) => mode,
        (None, ObjectType::Blob) => EntryMode::Regular,
        (None, ObjectType::Tree) => EntryMode::Subtree,
        (None, other) => return Err(Error::mode_mismatch("any", other.as_str())),
    };

    if mode.object_type() != object_type {
        return Err(Error::mode_mismatch(mode.to_string(), object_type.as_str()));
    }
    Ok(mode)
}
