//! Commit and tag objects, and the signatures they carry.
//!
//! Both use a line-oriented text encoding: header lines of the form
//! `key value`, a blank line, then the free-form message.
//!
//! ```text
//! tree <hex>
//! parent <hex>            (zero or more)
//! author Name <email> 1700000000 +0100
//! committer Name <email> 1700000000 +0100
//!
//! message
//! ```

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::object::ObjectType;
use crate::validate;
use chrono::{DateTime, FixedOffset, SubsecRound, Utc};
use serde::Serialize;
use std::fmt;

/// Who did something, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    name: String,
    email: String,
    when: DateTime<FixedOffset>,
}

impl Signature {
    /// Create a signature. Surrounding whitespace is trimmed from name and email.
    pub fn new(name: &str, email: &str, when: DateTime<FixedOffset>) -> Result<Self> {
        validate::signature_part("name", name)?;
        validate::signature_part("email", email)?;
        Ok(Self {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            when,
        })
    }

    /// A signature stamped with the current time (UTC), in whole seconds as
    /// stored.
    pub fn now(name: &str, email: &str) -> Result<Self> {
        Self::new(name, email, Utc::now().trunc_subsecs(0).fixed_offset())
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// E-mail address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Timestamp with the signer's UTC offset.
    pub fn when(&self) -> DateTime<FixedOffset> {
        self.when
    }

    /// Parse `Name <email> <secs> <+hhmm>`.
    pub fn parse(line: &str) -> Result<Self> {
        let bad = || Error::corrupted_object("signature", format!("Malformed signature: {:?}", line));

        let open = line.find('<').ok_or_else(bad)?;
        let close = line[open..].find('>').map(|i| open + i).ok_or_else(bad)?;
        let name = line[..open].trim_end();
        let email = &line[open + 1..close];

        let mut rest = line[close + 1..].split_whitespace();
        let secs: i64 = rest.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
        let offset = rest.next().and_then(parse_offset).ok_or_else(bad)?;
        if rest.next().is_some() {
            return Err(bad());
        }

        let when = DateTime::from_timestamp(secs, 0)
            .ok_or_else(bad)?
            .with_timezone(&offset);

        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
            when,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.when.timestamp(),
            self.when.format("%z")
        )
    }
}

/// Parse `+hhmm` / `-hhmm`.
fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s.len() != 5 || !s.is_ascii() {
        return None;
    }
    let sign = match &s[..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i32 = s[1..3].parse().ok()?;
    let minutes: i32 = s[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// A snapshot of a root tree linked to its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    /// Root tree.
    pub tree: Digest,
    /// Parent commits, first parent first. Empty for a root commit.
    pub parents: Vec<Digest>,
    /// Who wrote the change.
    pub author: Signature,
    /// Who recorded it.
    pub committer: Signature,
    /// Commit message.
    pub message: String,
}

impl Commit {
    /// First parent, if any.
    pub fn parent(&self) -> Option<Digest> {
        self.parents.first().copied()
    }

    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!("author {}\n", self.author));
        out.push_str(&format!("committer {}\n", self.committer));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// Decode a commit payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (headers, message) = split_headers("commit", payload)?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for (key, value) in headers {
            match key {
                "tree" => tree = Some(header_digest("commit", value)?),
                "parent" => parents.push(header_digest("commit", value)?),
                "author" => author = Some(Signature::parse(value)?),
                "committer" => committer = Some(Signature::parse(value)?),
                other => {
                    return Err(Error::corrupted_object(
                        "commit",
                        format!("Unknown header: {}", other),
                    ));
                }
            }
        }

        Ok(Self {
            tree: tree.ok_or_else(|| missing_header("commit", "tree"))?,
            parents,
            author: author.ok_or_else(|| missing_header("commit", "author"))?,
            committer: committer.ok_or_else(|| missing_header("commit", "committer"))?,
            message,
        })
    }
}

/// An annotated tag: a named, signed pointer to any object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    /// Tagged object.
    pub object: Digest,
    /// Type of the tagged object.
    pub object_type: ObjectType,
    /// Tag name.
    pub name: String,
    /// Who created the tag.
    pub tagger: Signature,
    /// Tag message.
    pub message: String,
}

impl Tag {
    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.object, self.object_type, self.name, self.tagger, self.message
        )
        .into_bytes()
    }

    /// Decode a tag payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (headers, message) = split_headers("tag", payload)?;

        let mut object = None;
        let mut object_type = None;
        let mut name = None;
        let mut tagger = None;

        for (key, value) in headers {
            match key {
                "object" => object = Some(header_digest("tag", value)?),
                "type" => {
                    object_type = Some(ObjectType::parse(value).ok_or_else(|| {
                        Error::corrupted_object("tag", format!("Unknown type: {}", value))
                    })?)
                }
                "tag" => name = Some(value.to_string()),
                "tagger" => tagger = Some(Signature::parse(value)?),
                other => {
                    return Err(Error::corrupted_object(
                        "tag",
                        format!("Unknown header: {}", other),
                    ));
                }
            }
        }

        Ok(Self {
            object: object.ok_or_else(|| missing_header("tag", "object"))?,
            object_type: object_type.ok_or_else(|| missing_header("tag", "type"))?,
            name: name.ok_or_else(|| missing_header("tag", "tag"))?,
            tagger: tagger.ok_or_else(|| missing_header("tag", "tagger"))?,
            message,
        })
    }
}

/// Split a payload into `(key, value)` header pairs and the message.
fn split_headers<'a>(what: &str, payload: &'a [u8]) -> Result<(Vec<(&'a str, &'a str)>, String)> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::corrupted_object(what, format!("Invalid UTF-8: {}", e)))?;

    let (head, message) = text
        .split_once("\n\n")
        .ok_or_else(|| Error::corrupted_object(what, "Missing header terminator"))?;

    let headers = head
        .lines()
        .map(|line| {
            line.split_once(' ')
                .ok_or_else(|| Error::corrupted_object(what, format!("Malformed header: {}", line)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((headers, message.to_string()))
}

fn header_digest(what: &str, value: &str) -> Result<Digest> {
    Digest::from_hex(value)
        .map_err(|e| Error::corrupted_object(what, format!("Bad digest {}: {}", value, e)))
}

fn missing_header(what: &str, key: &str) -> Error {
    Error::corrupted_object(what, format!("Missing {} header", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sig(name: &str) -> Signature {
        let when = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .unwrap();
        Signature::new(name, "dev@example.com", when).unwrap()
    }

    #[test]
    fn test_signature_display_and_parse() {
        let signature = sig("Ada Lovelace");
        let rendered = signature.to_string();
        assert_eq!(rendered, "Ada Lovelace <dev@example.com> 1709287200 +0200");
        assert_eq!(Signature::parse(&rendered).unwrap(), signature);
    }

    #[test]
    fn test_signature_negative_offset_and_empty_name() {
        let when = FixedOffset::west_opt(5 * 3600 + 30 * 60)
            .unwrap()
            .with_ymd_and_hms(2023, 12, 31, 23, 59, 59)
            .unwrap();
        let signature = Signature::new("", "", when).unwrap();
        let parsed = Signature::parse(&signature.to_string()).unwrap();
        assert_eq!(parsed, signature);
        assert_eq!(parsed.when().offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[test]
    fn test_signature_rejects_markup() {
        assert!(Signature::now("Eve <evil>", "e@x").is_err());
        assert!(Signature::parse("no brackets 123 +0000").is_err());
        assert!(Signature::parse("A <a@b> notanumber +0000").is_err());
        assert!(Signature::parse("A <a@b> 1 +00").is_err());
    }

    #[test]
    fn test_signature_now_survives_encoding() {
        let now = Signature::now("Ada", "ada@example.com").unwrap();
        assert_eq!(now.when().timestamp_subsec_nanos(), 0);
        assert_eq!(Signature::parse(&now.to_string()).unwrap(), now);

        let commit = Commit {
            tree: Digest::hash_bytes(b"tree"),
            parents: Vec::new(),
            author: now.clone(),
            committer: now,
            message: "now".to_string(),
        };
        assert_eq!(Commit::decode(&commit.encode()).unwrap(), commit);
    }

    #[test]
    fn test_commit_encode_decode() {
        let commit = Commit {
            tree: Digest::hash_bytes(b"tree"),
            parents: vec![Digest::hash_bytes(b"parent")],
            author: sig("Author"),
            committer: sig("Committer"),
            message: "Add file\n\nWith a body.\n".to_string(),
        };

        let encoded = commit.encode();
        let text = String::from_utf8(encoded.clone()).unwrap();
        assert!(text.starts_with(&format!("tree {}\nparent ", commit.tree)));

        let decoded = Commit::decode(&encoded).unwrap();
        assert_eq!(decoded, commit);
        assert_eq!(decoded.parent(), Some(Digest::hash_bytes(b"parent")));
    }

    #[test]
    fn test_root_commit_has_no_parent() {
        let commit = Commit {
            tree: Digest::hash_bytes(b"tree"),
            parents: Vec::new(),
            author: sig("A"),
            committer: sig("A"),
            message: String::new(),
        };
        let decoded = Commit::decode(&commit.encode()).unwrap();
        assert_eq!(decoded.parent(), None);
        assert_eq!(decoded.message, "");
    }

    #[test]
    fn test_commit_decode_errors() {
        assert!(Commit::decode(b"tree abc\n\nmsg").is_err());
        assert!(Commit::decode(b"no terminator").is_err());
        let missing_tree = format!("author {}\ncommitter {}\n\nmsg", sig("a"), sig("a"));
        let err = Commit::decode(missing_tree.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageFault);
    }

    #[test]
    fn test_tag_encode_decode() {
        let tag = Tag {
            object: Digest::hash_bytes(b"commit"),
            object_type: ObjectType::Commit,
            name: "v1.0".to_string(),
            tagger: sig("Releaser"),
            message: "First release\n".to_string(),
        };
        assert_eq!(Tag::decode(&tag.encode()).unwrap(), tag);
        assert!(Tag::decode(b"object x\n\n").is_err());
    }
}
