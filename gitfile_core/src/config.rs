//! Repository configuration file.
//!
//! A plain `key=value` file at `<root>/config`; blank lines and lines
//! starting with `#` are ignored:
//!
//! ```text
//! version=1
//! algo=blake3-256
//! default_branch=master
//! ```

use crate::error::{Error, Result};
use crate::hash::Algorithm;
use crate::validate;
use std::path::Path;

/// Config format version written by this crate.
pub const CONFIG_VERSION: &str = "1";

/// Branch used when none is configured.
pub const DEFAULT_BRANCH: &str = "master";

/// Settings stored with a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    /// Digest algorithm for all objects.
    pub algorithm: Algorithm,
    /// Branch created by `init` and used when a caller names none.
    pub default_branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Blake3,
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

impl RepoConfig {
    /// Config with a different default branch.
    pub fn with_default_branch(mut self, branch: &str) -> Result<Self> {
        validate::ref_name(branch)?;
        self.default_branch = branch.to_string();
        Ok(self)
    }

    /// Render the config file.
    pub fn render(&self) -> String {
        format!(
            "version={}\nalgo={}\ndefault_branch={}\n",
            CONFIG_VERSION,
            self.algorithm.as_str(),
            self.default_branch
        )
    }

    /// Parse the config file read from `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut version = None;
        let mut algo = None;
        let mut default_branch = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    "default_branch" => default_branch = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some(CONFIG_VERSION) {
            return Err(Error::invalid_store(
                path,
                format!(
                    "unsupported config version {} (expected {})",
                    version.unwrap_or("<missing>"),
                    CONFIG_VERSION
                ),
            ));
        }

        let algo_str = algo.ok_or_else(|| Error::invalid_store(path, "config has no algo"))?;
        let algorithm = Algorithm::parse(algo_str)?;

        let default_branch = default_branch.unwrap_or(DEFAULT_BRANCH);
        validate::ref_name(default_branch).map_err(|e| {
            Error::invalid_store(path, format!("invalid default_branch: {}", e))
        })?;

        Ok(Self {
            algorithm,
            default_branch: default_branch.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn parse(content: &str) -> Result<RepoConfig> {
        RepoConfig::parse(content, Path::new("/repo/config"))
    }

    #[test]
    fn test_parse_rendered() {
        let config = RepoConfig::default().with_default_branch("main").unwrap();
        assert_eq!(parse(&config.render()).unwrap(), config);
    }

    #[test]
    fn test_parse_with_comments_and_default_branch_fallback() {
        let content = "# Comment\nversion=1\nalgo=blake3-256\n# Another comment\n";
        let config = parse(content).unwrap();
        assert_eq!(config.algorithm, Algorithm::Blake3);
        assert_eq!(config.default_branch, "master");
    }

    #[test]
    fn test_parse_invalid_version() {
        let err = parse("version=99\nalgo=blake3-256\n").unwrap_err();
        assert!(matches!(err, Error::InvalidStore { .. }));
        assert_eq!(err.kind(), ErrorKind::StorageFault);
        assert!(err.to_string().contains("config version 99"));
        assert!(!err.to_string().contains("algorithm"));
    }

    #[test]
    fn test_parse_missing_algo() {
        let err = parse("version=1\n").unwrap_err();
        assert!(matches!(err, Error::InvalidStore { .. }));
    }

    #[test]
    fn test_parse_bad_default_branch() {
        let content = "version=1\nalgo=blake3-256\ndefault_branch=../x\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, Error::InvalidStore { .. }));
        assert_eq!(err.kind(), ErrorKind::StorageFault);

        let err = RepoConfig::default().with_default_branch("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
