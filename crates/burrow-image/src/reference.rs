//! Image references of the form `repository[:tag]`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use burrow_common::constants::DEFAULT_IMAGE_TAG;
use burrow_common::error::{BurrowError, Result};

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Repository name, possibly with `/`-separated components.
    pub repository: String,
    /// Tag, `latest` when omitted.
    pub tag: String,
}

impl ImageReference {
    /// Storage path of the image relative to the images directory.
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.repository).join(&self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = BurrowError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| BurrowError::Config {
            message: format!("invalid image reference {s:?}: {why}"),
        };
        let s = s.trim();
        // A colon before the last slash belongs to a registry host, not a tag.
        let (repository, tag) = match s.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => (s, DEFAULT_IMAGE_TAG),
        };
        if repository.is_empty() {
            return Err(invalid("empty repository"));
        }
        if tag.is_empty() {
            return Err(invalid("empty tag"));
        }
        let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        for part in repository.split('/') {
            if part.is_empty() || part == "." || part == ".." || !part.chars().all(valid) {
                return Err(invalid("bad repository component"));
            }
        }
        if tag.starts_with('.') || !tag.chars().all(valid) {
            return Err(invalid("bad tag"));
        }
        Ok(Self {
            repository: repository.to_ascii_lowercase(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_defaults_to_latest() {
        let r: ImageReference = "alpine".parse().unwrap();
        assert_eq!(r.repository, "alpine");
        assert_eq!(r.tag, "latest");
        assert_eq!(r.to_string(), "alpine:latest");
    }

    #[test]
    fn explicit_tag_and_nested_repository() {
        let r: ImageReference = "library/busybox:1.36".parse().unwrap();
        assert_eq!(r.repository, "library/busybox");
        assert_eq!(r.tag, "1.36");
        assert_eq!(r.relative_dir(), PathBuf::from("library/busybox/1.36"));
    }

    #[test]
    fn path_traversal_is_rejected() {
        assert!("../etc".parse::<ImageReference>().is_err());
        assert!("a//b".parse::<ImageReference>().is_err());
        assert!("alpine:..".parse::<ImageReference>().is_err());
        assert!("".parse::<ImageReference>().is_err());
        assert!("alpine:".parse::<ImageReference>().is_err());
    }
}
