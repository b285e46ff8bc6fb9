// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Image references (`namespace/name[:tag]`).

use std::fmt;

use super::ApiError;

/// A repository plus tag, as sent to the pull endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repo: String,
    tag: String,
}

impl ImageRef {
    /// Tag used when none is given.
    pub const DEFAULT_TAG: &'static str = "latest";

    /// Build a reference from its parts.
    pub fn new(repo: impl Into<String>, tag: impl Into<String>) -> Result<Self, ApiError> {
        let repo = repo.into().trim().to_string();
        let tag = tag.into().trim().to_string();
        if repo.is_empty() {
            return Err(ApiError::InvalidRequest("image name is empty".to_string()));
        }
        if tag.is_empty() || tag.contains(['/', ':']) {
            return Err(ApiError::InvalidRequest(format!("invalid tag '{}'", tag)));
        }
        Ok(Self { repo, tag })
    }

    /// Parse `repo[:tag]`.
    ///
    /// A colon before the last `/` belongs to a registry host
    /// (`registry:5000/team/app`) and is not treated as a tag separator.
    pub fn parse(reference: &str) -> Result<Self, ApiError> {
        let reference = reference.trim();
        let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);

        match reference[name_start..].rfind(':') {
            Some(i) => {
                let split = name_start + i;
                Self::new(&reference[..split], &reference[split + 1..])
            }
            None => Self::new(reference, Self::DEFAULT_TAG),
        }
    }

    /// Same repository with another tag.
    pub fn with_tag(&self, tag: impl Into<String>) -> Result<Self, ApiError> {
        Self::new(self.repo.clone(), tag)
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_latest() {
        let image = ImageRef::parse("library/nginx").unwrap();
        assert_eq!(image.repo(), "library/nginx");
        assert_eq!(image.tag(), "latest");
        assert_eq!(image.to_string(), "library/nginx:latest");
    }

    #[test]
    fn test_parse_with_tag() {
        let image: ImageRef = "bitnami/redis:7.4-debian".parse().unwrap();
        assert_eq!(image.repo(), "bitnami/redis");
        assert_eq!(image.tag(), "7.4-debian");
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        let image = ImageRef::parse("registry.local:5000/team/app").unwrap();
        assert_eq!(image.repo(), "registry.local:5000/team/app");
        assert_eq!(image.tag(), "latest");

        let image = ImageRef::parse("registry.local:5000/team/app:v2").unwrap();
        assert_eq!(image.repo(), "registry.local:5000/team/app");
        assert_eq!(image.tag(), "v2");
    }

    #[test]
    fn test_rejects_empty_parts() {
        assert!(ImageRef::parse("").is_err());
        assert!(ImageRef::parse("   ").is_err());
        assert!(ImageRef::parse(":latest").is_err());
        assert!(ImageRef::parse("nginx:").is_err());
    }

    #[test]
    fn test_with_tag() {
        let image = ImageRef::parse("alpine").unwrap();
        assert_eq!(image.with_tag("3.20").unwrap().to_string(), "alpine:3.20");
        assert!(image.with_tag(" ").is_err());
        assert!(image.with_tag("a/b").is_err());
    }
}
