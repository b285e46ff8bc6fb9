// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Repository details shown by `dockpull info`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lines shown per description section before it is cut short.
pub const SECTION_PREVIEW_LINES: usize = 8;

/// A Docker Hub category label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub name: String,
    pub slug: Option<String>,
}

/// Repository metadata from the dashboard's repo endpoint.
///
/// The dashboard answers `{"found": false}` when Docker Hub does not know
/// the image; every other field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoInfo {
    pub found: bool,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Long description, split into `# Heading` sections in document order.
    pub full_description: IndexMap<String, Vec<String>>,
    pub pull_count: u64,
    pub star_count: u64,
    pub is_official: bool,
    pub last_updated: Option<String>,
    pub categories: Vec<Category>,
    pub storage_size: u64,
    /// Set when the dashboard failed to reach Docker Hub.
    pub error: Option<String>,
}

/// The first lines of one description section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPreview<'a> {
    pub title: &'a str,
    pub lines: Vec<&'a str>,
    /// True when the section has more lines than were kept.
    pub truncated: bool,
}

impl RepoInfo {
    /// `namespace/name`, falling back to whichever part is known.
    pub fn full_name(&self) -> String {
        match (&self.namespace, &self.name) {
            (Some(ns), Some(name)) => format!("{}/{}", ns, name),
            (None, Some(name)) => name.clone(),
            (Some(ns), None) => ns.clone(),
            (None, None) => String::new(),
        }
    }

    /// Docker Hub page for this repository.
    pub fn hub_url(&self) -> String {
        format!("https://hub.docker.com/r/{}", self.full_name())
    }

    /// Non-empty description sections, each cut to `max_lines`.
    ///
    /// Code fence markers are dropped from the kept lines.
    pub fn sections(&self, max_lines: usize) -> Vec<SectionPreview<'_>> {
        self.full_description
            .iter()
            .filter(|(_, lines)| !lines.is_empty())
            .map(|(title, lines)| SectionPreview {
                title: title.as_str(),
                lines: lines
                    .iter()
                    .take(max_lines)
                    .map(String::as_str)
                    .filter(|line| !line.starts_with("```"))
                    .collect(),
                truncated: lines.len() > max_lines,
            })
            .collect()
    }
}
