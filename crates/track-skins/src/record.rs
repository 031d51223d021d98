//! Skin records as seen by the compositor

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Skin identifier: the name of the skin's folder
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkinId(String);

impl SkinId {
    /// Wrap a folder name
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison, matching how the game treats folder names
    pub fn matches(&self, other: &str) -> bool {
        self.0.to_lowercase() == other.to_lowercase()
    }
}

impl fmt::Display for SkinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SkinId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SkinId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One skin folder under a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinRecord {
    /// Folder name
    pub id: SkinId,
    /// Folder path
    pub location: PathBuf,
    /// Author-assigned priority; higher wins conflicts
    pub priority: f64,
    /// Lowercased category tags
    pub categories: BTreeSet<String>,
    /// Selected to contribute to the merged output
    pub is_active: bool,
    /// Not disabled at a higher level; disabled skins are never composed
    pub is_enabled: bool,
}

impl SkinRecord {
    /// Enabled, inactive skin with priority 0 and no categories
    pub fn new(id: impl Into<SkinId>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            priority: 0.0,
            categories: BTreeSet::new(),
            is_active: false,
            is_enabled: true,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Set categories; tags are normalized to lowercase
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categories = normalize_categories(categories);
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    /// Whether this skin contributes to the next pass
    pub fn contributes(&self) -> bool {
        self.is_enabled && self.is_active
    }

    /// Whether the two skins share at least one category
    pub fn shares_category_with(&self, other: &SkinRecord) -> bool {
        self.categories
            .iter()
            .any(|category| other.categories.contains(category))
    }
}

/// Trim, lowercase and deduplicate category tags
pub fn normalize_categories<I, S>(categories: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    categories
        .into_iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}
