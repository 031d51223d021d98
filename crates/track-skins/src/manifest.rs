//! Active skin manifest stored in the output directory

use crate::error::{CompositionError, FileOperation, OperationKind};
use crate::record::SkinId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// On-disk shapes; the writer always emits [`ManifestFile::Nested`]
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Nested(Vec<Vec<SkinId>>),
    Flat(Vec<SkinId>),
}

/// Ordered set of skin ids that produced the output directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSkinManifest {
    ids: Vec<SkinId>,
}

impl ActiveSkinManifest {
    /// Manifest for `ids`; duplicates after the first occurrence are dropped
    pub fn new(ids: impl IntoIterator<Item = SkinId>) -> Self {
        let mut unique: Vec<SkinId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Self { ids: unique }
    }

    /// Ids in order
    pub fn ids(&self) -> &[SkinId] {
        &self.ids
    }

    /// Whether no skin is recorded
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is recorded, ignoring case
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known.matches(id))
    }

    /// Parse manifest JSON, accepting both the nested and the flat array form
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the text is neither form.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let file: ManifestFile = serde_json::from_str(text)?;
        Ok(match file {
            ManifestFile::Nested(groups) => Self::new(groups.into_iter().flatten()),
            ManifestFile::Flat(ids) => Self::new(ids),
        })
    }

    /// Indented JSON: an array holding the id array
    ///
    /// # Errors
    ///
    /// Returns the JSON error from serialization.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&ManifestFile::Nested(vec![self.ids.clone()]))
    }

    /// Read the manifest at `path`; a missing file yields `None`
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Manifest`] for malformed content and
    /// [`CompositionError::Io`] when the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Option<Self>, CompositionError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "No active skin manifest");
                return Ok(None);
            }
            Err(e) => {
                return Err(CompositionError::io(
                    FileOperation::new(OperationKind::ReadManifest, path),
                    e,
                ));
            }
        };
        let manifest = Self::parse(&text).map_err(|e| CompositionError::manifest(path, e))?;
        Ok(Some(manifest))
    }

    /// Like [`ActiveSkinManifest::load`], but logs and ignores failures
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(manifest) => manifest.unwrap_or_default(),
            Err(e) => {
                warn!(path = ?path, error = %e, "Ignoring unreadable active skin manifest");
                Self::default()
            }
        }
    }
}
