//! Folder listing cache keyed by folder path

use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// A file found directly inside a scanned folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    /// File name as found on disk
    pub name: String,
    /// Full path
    pub path: PathBuf,
}

/// Immediate contents of one folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    /// Regular files, sorted by name
    pub files: Vec<ListedFile>,
    /// Sub-folders, sorted by name
    pub folders: Vec<ListedFile>,
}

impl FolderListing {
    /// Read the immediate contents of `dir`
    ///
    /// Entries whose names are not valid UTF-8 are skipped.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the folder cannot be listed.
    pub fn read(dir: &Path) -> io::Result<Self> {
        let mut listing = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                trace!(path = ?entry.path(), "Skipping non UTF-8 entry");
                continue;
            };
            let file_type = entry.file_type()?;
            let item = ListedFile {
                name,
                path: entry.path(),
            };
            if file_type.is_dir() {
                listing.folders.push(item);
            } else if file_type.is_file() {
                listing.files.push(item);
            }
        }
        listing.files.sort_by(|a, b| a.name.cmp(&b.name));
        listing.folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }
}

/// Cache of folder listings, owned by the skin set provider
///
/// Entries stay valid until [`LayoutCache::invalidate`] or
/// [`LayoutCache::clear`] is called, typically on rescan.
#[derive(Debug, Default)]
pub struct LayoutCache {
    entries: RwLock<HashMap<PathBuf, Arc<FolderListing>>>,
}

impl LayoutCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached listing for `dir`, reading it on a miss
    ///
    /// # Errors
    ///
    /// Returns the I/O error from [`FolderListing::read`]; failures are not cached.
    pub fn listing(&self, dir: &Path) -> io::Result<Arc<FolderListing>> {
        if let Some(listing) = self.entries.read().get(dir) {
            return Ok(Arc::clone(listing));
        }
        let listing = Arc::new(FolderListing::read(dir)?);
        self.entries
            .write()
            .insert(dir.to_path_buf(), Arc::clone(&listing));
        Ok(listing)
    }

    /// Drop the entry for `dir` and everything below it
    pub fn invalidate(&self, dir: &Path) {
        self.entries.write().retain(|path, _| !path.starts_with(dir));
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached folders
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
