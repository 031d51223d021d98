//! Skin set providers
//!
//! The compositor only reads skin records; the provider owns them. A
//! provider decides which skins exist and which are enabled, and exposes
//! `set_active` so category exclusion can flip flags through it.

use crate::cache::LayoutCache;
use crate::error::CompositionError;
use crate::layout::TrackLayout;
use crate::manifest::ActiveSkinManifest;
use crate::record::{SkinId, SkinRecord, normalize_categories};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Source of skin records for one track
pub trait SkinSetProvider: Send + Sync {
    /// Track the skins belong to
    fn track_id(&self) -> &str;

    /// Enabled skins in enumeration order
    fn enabled_skins(&self) -> Vec<SkinRecord>;

    /// Enabled skins selected to contribute, in enumeration order
    fn active_skins(&self) -> Vec<SkinRecord> {
        self.enabled_skins()
            .into_iter()
            .filter(|skin| skin.is_active)
            .collect()
    }

    /// Change a skin's active flag
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    fn set_active(&self, id: &SkinId, active: bool) -> Result<(), CompositionError>;
}

/// Provider backed by the `skins/cm_skins/<id>` folders of a track
///
/// The active flags are restored from the manifest the first time records
/// are built. Folder listings read during composition are cached in
/// [`FolderSkinProvider::layout_cache`] until the next [`FolderSkinProvider::rescan`].
#[derive(Debug)]
pub struct FolderSkinProvider {
    layout: TrackLayout,
    skins: RwLock<Vec<SkinRecord>>,
    cache: Arc<LayoutCache>,
    restored: OnceLock<ActiveSkinManifest>,
}

impl FolderSkinProvider {
    /// Scan the track's skin folders
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Provider`] if the sources folder exists but
    /// cannot be listed.
    pub fn open(layout: TrackLayout) -> Result<Self, CompositionError> {
        let provider = Self {
            layout,
            skins: RwLock::new(Vec::new()),
            cache: Arc::new(LayoutCache::new()),
            restored: OnceLock::new(),
        };
        provider.rescan()?;
        Ok(provider)
    }

    /// Track layout
    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    /// Folder listing cache shared with the compositor
    pub fn layout_cache(&self) -> Arc<LayoutCache> {
        Arc::clone(&self.cache)
    }

    /// All skins, enabled or not, in enumeration order
    pub fn skins(&self) -> Vec<SkinRecord> {
        self.skins.read().clone()
    }

    /// Look a skin up by id, ignoring case
    pub fn get(&self, id: &str) -> Option<SkinRecord> {
        self.skins.read().iter().find(|s| s.id.matches(id)).cloned()
    }

    /// Re-enumerate skin folders and drop cached listings
    ///
    /// Skins that still exist keep their flags, priority and categories.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Provider`] if the sources folder exists but
    /// cannot be listed.
    pub fn rescan(&self) -> Result<(), CompositionError> {
        let sources = self.layout.sources_dir();
        self.cache.clear();

        let mut found: Vec<(String, std::path::PathBuf)> = match std::fs::read_dir(&sources) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    (!name.starts_with('.')).then(|| (name, entry.path()))
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(CompositionError::Provider(format!(
                    "cannot list {}: {}",
                    sources.display(),
                    e
                )));
            }
        };
        found.sort_by(|(a, _), (b, _)| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));

        let mut skins = self.skins.write();
        let previous = std::mem::take(&mut *skins);
        for (name, location) in found {
            let record = match previous.iter().find(|s| s.id.as_str() == name) {
                Some(existing) => SkinRecord {
                    location,
                    ..existing.clone()
                },
                None => {
                    let restored = self.restored_manifest().contains(&name);
                    SkinRecord::new(name.as_str(), location).with_active(restored)
                }
            };
            skins.push(record);
        }

        info!(
            track_id = %self.layout.track_id(),
            skins = skins.len(),
            active = skins.iter().filter(|s| s.is_active).count(),
            "Track skins scanned"
        );
        Ok(())
    }

    /// Enable or disable a skin
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    pub fn set_enabled(&self, id: &SkinId, enabled: bool) -> Result<(), CompositionError> {
        self.update(id, |skin| skin.is_enabled = enabled)
    }

    /// Change a skin's priority
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    pub fn set_priority(&self, id: &SkinId, priority: f64) -> Result<(), CompositionError> {
        self.update(id, |skin| skin.priority = priority)
    }

    /// Replace a skin's categories
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    pub fn set_categories<I, S>(&self, id: &SkinId, categories: I) -> Result<(), CompositionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let categories = normalize_categories(categories);
        self.update(id, move |skin| skin.categories = categories)
    }

    fn update(
        &self,
        id: &SkinId,
        change: impl FnOnce(&mut SkinRecord),
    ) -> Result<(), CompositionError> {
        let mut skins = self.skins.write();
        let skin = skins
            .iter_mut()
            .find(|s| s.id.matches(id.as_str()))
            .ok_or_else(|| CompositionError::UnknownSkin(id.to_string()))?;
        change(skin);
        debug!(skin_id = %skin.id, active = skin.is_active, enabled = skin.is_enabled, "Skin updated");
        Ok(())
    }

    fn restored_manifest(&self) -> &ActiveSkinManifest {
        self.restored
            .get_or_init(|| ActiveSkinManifest::load_or_default(&self.layout.manifest_path()))
    }
}

impl SkinSetProvider for FolderSkinProvider {
    fn track_id(&self) -> &str {
        self.layout.track_id()
    }

    fn enabled_skins(&self) -> Vec<SkinRecord> {
        self.skins
            .read()
            .iter()
            .filter(|s| s.is_enabled)
            .cloned()
            .collect()
    }

    fn set_active(&self, id: &SkinId, active: bool) -> Result<(), CompositionError> {
        self.update(id, |skin| skin.is_active = active)
    }
}
