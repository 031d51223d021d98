//! On-disk layout of a track's skins

use crate::config::CompositorConfig;
use std::path::{Path, PathBuf};

/// Resolves the folders and files composition works with for one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLayout {
    track_id: String,
    root: PathBuf,
    sources_dir: String,
    output_dir: String,
    manifest_file: String,
    recycle_dir: Option<PathBuf>,
}

impl TrackLayout {
    /// Layout for a track installed at `root`, using default folder names
    pub fn new(track_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::with_config(track_id, root, &CompositorConfig::default())
    }

    /// Layout with folder names taken from `config`
    pub fn with_config(
        track_id: impl Into<String>,
        root: impl Into<PathBuf>,
        config: &CompositorConfig,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            root: root.into(),
            sources_dir: config.sources_dir.clone(),
            output_dir: config.output_dir.clone(),
            manifest_file: config.manifest_file.clone(),
            recycle_dir: config.recycle_dir.clone(),
        }
    }

    /// Layout for a track folder, using the folder name as track id
    pub fn from_track_dir(root: impl Into<PathBuf>, config: &CompositorConfig) -> Self {
        let root = root.into();
        let track_id = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self::with_config(track_id, root, config)
    }

    /// Track identifier used in logs and error context
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Track install folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `skins/`
    pub fn skins_dir(&self) -> PathBuf {
        self.root.join("skins")
    }

    /// `skins/cm_skins/`, one folder per skin
    pub fn sources_dir(&self) -> PathBuf {
        self.skins_dir().join(&self.sources_dir)
    }

    /// `skins/default/`, the folder the game reads
    pub fn output_dir(&self) -> PathBuf {
        self.skins_dir().join(&self.output_dir)
    }

    /// Manifest file name
    pub fn manifest_file_name(&self) -> &str {
        &self.manifest_file
    }

    /// `skins/default/cm_skins_active.json`
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir().join(&self.manifest_file)
    }

    /// Where recycled output files are moved
    pub fn recycle_dir(&self) -> PathBuf {
        self.recycle_dir
            .clone()
            .unwrap_or_else(|| self.skins_dir().join(".cm_recycled"))
    }
}
