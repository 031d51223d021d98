//! One composition pass: select, reconcile, apply

use crate::cache::LayoutCache;
use crate::composer::{Composer, CompositionReport, HardLinker};
use crate::config::CompositorConfig;
use crate::error::CompositionError;
use crate::layout::TrackLayout;
use crate::reconciler::{CompositionPlan, Reconciler, scan_output};
use crate::record::SkinRecord;
use crate::recycle::{FolderRecycler, Recycler};
use crate::selector::FileSelector;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Runs a full pass for a snapshot of active skins
///
/// The scheduler drives passes through this trait; tests supply runners
/// that record or stall passes.
#[async_trait]
pub trait CompositionRunner: Send + Sync {
    /// Compose the output directory from `active`, given in provider order
    async fn compose(&self, active: Vec<SkinRecord>) -> Result<CompositionReport, CompositionError>;
}

/// Production pass pipeline for one track
pub struct Compositor {
    layout: TrackLayout,
    cache: Option<Arc<LayoutCache>>,
    composer: Composer,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("layout", &self.layout)
            .field("composer", &self.composer)
            .finish_non_exhaustive()
    }
}

impl Compositor {
    /// Compositor recycling into the layout's recycle folder
    pub fn new(layout: TrackLayout, config: CompositorConfig) -> Self {
        let recycler = Arc::new(FolderRecycler::new(layout.recycle_dir()));
        Self::with_recycler(layout, config, recycler)
    }

    /// Compositor with a custom recycler
    pub fn with_recycler(
        layout: TrackLayout,
        config: CompositorConfig,
        recycler: Arc<dyn Recycler>,
    ) -> Self {
        Self {
            composer: Composer::new(layout.clone(), config, recycler),
            layout,
            cache: None,
        }
    }

    /// Read skin folders through a shared cache instead of rescanning every pass
    pub fn with_layout_cache(mut self, cache: Arc<LayoutCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Create output links through `linker`
    pub fn with_linker(mut self, linker: Arc<dyn HardLinker>) -> Self {
        self.composer = self.composer.with_linker(linker);
        self
    }

    /// Track layout
    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    /// Plan a pass without touching the output directory
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Io`] if the output directory or a source
    /// cannot be inspected.
    pub async fn plan(&self, active: Vec<SkinRecord>) -> Result<CompositionPlan, CompositionError> {
        let cache = self
            .cache
            .clone()
            .unwrap_or_else(|| Arc::new(LayoutCache::new()));
        let output_dir = self.layout.output_dir();
        let manifest_file = self.layout.manifest_file_name().to_string();

        tokio::task::spawn_blocking(move || {
            let candidates = FileSelector::new(&cache).select(&active);
            let existing = scan_output(&output_dir, &manifest_file)?;
            debug!(
                candidates = candidates.len(),
                existing = existing.len(),
                "Reconciling output directory"
            );
            Reconciler::new(output_dir).plan(&candidates, &active, &existing)
        })
        .await
        .map_err(|e| CompositionError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CompositionRunner for Compositor {
    #[instrument(skip_all, fields(track_id = %self.layout.track_id(), skins = active.len()))]
    async fn compose(&self, active: Vec<SkinRecord>) -> Result<CompositionReport, CompositionError> {
        let plan = self.plan(active).await?;
        self.composer.apply(&plan).await
    }
}
