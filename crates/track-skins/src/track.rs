//! Per-track facade tying provider, compositor and scheduler together

use crate::composer::CompositionReport;
use crate::compositor::{CompositionRunner, Compositor};
use crate::config::CompositorConfig;
use crate::error::CompositionError;
use crate::layout::TrackLayout;
use crate::provider::{FolderSkinProvider, SkinSetProvider};
use crate::reconciler::CompositionPlan;
use crate::record::{SkinId, SkinRecord};
use crate::scheduler::{CompositionObserver, CompositionScheduler, SchedulerPhase, TracingObserver};
use std::sync::Arc;
use tracing::info;

/// Skins of one track, kept composed into its output folder
///
/// Every mutation goes through the provider and then notifies the scheduler,
/// so the output folder catches up after the debounce period.
#[derive(Debug)]
pub struct TrackSkins {
    provider: Arc<FolderSkinProvider>,
    compositor: Arc<Compositor>,
    scheduler: CompositionScheduler,
}

impl TrackSkins {
    /// Open a track, logging pass failures
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid, the skins cannot be listed or no
    /// tokio runtime is running.
    pub fn open(layout: TrackLayout, config: CompositorConfig) -> Result<Self, CompositionError> {
        Self::with_observer(layout, config, Arc::new(TracingObserver))
    }

    /// Open a track reporting to `observer`
    ///
    /// # Errors
    ///
    /// Same as [`TrackSkins::open`].
    pub fn with_observer(
        layout: TrackLayout,
        config: CompositorConfig,
        observer: Arc<dyn CompositionObserver>,
    ) -> Result<Self, CompositionError> {
        config.validate()?;
        let provider = Arc::new(FolderSkinProvider::open(layout.clone())?);
        let compositor = Arc::new(
            Compositor::new(layout, config.clone()).with_layout_cache(provider.layout_cache()),
        );
        let scheduler = CompositionScheduler::new(
            Arc::clone(&provider) as Arc<dyn SkinSetProvider>,
            Arc::clone(&compositor) as Arc<dyn CompositionRunner>,
            observer,
            &config,
        )?;
        info!(track_id = %provider.track_id(), skins = provider.skins().len(), "Track skins opened");
        Ok(Self {
            provider,
            compositor,
            scheduler,
        })
    }

    /// Track id
    pub fn track_id(&self) -> &str {
        self.provider.track_id()
    }

    /// All skins, in enumeration order
    pub fn skins(&self) -> Vec<SkinRecord> {
        self.provider.skins()
    }

    /// Skin provider
    pub fn provider(&self) -> &Arc<FolderSkinProvider> {
        &self.provider
    }

    /// Scheduler driving passes for this track
    pub fn scheduler(&self) -> &CompositionScheduler {
        &self.scheduler
    }

    /// Activate or deactivate a skin
    ///
    /// Activating deactivates other skins sharing a category; their ids are
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    pub fn set_active(&self, id: &SkinId, active: bool) -> Result<Vec<SkinId>, CompositionError> {
        self.provider.set_active(id, active)?;
        self.scheduler.skin_state_changed(&self.resolve(id)?)
    }

    /// Enable or disable a skin
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    pub fn set_enabled(&self, id: &SkinId, enabled: bool) -> Result<Vec<SkinId>, CompositionError> {
        self.provider.set_enabled(id, enabled)?;
        self.scheduler.skin_state_changed(&self.resolve(id)?)
    }

    /// Change a skin's priority
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::UnknownSkin`] if no skin has that id.
    pub fn set_priority(&self, id: &SkinId, priority: f64) -> Result<(), CompositionError> {
        self.provider.set_priority(id, priority)?;
        self.scheduler.request_refresh();
        Ok(())
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
        self.provider.set_categories(id, categories)?;
        self.scheduler.request_refresh();
        Ok(())
    }

    /// Re-enumerate skin folders after files changed on disk
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Provider`] if the skins cannot be listed.
    pub fn rescan(&self) -> Result<(), CompositionError> {
        self.provider.rescan()?;
        self.scheduler.request_refresh();
        Ok(())
    }

    /// Plan a pass for the current active skins without applying it
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Io`] if the output folder cannot be inspected.
    pub async fn plan(&self) -> Result<CompositionPlan, CompositionError> {
        self.compositor.plan(self.provider.active_skins()).await
    }

    /// Run a pass right away, bypassing the debounce
    ///
    /// The pass goes through the scheduler, so it never overlaps a
    /// scheduled one.
    ///
    /// # Errors
    ///
    /// Returns the pass error.
    pub async fn compose_now(&self) -> Result<CompositionReport, CompositionError> {
        self.scheduler.run_now().await
    }

    /// Wait until pending passes are done
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Current scheduler phase
    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    fn resolve(&self, id: &SkinId) -> Result<SkinId, CompositionError> {
        self.provider
            .get(id.as_str())
            .map(|skin| skin.id)
            .ok_or_else(|| CompositionError::UnknownSkin(id.to_string()))
    }
}
