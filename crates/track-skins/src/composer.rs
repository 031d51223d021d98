//! Applies a composition plan to the output directory
//!
//! # Error Recovery
//!
//! Every filesystem operation is attempted up to `retry_attempts` times with
//! `retry_delay` between attempts. Failed attempts also count against a
//! per-pass budget; once the count exceeds `failure_budget` the pass aborts
//! with [`CompositionError::RetryBudgetExceeded`]. An operation that fails on
//! every attempt aborts the pass with [`CompositionError::Io`]. Operations
//! already applied stay applied; the next pass reconciles from there.

use crate::config::CompositorConfig;
use crate::error::{CompositionError, FileOperation, OperationKind};
use crate::layout::TrackLayout;
use crate::manifest::ActiveSkinManifest;
use crate::reconciler::{CompositionPlan, Disposal, PlanOperation};
use crate::record::SkinId;
use crate::recycle::Recycler;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs as async_fs;
use tracing::{debug, info, warn};

/// Outcome of one successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompositionReport {
    /// Track the pass ran for
    pub track_id: String,
    /// Files newly linked or copied into the output
    pub created: usize,
    /// Files whose content was swapped for another source
    pub replaced: usize,
    /// Files permanently removed
    pub deleted: usize,
    /// Files moved to the recycle destination
    pub recycled: usize,
    /// Links that fell back to a copy
    pub copied: usize,
    /// Wanted files already in place
    pub unchanged: usize,
    /// Whether the manifest was written or removed
    pub manifest_changed: bool,
    /// Skins recorded in the manifest
    pub manifest: Vec<SkinId>,
    /// Failed attempts absorbed by retries
    pub failures: u32,
    /// Wall time of the apply step in milliseconds
    pub duration_ms: u64,
}

impl CompositionReport {
    /// Whether the pass changed anything on disk
    pub fn mutated(&self) -> bool {
        self.created > 0
            || self.replaced > 0
            || self.deleted > 0
            || self.recycled > 0
            || self.manifest_changed
    }
}

/// Failure accounting for a single pass
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    attempts: u32,
    delay: Duration,
    budget: u32,
    failures: u32,
}

impl RetryBudget {
    /// Fresh budget from configuration
    pub fn new(config: &CompositorConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            delay: config.retry_delay(),
            budget: config.failure_budget,
            failures: 0,
        }
    }

    /// Failures counted so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Run `op` with retries, charging failures to the budget
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::RetryBudgetExceeded`] when the budget runs
    /// out, or [`CompositionError::Io`] when every attempt failed.
    pub async fn run<T, F, Fut>(
        &mut self,
        operation: FileOperation,
        mut op: F,
    ) -> Result<T, CompositionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            self.failures = self.failures.saturating_add(1);
            if self.failures > self.budget {
                return Err(CompositionError::RetryBudgetExceeded {
                    operation,
                    failures: self.failures,
                    source: error,
                });
            }
            if attempt >= self.attempts {
                return Err(CompositionError::io(operation, error));
            }
            warn!(
                %operation,
                attempt,
                failures = self.failures,
                error = %error,
                "Filesystem operation failed, retrying"
            );
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Creates hard links in the output directory
///
/// Errors of kind `CrossesDevices` or `Unsupported` make the composer copy
/// the file instead.
#[async_trait]
pub trait HardLinker: Send + Sync {
    /// Make `target` another name of `source`
    async fn hard_link(&self, source: &Path, target: &Path) -> io::Result<()>;
}

/// Links through the file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsHardLinker;

#[async_trait]
impl HardLinker for FsHardLinker {
    async fn hard_link(&self, source: &Path, target: &Path) -> io::Result<()> {
        async_fs::hard_link(source, target).await
    }
}

/// Executes plans against one track's output directory
pub struct Composer {
    layout: TrackLayout,
    config: CompositorConfig,
    recycler: Arc<dyn Recycler>,
    linker: Arc<dyn HardLinker>,
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Composer {
    /// Composer for `layout` recycling through `recycler`
    pub fn new(layout: TrackLayout, config: CompositorConfig, recycler: Arc<dyn Recycler>) -> Self {
        Self {
            layout,
            config,
            recycler,
            linker: Arc::new(FsHardLinker),
        }
    }

    /// Link files through `linker`
    pub fn with_linker(mut self, linker: Arc<dyn HardLinker>) -> Self {
        self.linker = linker;
        self
    }

    /// Apply `plan`, then write or remove the manifest
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::MountUnavailable`] if the track's skins
    /// folder is gone, otherwise the first operation failure that could not
    /// be retried away.
    pub async fn apply(&self, plan: &CompositionPlan) -> Result<CompositionReport, CompositionError> {
        let started = Instant::now();
        let skins_dir = self.layout.skins_dir();
        if !async_fs::try_exists(&skins_dir).await.unwrap_or(false) {
            return Err(CompositionError::mount_unavailable(skins_dir));
        }

        let mut budget = RetryBudget::new(&self.config);
        let mut report = CompositionReport {
            track_id: self.layout.track_id().to_string(),
            unchanged: plan.unchanged,
            ..Default::default()
        };

        let output_dir = self.layout.output_dir();
        if !async_fs::try_exists(&output_dir).await.unwrap_or(false) {
            budget
                .run(
                    FileOperation::new(OperationKind::CreateDirectory, &output_dir),
                    || async_fs::create_dir_all(&output_dir),
                )
                .await?;
        }

        for operation in &plan.operations {
            match operation {
                PlanOperation::Remove { target, disposal } => {
                    self.dispose(&mut budget, &mut report, target, *disposal)
                        .await?;
                }
                PlanOperation::Replace {
                    target,
                    source,
                    disposal,
                } => {
                    self.dispose(&mut budget, &mut report, target, *disposal)
                        .await?;
                    self.link(&mut budget, &mut report, source, target).await?;
                    report.replaced = report.replaced.saturating_add(1);
                }
                PlanOperation::Create { target, source } => {
                    self.link(&mut budget, &mut report, source, target).await?;
                    report.created = report.created.saturating_add(1);
                }
            }
        }

        report.manifest_changed = self.write_manifest(&mut budget, &plan.manifest).await?;
        report.manifest = plan.manifest.ids().to_vec();
        report.failures = budget.failures();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            track_id = %report.track_id,
            created = report.created,
            replaced = report.replaced,
            deleted = report.deleted,
            recycled = report.recycled,
            unchanged = report.unchanged,
            manifest_changed = report.manifest_changed,
            failures = report.failures,
            "Skin composition applied"
        );
        Ok(report)
    }

    async fn dispose(
        &self,
        budget: &mut RetryBudget,
        report: &mut CompositionReport,
        target: &Path,
        disposal: Disposal,
    ) -> Result<(), CompositionError> {
        match disposal {
            Disposal::Delete => {
                budget
                    .run(FileOperation::new(OperationKind::Delete, target), || {
                        async_fs::remove_file(target)
                    })
                    .await?;
                report.deleted = report.deleted.saturating_add(1);
                debug!(path = ?target, "Output file deleted");
            }
            Disposal::Recycle => {
                let recycler: &dyn Recycler = self.recycler.as_ref();
                budget
                    .run(FileOperation::new(OperationKind::Recycle, target), move || {
                        recycler.recycle(target)
                    })
                    .await?;
                report.recycled = report.recycled.saturating_add(1);
            }
        }
        Ok(())
    }

    async fn link(
        &self,
        budget: &mut RetryBudget,
        report: &mut CompositionReport,
        source: &Path,
        target: &Path,
    ) -> Result<(), CompositionError> {
        let linker: &dyn HardLinker = self.linker.as_ref();
        let copied = budget
            .run(FileOperation::link(source, target), move || {
                link_or_copy(linker, source, target)
            })
            .await?;
        if copied {
            report.copied = report.copied.saturating_add(1);
        }
        debug!(source = ?source, target = ?target, copied, "Output file linked");
        Ok(())
    }

    async fn write_manifest(
        &self,
        budget: &mut RetryBudget,
        manifest: &ActiveSkinManifest,
    ) -> Result<bool, CompositionError> {
        let path = self.layout.manifest_path();

        if manifest.is_empty() {
            if !async_fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(false);
            }
            budget
                .run(FileOperation::new(OperationKind::RemoveManifest, &path), || {
                    async_fs::remove_file(&path)
                })
                .await?;
            debug!(path = ?path, "Active skin manifest removed");
            return Ok(true);
        }

        let content = manifest
            .render()
            .map_err(|e| CompositionError::manifest(&path, e))?;
        if let Ok(current) = async_fs::read(&path).await
            && current == content.as_bytes()
        {
            return Ok(false);
        }

        let temp_path = path.with_extension("json.tmp");
        budget
            .run(FileOperation::new(OperationKind::WriteManifest, &path), || {
                write_atomic(&temp_path, &path, &content)
            })
            .await?;
        debug!(path = ?path, skins = manifest.ids().len(), "Active skin manifest written");
        Ok(true)
    }
}

/// Hard-link `source` to `target`, copying when the mount cannot link
///
/// Returns whether a copy was made.
///
/// # Errors
///
/// Returns the I/O error from linking or copying.
pub async fn link_or_copy(
    linker: &dyn HardLinker,
    source: &Path,
    target: &Path,
) -> io::Result<bool> {
    match linker.hard_link(source, target).await {
        Ok(()) => Ok(false),
        Err(e) if matches!(
            e.kind(),
            io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported
        ) =>
        {
            debug!(source = ?source, target = ?target, error = %e, "Hard link unavailable, copying");
            async_fs::copy(source, target).await?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

async fn write_atomic(temp_path: &Path, path: &Path, content: &str) -> io::Result<()> {
    async_fs::write(temp_path, content).await?;
    async_fs::rename(temp_path, path).await
}
