//! Track skin overlay compositing
//!
//! A track keeps optional skins under `skins/cm_skins/<id>/`. The simulator
//! only reads `skins/default/`, so active skins are merged into that folder:
//! every eligible texture is hard-linked (or copied where linking is not
//! possible) from the highest-priority skin that provides it.
//!
//! # Architecture
//!
//! - [`provider`]: skin records and the [`SkinSetProvider`] boundary
//! - [`selector`]: picks the winning source for every output file name
//! - [`reconciler`]: diffs the wanted set against the output folder
//! - [`composer`]: applies a plan with bounded retries and writes the manifest
//! - [`compositor`]: one full pass, select → reconcile → apply
//! - [`scheduler`]: per-track debounce, coalescing and category exclusion
//! - [`track`]: [`TrackSkins`] facade used by hosts and the CLI
//!
//! # Error Recovery
//!
//! A pass never leaves the output folder half-understood: each operation is
//! retried, failed attempts count against a per-pass budget, and an aborted
//! pass is simply followed by a fresh one that reconciles from the current
//! disk state. Files only this folder references are recycled, not deleted.
//!
//! # Example
//!
//! ```ignore
//! use track_skins::prelude::*;
//!
//! # async fn example() -> Result<(), CompositionError> {
//! let config = CompositorConfig::default();
//! let layout = TrackLayout::from_track_dir("content/tracks/spa", &config);
//! let skins = TrackSkins::open(layout, config)?;
//!
//! skins.set_active(&SkinId::new("redLivery"), true)?;
//! skins.wait_idle().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod composer;
pub mod compositor;
pub mod config;
pub mod error;
pub mod layout;
pub mod links;
pub mod manifest;
pub mod prelude;
pub mod provider;
pub mod reconciler;
pub mod record;
pub mod recycle;
pub mod scheduler;
pub mod selector;
pub mod track;

pub use composer::{Composer, CompositionReport, FsHardLinker, HardLinker, RetryBudget};
pub use compositor::{CompositionRunner, Compositor};
pub use config::CompositorConfig;
pub use error::{CompositionError, FileOperation, OperationKind};
pub use layout::TrackLayout;
pub use manifest::ActiveSkinManifest;
pub use provider::{FolderSkinProvider, SkinSetProvider};
pub use reconciler::{CompositionPlan, Disposal, PlanOperation, Reconciler};
pub use record::{SkinId, SkinRecord};
pub use recycle::{FolderRecycler, Recycler};
pub use scheduler::{CompositionObserver, CompositionScheduler, SchedulerPhase, TracingObserver};
pub use selector::{CandidateMap, FileSelector};
pub use track::TrackSkins;

/// Result type for compositing operations
pub type Result<T> = std::result::Result<T, CompositionError>;
