//! Convenience re-exports for common types

pub use crate::composer::CompositionReport;
pub use crate::compositor::{CompositionRunner, Compositor};
pub use crate::config::CompositorConfig;
pub use crate::error::CompositionError;
pub use crate::layout::TrackLayout;
pub use crate::provider::{FolderSkinProvider, SkinSetProvider};
pub use crate::record::{SkinId, SkinRecord};
pub use crate::scheduler::{CompositionObserver, SchedulerPhase};
pub use crate::track::TrackSkins;
