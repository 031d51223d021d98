//! Command implementations

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use track_skins::scheduler::apply_category_exclusion;
use track_skins::{CompositorConfig, SkinId, SkinSetProvider, TrackLayout, TrackSkins};

use crate::error::CliError;
use crate::output;

/// Skins to switch before planning or composing
#[derive(Debug, Default, Clone)]
pub struct Selection {
    pub activate: Vec<String>,
    pub deactivate: Vec<String>,
}

pub fn load_config(path: Option<&Path>) -> Result<CompositorConfig> {
    let config = match path {
        Some(path) => CompositorConfig::from_json_file(path).map_err(CliError::from)?,
        None => CompositorConfig::default(),
    };
    config.validate().map_err(CliError::from)?;
    Ok(config)
}

fn open_track(track_dir: &Path, config: &CompositorConfig) -> Result<TrackSkins> {
    if !track_dir.is_dir() {
        return Err(CliError::TrackNotFound(track_dir.display().to_string()).into());
    }
    let layout = TrackLayout::from_track_dir(PathBuf::from(track_dir), config);
    debug!(track_id = %layout.track_id(), root = ?layout.root(), "Opening track");
    Ok(TrackSkins::open(layout, config.clone()).map_err(CliError::from)?)
}

/// Apply `selection` to the provider without scheduling a pass
fn apply_selection(skins: &TrackSkins, selection: &Selection) -> Result<()> {
    let provider = skins.provider();
    for id in &selection.deactivate {
        provider
            .set_active(&SkinId::new(id.as_str()), false)
            .map_err(CliError::from)?;
    }
    for id in &selection.activate {
        let skin = provider
            .get(id)
            .ok_or_else(|| CliError::SkinNotFound(id.clone()))?;
        provider.set_active(&skin.id, true).map_err(CliError::from)?;
        let excluded =
            apply_category_exclusion(&**provider, &skin.id).map_err(CliError::from)?;
        for other in excluded {
            info!(skin_id = %other, by = %skin.id, "Deactivated skin sharing a category");
        }
    }
    Ok(())
}

pub async fn list(track_dir: &Path, config: &CompositorConfig, json: bool) -> Result<()> {
    let skins = open_track(track_dir, config)?;
    output::print_skin_list(skins.track_id(), &skins.skins(), json);
    Ok(())
}

pub async fn plan(
    track_dir: &Path,
    config: &CompositorConfig,
    selection: &Selection,
    json: bool,
) -> Result<()> {
    let skins = open_track(track_dir, config)?;
    apply_selection(&skins, selection)?;
    let plan = skins.plan().await.map_err(CliError::from)?;
    output::print_plan(skins.track_id(), &plan, json);
    Ok(())
}

pub async fn compose(
    track_dir: &Path,
    config: &CompositorConfig,
    selection: &Selection,
    json: bool,
) -> Result<()> {
    let skins = open_track(track_dir, config)?;
    apply_selection(&skins, selection)?;
    let report = skins.compose_now().await.map_err(CliError::from)?;
    output::print_report(&report, json);
    Ok(())
}
