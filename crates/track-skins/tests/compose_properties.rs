//! End-to-end composition behaviour against real track folders

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use track_skins::ActiveSkinManifest;
use track_skins::prelude::*;

fn must<T, E: std::fmt::Debug>(r: std::result::Result<T, E>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => panic!("unexpected Err: {e:?}"),
    }
}

struct Track {
    _temp: TempDir,
    layout: TrackLayout,
}

impl Track {
    fn new() -> Self {
        let temp = must(TempDir::new());
        let layout = TrackLayout::new("spa", temp.path());
        must(std::fs::create_dir_all(layout.sources_dir()));
        Self {
            _temp: temp,
            layout,
        }
    }

    fn skin(&self, id: &str, files: &[&str]) -> PathBuf {
        let dir = self.layout.sources_dir().join(id);
        for file in files {
            let path = dir.join(file);
            if let Some(parent) = path.parent() {
                must(std::fs::create_dir_all(parent));
            }
            must(std::fs::write(&path, format!("{id}/{file}")));
        }
        must(std::fs::create_dir_all(&dir));
        dir
    }

    fn output(&self, name: &str) -> PathBuf {
        self.layout.output_dir().join(name)
    }

    fn read_output(&self, name: &str) -> String {
        must(std::fs::read_to_string(self.output(name)))
    }

    fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = must(std::fs::read_dir(self.layout.output_dir()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    fn open(&self) -> TrackSkins {
        let config = CompositorConfig::default().with_debounce(Duration::from_millis(10));
        must(TrackSkins::open(self.layout.clone(), config))
    }
}

fn recycled_files(dir: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let Ok(batches) = std::fs::read_dir(dir) else {
        return found;
    };
    for batch in batches.filter_map(Result::ok) {
        for entry in must(std::fs::read_dir(batch.path())).filter_map(Result::ok) {
            found.push(must(std::fs::read_to_string(entry.path())));
        }
    }
    found
}

mod composition {
    use super::*;

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let track = Track::new();
        track.skin("red", &["body.dds", "wheel.png"]);
        track.skin("crowd", &["crowd.jpg"]);
        let skins = track.open();
        must(skins.set_active(&SkinId::new("red"), true));
        must(skins.set_active(&SkinId::new("crowd"), true));
        skins.wait_idle().await;

        assert_eq!(track.output_names(), ["body.dds", "cm_skins_active.json", "crowd.jpg", "wheel.png"]);

        let plan = must(skins.plan().await);
        assert!(plan.is_noop());
        let report = must(skins.compose_now().await);
        assert!(!report.mutated());
        assert_eq!(report.unchanged, 3);
    }

    #[tokio::test]
    async fn test_higher_priority_wins_regardless_of_order() {
        let track = Track::new();
        track.skin("alpha", &["body.dds"]);
        track.skin("beta", &["body.dds"]);
        let skins = track.open();
        must(skins.set_priority(&SkinId::new("alpha"), 5.0));
        must(skins.set_active(&SkinId::new("alpha"), true));
        must(skins.set_active(&SkinId::new("beta"), true));
        skins.wait_idle().await;
        assert_eq!(track.read_output("body.dds"), "alpha/body.dds");

        must(skins.set_priority(&SkinId::new("alpha"), 0.0));
        skins.wait_idle().await;
        assert_eq!(track.read_output("body.dds"), "beta/body.dds");
    }

    #[tokio::test]
    async fn test_combination_folder_applies_only_with_partner_active() {
        let track = Track::new();
        track.skin("red", &["body.dds", "crowd/body.dds"]);
        track.skin("crowd", &["crowd.jpg"]);
        let skins = track.open();

        must(skins.set_active(&SkinId::new("red"), true));
        skins.wait_idle().await;
        assert_eq!(track.read_output("body.dds"), "red/body.dds");

        must(skins.set_active(&SkinId::new("crowd"), true));
        skins.wait_idle().await;
        assert_eq!(track.read_output("body.dds"), "red/crowd/body.dds");

        must(skins.set_active(&SkinId::new("crowd"), false));
        skins.wait_idle().await;
        assert_eq!(track.read_output("body.dds"), "red/body.dds");
        assert!(!track.output("crowd.jpg").exists());
    }

    #[tokio::test]
    async fn test_ineligible_files_never_reach_output() {
        let track = Track::new();
        track.skin("red", &["body.dds", "preview.png", "readme.txt", "ui_skin.json"]);
        let skins = track.open();
        must(skins.set_active(&SkinId::new("red"), true));
        skins.wait_idle().await;
        assert_eq!(track.output_names(), ["body.dds", "cm_skins_active.json"]);
    }
}

mod disposal {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_linked_files_deleted_and_private_files_recycled() {
        let track = Track::new();
        let red = track.skin("red", &["body.dds"]);
        must(std::fs::create_dir_all(track.layout.output_dir()));
        must(std::fs::write(track.output("handmade.dds"), "mine"));

        let skins = track.open();
        must(skins.set_active(&SkinId::new("red"), true));
        skins.wait_idle().await;
        assert_eq!(recycled_files(&track.layout.recycle_dir()), ["mine"]);

        must(skins.provider().set_active(&SkinId::new("red"), false));
        let report = must(skins.compose_now().await);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.recycled, 0);
        assert!(!track.output("body.dds").exists());
        assert!(red.join("body.dds").exists());
        assert!(!track.layout.manifest_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_content_linked_only_within_output_is_recycled() {
        let track = Track::new();
        must(std::fs::create_dir_all(track.layout.output_dir()));
        must(std::fs::write(track.output("a.dds"), "precious"));
        must(std::fs::hard_link(track.output("a.dds"), track.output("b.dds")));

        let skins = track.open();
        let report = must(skins.compose_now().await);

        assert_eq!(report.deleted, 0);
        assert_eq!(report.recycled, 2);
        assert!(track.output_names().is_empty());
        assert_eq!(
            recycled_files(&track.layout.recycle_dir()),
            ["precious", "precious"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_edited_output_is_recycled_before_relinking() {
        let track = Track::new();
        track.skin("red", &["body.dds"]);
        let skins = track.open();
        must(skins.set_active(&SkinId::new("red"), true));
        skins.wait_idle().await;

        must(std::fs::remove_file(track.output("body.dds")));
        must(std::fs::write(track.output("body.dds"), "edited"));

        let report = must(skins.compose_now().await);
        assert_eq!(report.replaced, 1);
        assert_eq!(report.recycled, 1);
        assert_eq!(track.read_output("body.dds"), "red/body.dds");
        assert_eq!(recycled_files(&track.layout.recycle_dir()), ["edited"]);
    }
}

mod manifest {
    use super::*;

    #[tokio::test]
    async fn test_manifest_lists_contributing_skins_in_order() {
        let track = Track::new();
        track.skin("alpha", &["a.dds"]);
        track.skin("beta", &["b.dds"]);
        track.skin("empty", &["notes.txt"]);
        let skins = track.open();
        for id in ["beta", "empty", "alpha"] {
            must(skins.set_active(&SkinId::new(id), true));
        }
        skins.wait_idle().await;

        let text = must(std::fs::read_to_string(track.layout.manifest_path()));
        let manifest = must(ActiveSkinManifest::parse(&text));
        assert_eq!(manifest.ids(), [SkinId::new("alpha"), SkinId::new("beta")]);
    }

    #[tokio::test]
    async fn test_active_flags_restored_after_restart() {
        let track = Track::new();
        track.skin("red", &["body.dds"]);
        track.skin("blue", &["wheel.dds"]);
        {
            let skins = track.open();
            must(skins.set_active(&SkinId::new("blue"), true));
            skins.wait_idle().await;
        }

        let reopened = track.open();
        let active: Vec<String> = reopened
            .provider()
            .active_skins()
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(active, ["blue"]);
        assert!(must(reopened.plan().await).is_noop());
    }

    #[tokio::test]
    async fn test_missing_mount_reports_error() {
        let track = Track::new();
        track.skin("red", &["body.dds"]);
        let skins = track.open();
        must(skins.provider().set_active(&SkinId::new("red"), true));
        must(std::fs::remove_dir_all(track.layout.skins_dir()));

        let result = skins.compose_now().await;
        assert!(matches!(result, Err(CompositionError::MountUnavailable { .. })));
    }
}
