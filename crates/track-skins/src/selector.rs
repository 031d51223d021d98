//! Winning-file selection across active skins
//!
//! Every eligible image file of every active skin competes for its
//! lowercased file name. A strictly higher priority wins; on a tie the skin
//! enumerated later wins. Sub-folders named after a combination of active
//! skins (`red_blue`, `red & blue`) add their files with a boosted priority
//! so combination content beats any single-skin file of the same name.

use crate::cache::{FolderListing, LayoutCache, ListedFile};
use crate::record::{SkinId, SkinRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extensions the game loads from the output directory
pub const ELIGIBLE_EXTENSIONS: &[&str] = &["dds", "gif", "jpeg", "jpg", "png", "tga", "tif", "tiff"];

/// Preview images live next to skin content but never reach the output
pub const PREVIEW_FILE: &str = "preview.png";

/// Priority added per token of a combination sub-folder
pub const COMBINATION_PRIORITY_STEP: f64 = 100.0;

/// The current winner for one output file name
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntry {
    /// Lowercased file name
    pub key: String,
    /// File name as found in the skin folder
    pub file_name: String,
    /// Effective priority the file competed with
    pub priority: f64,
    /// Source file to link into the output
    pub source: PathBuf,
    /// Skin whose folder holds the source
    pub skin_id: SkinId,
}

/// Winning files keyed by lowercased file name
#[derive(Debug, Clone, Default)]
pub struct CandidateMap {
    entries: BTreeMap<String, CandidateEntry>,
}

impl CandidateMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a file; returns whether it became the winner for its key
    pub fn offer(
        &mut self,
        file_name: &str,
        priority: f64,
        source: PathBuf,
        skin_id: &SkinId,
    ) -> bool {
        let key = file_name.to_lowercase();
        if let Some(existing) = self.entries.get(&key)
            && priority < existing.priority
        {
            return false;
        }
        self.entries.insert(
            key.clone(),
            CandidateEntry {
                key,
                file_name: file_name.to_string(),
                priority,
                source,
                skin_id: skin_id.clone(),
            },
        );
        true
    }

    /// Winner for a key, if any
    pub fn get(&self, key: &str) -> Option<&CandidateEntry> {
        self.entries.get(key)
    }

    /// Iterate winners in key order
    pub fn iter(&self) -> impl Iterator<Item = &CandidateEntry> {
        self.entries.values()
    }

    /// Number of output files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file was selected
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reduce to `key -> source`
    pub fn into_sources(self) -> BTreeMap<String, PathBuf> {
        self.entries
            .into_iter()
            .map(|(key, entry)| (key, entry.source))
            .collect()
    }

    /// Ids of skins that won at least one file, in the order of `skins`
    pub fn contributing_ids(&self, skins: &[SkinRecord]) -> Vec<SkinId> {
        let winners: BTreeSet<&SkinId> = self.entries.values().map(|e| &e.skin_id).collect();
        skins
            .iter()
            .filter(|skin| winners.contains(&skin.id))
            .map(|skin| skin.id.clone())
            .collect()
    }
}

/// Whether a file name can be composed into the output
pub fn is_eligible_file(name: &str) -> bool {
    if name.eq_ignore_ascii_case(PREVIEW_FILE) {
        return false;
    }
    name.rsplit_once('.').is_some_and(|(_, extension)| {
        ELIGIBLE_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    })
}

/// Distinct lowercased tokens of a combination folder name
///
/// Any character that is not alphanumeric separates tokens, so `red_blue`,
/// `red-blue` and `red & blue` all yield `{red, blue}`. Skin ids are split
/// the same way before matching, see [`combination_applies`].
pub fn combination_tokens(folder_name: &str) -> BTreeSet<String> {
    folder_name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether a combination folder with `tokens` applies to the active skins
///
/// `active` holds the token set of every active skin id. The folder applies
/// when the skins whose tokens all appear in the folder name together cover
/// every token, so `red_livery_crowd` needs `red_livery` and `crowd` active
/// while `livery` alone never matches `red_livery`.
pub fn combination_applies(tokens: &BTreeSet<String>, active: &[BTreeSet<String>]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let covered: BTreeSet<&String> = active
        .iter()
        .filter(|skin| !skin.is_empty() && skin.is_subset(tokens))
        .flatten()
        .collect();
    covered.len() == tokens.len()
}

/// Scans active skins and picks the winning file per output name
#[derive(Debug, Clone, Copy)]
pub struct FileSelector<'a> {
    cache: &'a LayoutCache,
}

impl<'a> FileSelector<'a> {
    /// Selector reading folders through `cache`
    pub fn new(cache: &'a LayoutCache) -> Self {
        Self { cache }
    }

    /// Build the candidate map for `active`, given in provider order
    ///
    /// Folders that cannot be read are skipped with a warning; the remaining
    /// skins still compose.
    pub fn select(&self, active: &[SkinRecord]) -> CandidateMap {
        let mut candidates = CandidateMap::new();
        let active_tokens: Vec<BTreeSet<String>> = active
            .iter()
            .map(|s| combination_tokens(s.id.as_str()))
            .collect();

        for skin in active {
            let Some(listing) = self.read(skin, &skin.location) else {
                continue;
            };
            self.offer_files(&mut candidates, skin, &listing.files, skin.priority);
        }

        for skin in active {
            let Some(listing) = self.read(skin, &skin.location) else {
                continue;
            };
            for folder in &listing.folders {
                let tokens = combination_tokens(&folder.name);
                if !combination_applies(&tokens, &active_tokens) {
                    continue;
                }
                let Some(sub) = self.read(skin, &folder.path) else {
                    continue;
                };
                let boost = COMBINATION_PRIORITY_STEP * token_weight(tokens.len());
                debug!(
                    skin_id = %skin.id,
                    folder = %folder.name,
                    tokens = tokens.len(),
                    "Including combination folder"
                );
                self.offer_files(&mut candidates, skin, &sub.files, skin.priority + boost);
            }
        }

        candidates
    }

    fn read(&self, skin: &SkinRecord, dir: &Path) -> Option<Arc<FolderListing>> {
        match self.cache.listing(dir) {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!(skin_id = %skin.id, path = ?dir, error = %e, "Skipping unreadable skin folder");
                None
            }
        }
    }

    fn offer_files(
        &self,
        candidates: &mut CandidateMap,
        skin: &SkinRecord,
        files: &[ListedFile],
        priority: f64,
    ) {
        for file in files.iter().filter(|f| is_eligible_file(&f.name)) {
            candidates.offer(&file.name, priority, file.path.clone(), &skin.id);
        }
    }
}

fn token_weight(count: usize) -> f64 {
    u32::try_from(count).map(f64::from).unwrap_or(f64::from(u32::MAX))
}
