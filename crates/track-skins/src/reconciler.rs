//! Diff between the winning files and the output directory
//!
//! The reconciler never touches the filesystem beyond reading metadata. It
//! decides, for every output entry, whether it stays, is replaced, or goes,
//! and whether a file that goes may be deleted outright. Content that still
//! has another hard link somewhere on the mount is safe to delete; content
//! whose only name is in the output directory is recycled instead.

use crate::error::{CompositionError, FileOperation, OperationKind};
use crate::links::{self, FileIdentity, LinkInfo};
use crate::manifest::ActiveSkinManifest;
use crate::record::SkinRecord;
use crate::selector::CandidateMap;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// How a file leaving the output directory is disposed of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Permanently remove; the content survives under another name
    Delete,
    /// Move to the recycle destination; this was the last name of the content
    Recycle,
}

/// One step of a composition plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOperation {
    /// An output file no longer wanted
    Remove {
        /// Output file
        target: PathBuf,
        /// How to get rid of it
        disposal: Disposal,
    },
    /// An output file carrying the wrong content
    Replace {
        /// Output file
        target: PathBuf,
        /// Winning source to link in its place
        source: PathBuf,
        /// How to get rid of the current content
        disposal: Disposal,
    },
    /// A wanted file missing from the output
    Create {
        /// Output file to create
        target: PathBuf,
        /// Winning source to link
        source: PathBuf,
    },
}

impl PlanOperation {
    /// Output file the step writes or removes
    pub fn target(&self) -> &Path {
        match self {
            Self::Remove { target, .. }
            | Self::Replace { target, .. }
            | Self::Create { target, .. } => target,
        }
    }
}

/// Ordered operations plus the manifest the pass should leave behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionPlan {
    /// Removes first, then replaces, then creates
    pub operations: Vec<PlanOperation>,
    /// Skins that contributed at least one winning file
    pub manifest: ActiveSkinManifest,
    /// Wanted files already in place
    pub unchanged: usize,
}

impl CompositionPlan {
    /// Whether applying the plan would not touch any output file
    pub fn is_noop(&self) -> bool {
        self.operations.is_empty()
    }
}

/// A file currently in the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    /// Lowercased file name
    pub key: String,
    /// Full path
    pub path: PathBuf,
    /// Link identity and count
    pub link: LinkInfo,
}

/// List the output directory, skipping the manifest and sub-folders
///
/// A missing directory lists as empty.
///
/// # Errors
///
/// Returns [`CompositionError::Io`] if the directory or a file's metadata
/// cannot be read.
pub fn scan_output(dir: &Path, manifest_file: &str) -> Result<Vec<OutputEntry>, CompositionError> {
    let inspect_error = |path: &Path, e| {
        CompositionError::io(FileOperation::new(OperationKind::Inspect, path), e)
    };

    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(inspect_error(dir, e)),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| inspect_error(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| inspect_error(&path, e))?;
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            trace!(path = ?path, "Skipping non UTF-8 output entry");
            continue;
        };
        if name.eq_ignore_ascii_case(manifest_file) {
            continue;
        }
        let link = links::inspect(&path).map_err(|e| inspect_error(&path, e))?;
        entries.push(OutputEntry {
            key: name.to_lowercase(),
            path,
            link,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Plans the minimal set of output changes
#[derive(Debug, Clone)]
pub struct Reconciler {
    output_dir: PathBuf,
}

impl Reconciler {
    /// Reconciler for one output directory
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Plan how to turn `existing` into exactly the files of `candidates`
    ///
    /// `active` supplies the provider order for the manifest ids.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Io`] if a source file cannot be inspected.
    pub fn plan(
        &self,
        candidates: &CandidateMap,
        active: &[SkinRecord],
        existing: &[OutputEntry],
    ) -> Result<CompositionPlan, CompositionError> {
        let mut local_links: HashMap<FileIdentity, u64> = HashMap::new();
        for entry in existing {
            if let Some(identity) = entry.link.identity {
                let count = local_links.entry(identity).or_insert(0);
                *count = count.saturating_add(1);
            }
        }

        let mut removes = Vec::new();
        let mut replaces = Vec::new();
        let mut creates = Vec::new();
        let mut present: BTreeSet<&str> = BTreeSet::new();
        let mut unchanged = 0usize;

        for entry in existing {
            let wanted = candidates
                .get(&entry.key)
                .filter(|_| !present.contains(entry.key.as_str()));
            let Some(candidate) = wanted else {
                let disposal = disposal_for(entry, &local_links);
                debug!(path = ?entry.path, ?disposal, "Output file no longer wanted");
                removes.push(PlanOperation::Remove {
                    target: entry.path.clone(),
                    disposal,
                });
                continue;
            };
            present.insert(entry.key.as_str());

            let in_place = links::is_linked_to(&entry.link, &entry.path, &candidate.source)
                .map_err(|e| {
                    CompositionError::io(
                        FileOperation::new(OperationKind::Inspect, &candidate.source),
                        e,
                    )
                })?;
            if in_place {
                unchanged = unchanged.saturating_add(1);
                continue;
            }

            let disposal = disposal_for(entry, &local_links);
            debug!(
                path = ?entry.path,
                source = ?candidate.source,
                ?disposal,
                "Output file has the wrong content"
            );
            replaces.push(PlanOperation::Replace {
                target: entry.path.clone(),
                source: candidate.source.clone(),
                disposal,
            });
        }

        for candidate in candidates.iter() {
            if present.contains(candidate.key.as_str()) {
                continue;
            }
            creates.push(PlanOperation::Create {
                target: self.output_dir.join(&candidate.file_name),
                source: candidate.source.clone(),
            });
        }

        let mut operations = removes;
        operations.append(&mut replaces);
        operations.append(&mut creates);

        Ok(CompositionPlan {
            operations,
            manifest: ActiveSkinManifest::new(candidates.contributing_ids(active)),
            unchanged,
        })
    }
}

/// Delete only when the content keeps a name outside the output directory
///
/// Other output names of the same content are left out of the count: they
/// may be removed by the same plan.
fn disposal_for(entry: &OutputEntry, local_links: &HashMap<FileIdentity, u64>) -> Disposal {
    let local = entry
        .link
        .identity
        .and_then(|identity| local_links.get(&identity).copied())
        .unwrap_or(1);
    if entry.link.has_sibling_outside(local) {
        Disposal::Delete
    } else {
        Disposal::Recycle
    }
}
