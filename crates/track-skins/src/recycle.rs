//! Soft deletion of output files

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::debug;

/// Moves files out of the output directory without destroying them
///
/// Hosts with access to the desktop recycle bin supply their own
/// implementation; [`FolderRecycler`] is the portable default.
#[async_trait]
pub trait Recycler: Send + Sync {
    /// Move `path` somewhere recoverable
    async fn recycle(&self, path: &Path) -> io::Result<()>;
}

/// Moves recycled files into timestamped sub-folders of a recycle folder
#[derive(Debug, Clone)]
pub struct FolderRecycler {
    dir: PathBuf,
}

impl FolderRecycler {
    /// Recycler writing below `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root recycle folder
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn free_destination(&self, path: &Path) -> io::Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let batch = self.dir.join(stamp.to_string());
        async_fs::create_dir_all(&batch).await?;

        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let mut destination = batch.join(name);
        let mut counter = 1u32;
        while async_fs::try_exists(&destination).await? {
            destination = batch.join(format!("{}.{counter}", name.to_string_lossy()));
            counter = counter.saturating_add(1);
        }
        Ok(destination)
    }
}

#[async_trait]
impl Recycler for FolderRecycler {
    async fn recycle(&self, path: &Path) -> io::Result<()> {
        let destination = self.free_destination(path).await?;
        match async_fs::rename(path, &destination).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                async_fs::copy(path, &destination).await?;
                async_fs::remove_file(path).await?;
            }
            Err(e) => return Err(e),
        }
        debug!(path = ?path, destination = ?destination, "File recycled");
        Ok(())
    }
}
