//! Hard-link identity of output files

use std::fs::Metadata;
use std::io::{self, Read};
use std::path::Path;

/// Device and inode of a file; equal identities are hard links of each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    /// Device (mount) the file lives on
    pub device: u64,
    /// Inode on that device
    pub inode: u64,
}

/// Link-related facts about one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    /// Identity, where the platform exposes one
    pub identity: Option<FileIdentity>,
    /// Number of names pointing at the content
    pub link_count: u64,
}

impl LinkInfo {
    /// Whether the content has another name anywhere on its mount
    pub fn is_shared(&self) -> bool {
        self.link_count > 1
    }

    /// Whether more names exist than the `local_links` found in the output directory
    pub fn has_sibling_outside(&self, local_links: u64) -> bool {
        self.link_count > local_links
    }
}

/// Inspect a file's link identity
///
/// # Errors
///
/// Returns the I/O error from reading metadata.
pub fn inspect(path: &Path) -> io::Result<LinkInfo> {
    let metadata = std::fs::metadata(path)?;
    Ok(from_metadata(&metadata))
}

#[cfg(unix)]
fn from_metadata(metadata: &Metadata) -> LinkInfo {
    use std::os::unix::fs::MetadataExt;
    LinkInfo {
        identity: Some(FileIdentity {
            device: metadata.dev(),
            inode: metadata.ino(),
        }),
        link_count: metadata.nlink(),
    }
}

#[cfg(not(unix))]
fn from_metadata(_metadata: &Metadata) -> LinkInfo {
    LinkInfo {
        identity: None,
        link_count: 1,
    }
}

/// Whether `target` already carries the content of `source`
///
/// Hard links of each other always match. Otherwise the output may be a copy
/// made where linking failed (another device, a file system without hard
/// links, a platform without identities), so the bytes are compared.
///
/// # Errors
///
/// Returns the I/O error from reading either file.
pub fn is_linked_to(target: &LinkInfo, target_path: &Path, source_path: &Path) -> io::Result<bool> {
    let source = inspect(source_path)?;
    match (target.identity, source.identity) {
        (Some(t), Some(s)) if t == s => Ok(true),
        _ => same_content(target_path, source_path),
    }
}

/// Byte-for-byte comparison of two files
///
/// # Errors
///
/// Returns the I/O error from opening or reading either file.
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let (meta_a, meta_b) = (std::fs::metadata(a)?, std::fs::metadata(b)?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut file_a = std::fs::File::open(a)?;
    let mut file_b = std::fs::File::open(b)?;
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    loop {
        let read = file_a.read(&mut buf_a)?;
        if read == 0 {
            return Ok(true);
        }
        let (Some(chunk_a), Some(chunk_b)) = (buf_a.get(..read), buf_b.get_mut(..read)) else {
            return Ok(false);
        };
        file_b.read_exact(chunk_b)?;
        if chunk_a != chunk_b {
            return Ok(false);
        }
    }
}
