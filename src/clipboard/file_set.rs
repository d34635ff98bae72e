//! Locally offered files
//!
//! When the local clipboard holds a file drop list, the peer first asks for
//! the FILEGROUPDESCRIPTORW and then for file contents by list index. The
//! [`VirtualFileSet`] expands the dropped paths into one descriptor per file
//! or directory and answers those later requests from disk.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use enumflags2::BitFlags;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::formats::{build_file_group, FileAttribute, FileDescriptor};

/// One expanded entry: where it lives and how it is described to the peer
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub descriptor: FileDescriptor,
}

/// Files offered by this side, in descriptor order
#[derive(Debug, Clone, Default)]
pub struct VirtualFileSet {
    files: Vec<LocalFile>,
}

impl VirtualFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand dropped paths, walking directories recursively
    ///
    /// Directories are listed before their contents. Names are relative to
    /// the parent of each dropped path and use `\` as separator.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::new();

        for root in paths {
            let base = root.parent().unwrap_or_else(|| Path::new(""));
            for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
                let entry = entry.map_err(std::io::Error::from)?;
                let metadata = entry.metadata().map_err(std::io::Error::from)?;
                let Some(name) = relative_name(base, entry.path()) else {
                    warn!("Skipping {:?}: not representable as UTF-8", entry.path());
                    continue;
                };

                let descriptor = FileDescriptor {
                    name,
                    size: Some(if metadata.is_dir() { 0 } else { metadata.len() }),
                    attributes: attributes_for(entry.path(), &metadata),
                    last_write_time: metadata.modified().ok().map(DateTime::<Utc>::from),
                };
                files.push(LocalFile {
                    path: entry.into_path(),
                    descriptor,
                });
            }
        }

        debug!(
            "Expanded {} dropped path(s) into {} descriptor(s)",
            paths.len(),
            files.len()
        );
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LocalFile> {
        self.files.get(index)
    }

    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.files.iter().map(|f| f.descriptor.clone()).collect()
    }

    /// FILEGROUPDESCRIPTORW for the whole set
    pub fn to_file_group(&self) -> Bytes {
        build_file_group(&self.descriptors())
    }

    /// Size recorded when the set was built
    pub fn size_of(&self, index: usize) -> Result<u64> {
        let file = self.entry(index)?;
        Ok(file.descriptor.size.unwrap_or(0))
    }

    /// Read up to `len` bytes at `offset`; short at end of file
    pub fn read_range(&self, index: usize, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self.entry(index)?;
        if file.descriptor.is_directory() {
            return Err(ClipboardError::InvalidData(format!(
                "'{}' is a directory",
                file.descriptor.name
            )));
        }

        let mut handle = File::open(&file.path)?;
        handle.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        handle.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn entry(&self, index: usize) -> Result<&LocalFile> {
        self.files.get(index).ok_or_else(|| {
            ClipboardError::InvalidData(format!(
                "list index {} out of range ({} files)",
                index,
                self.files.len()
            ))
        })
    }
}

fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    let name = parts?.join("\\");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn attributes_for(path: &Path, metadata: &std::fs::Metadata) -> BitFlags<FileAttribute> {
    let mut attributes = BitFlags::empty();
    if metadata.is_dir() {
        attributes |= FileAttribute::Directory;
    }
    if metadata.permissions().readonly() {
        attributes |= FileAttribute::ReadOnly;
    }
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    if hidden {
        attributes |= FileAttribute::Hidden;
    }
    if attributes.is_empty() {
        attributes |= FileAttribute::Normal;
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::formats::parse_file_group;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello world").unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();
        fs::write(dir.path().join("photos").join("a.jpg"), vec![7u8; 100]).unwrap();
        fs::create_dir(dir.path().join("photos").join("raw")).unwrap();
        fs::write(dir.path().join("photos").join("raw").join("b.cr2"), b"xyz").unwrap();
        dir
    }

    #[test]
    fn test_single_file() {
        let dir = tree();
        let set = VirtualFileSet::from_paths(&[dir.path().join("notes.txt")]).unwrap();
        assert_eq!(set.len(), 1);
        let d = &set.get(0).unwrap().descriptor;
        assert_eq!(d.name, "notes.txt");
        assert_eq!(d.size, Some(11));
        assert!(!d.is_directory());
        assert!(d.last_write_time.is_some());
    }

    #[test]
    fn test_directory_expansion() {
        let dir = tree();
        let set = VirtualFileSet::from_paths(&[dir.path().join("photos")]).unwrap();
        let names: Vec<String> = set.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "photos",
                "photos\\a.jpg",
                "photos\\raw",
                "photos\\raw\\b.cr2"
            ]
        );
        assert!(set.get(0).unwrap().descriptor.is_directory());
        assert!(set.get(2).unwrap().descriptor.is_directory());
        assert_eq!(set.size_of(1).unwrap(), 100);
    }

    #[test]
    fn test_file_group_blob() {
        let dir = tree();
        let set = VirtualFileSet::from_paths(&[
            dir.path().join("notes.txt"),
            dir.path().join("photos"),
        ])
        .unwrap();
        let parsed = parse_file_group(&set.to_file_group()).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].name, "notes.txt");
        assert!(parsed[1].is_directory());
    }

    #[test]
    fn test_read_range_short_at_eof() {
        let dir = tree();
        let set = VirtualFileSet::from_paths(&[dir.path().join("notes.txt")]).unwrap();
        assert_eq!(set.read_range(0, 0, 5).unwrap(), b"hello");
        assert_eq!(set.read_range(0, 6, 100).unwrap(), b"world");
        assert!(set.read_range(0, 11, 10).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_and_directory_reads_fail() {
        let dir = tree();
        let set = VirtualFileSet::from_paths(&[dir.path().join("photos")]).unwrap();
        assert!(set.read_range(9, 0, 1).is_err());
        assert!(set.size_of(9).is_err());
        assert!(set.read_range(0, 0, 1).is_err());
    }

    #[test]
    fn test_missing_path_is_error() {
        let dir = tree();
        assert!(VirtualFileSet::from_paths(&[dir.path().join("nope")]).is_err());
    }
}
