//! FUSE view of remote clipboard files
//!
//! Exposes the current [`VirtualFileCollection`] as a read-only directory
//! tree. Nothing is fetched until a file is read; each read becomes one
//! FILECONTENTS round trip through [`VirtualFileObject::read_at`].
//!
//! # Architecture
//!
//! ```text
//! Peer Copy  -> FORMAT_LIST(FileGroupDescriptorW) -> VirtualFileCollection on clipboard
//! Local read -> read(inode) -> VirtualFileObject::read_at -> FILECONTENTS_REQUEST
//! ```
//!
//! The tree is rebuilt lazily whenever the clipboard's collection changes.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, Request,
};
use tracing::{debug, info, trace, warn};

use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::os::OsClipboard;
use crate::clipboard::stream::{VirtualFileCollection, VirtualFileObject};

/// Root directory inode (standard FUSE convention)
const ROOT_INODE: u64 = 1;

/// Files are ephemeral, keep attributes short-lived
const TTL: Duration = Duration::from_secs(1);

/// Name of the mount directory under the runtime dir
const MOUNT_DIR_NAME: &str = "cliprdr-bridge";

#[derive(Clone)]
enum NodeKind {
    Directory { children: Vec<u64> },
    File { stream: Arc<VirtualFileObject> },
}

#[derive(Clone)]
struct Node {
    name: String,
    parent: u64,
    kind: NodeKind,
    mtime: SystemTime,
}

/// Inode table built from one collection
pub(crate) struct FileTree {
    generation: u64,
    nodes: HashMap<u64, Node>,
}

impl FileTree {
    fn empty() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            Node {
                name: String::new(),
                parent: ROOT_INODE,
                kind: NodeKind::Directory {
                    children: Vec::new(),
                },
                mtime: SystemTime::now(),
            },
        );
        Self {
            generation: 0,
            nodes,
        }
    }

    /// Lay out descriptors as a tree, creating missing parent directories
    pub(crate) fn build(collection: &VirtualFileCollection) -> Self {
        let mut tree = Self::empty();
        tree.generation = collection.generation();
        let mut next_inode = ROOT_INODE + 1;

        for (descriptor, stream) in collection.descriptors().iter().zip(collection.streams()) {
            let components: Vec<&str> = descriptor.components().collect();
            let Some((leaf, dirs)) = components.split_last() else {
                warn!("Skipping descriptor with empty name");
                continue;
            };
            let mtime = descriptor
                .last_write_time
                .map_or_else(SystemTime::now, SystemTime::from);

            let mut parent = ROOT_INODE;
            for dir in dirs {
                parent = match tree.child(parent, dir) {
                    Some(ino) => ino,
                    None => tree.insert_dir(&mut next_inode, parent, dir, mtime),
                };
            }

            if descriptor.is_directory() {
                if tree.child(parent, leaf).is_none() {
                    tree.insert_dir(&mut next_inode, parent, leaf, mtime);
                }
            } else if tree.child(parent, leaf).is_none() {
                let ino = next_inode;
                next_inode += 1;
                tree.nodes.insert(
                    ino,
                    Node {
                        name: (*leaf).to_string(),
                        parent,
                        kind: NodeKind::File {
                            stream: Arc::clone(stream),
                        },
                        mtime,
                    },
                );
                tree.link(parent, ino);
            } else {
                debug!("Duplicate entry '{}' ignored", descriptor.name);
            }
        }

        debug!(
            "Built FUSE tree with {} node(s) from collection gen {}",
            tree.nodes.len(),
            tree.generation
        );
        tree
    }

    fn insert_dir(&mut self, next_inode: &mut u64, parent: u64, name: &str, mtime: SystemTime) -> u64 {
        let ino = *next_inode;
        *next_inode += 1;
        self.nodes.insert(
            ino,
            Node {
                name: name.to_string(),
                parent,
                kind: NodeKind::Directory {
                    children: Vec::new(),
                },
                mtime,
            },
        );
        self.link(parent, ino);
        ino
    }

    fn link(&mut self, parent: u64, child: u64) {
        if let Some(Node {
            kind: NodeKind::Directory { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.push(child);
        }
    }

    pub(crate) fn child(&self, parent: u64, name: &str) -> Option<u64> {
        match &self.nodes.get(&parent)?.kind {
            NodeKind::Directory { children } => children
                .iter()
                .copied()
                .find(|ino| self.nodes.get(ino).is_some_and(|n| n.name == name)),
            NodeKind::File { .. } => None,
        }
    }

    /// `(inode, kind, name)` of a directory's entries, `.` and `..` first
    pub(crate) fn entries(&self, ino: u64) -> Option<Vec<(u64, FileType, String)>> {
        let node = self.nodes.get(&ino)?;
        let NodeKind::Directory { children } = &node.kind else {
            return None;
        };
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (node.parent, FileType::Directory, "..".to_string()),
        ];
        for child in children {
            if let Some(n) = self.nodes.get(child) {
                entries.push((*child, file_type(&n.kind), n.name.clone()));
            }
        }
        Some(entries)
    }

    fn stream(&self, ino: u64) -> Option<Arc<VirtualFileObject>> {
        match &self.nodes.get(&ino)?.kind {
            NodeKind::File { stream } => Some(Arc::clone(stream)),
            NodeKind::Directory { .. } => None,
        }
    }

    fn attr(&self, ino: u64) -> Option<FileAttr> {
        let node = self.nodes.get(&ino)?;
        let (kind, size, perm, nlink) = match &node.kind {
            NodeKind::Directory { .. } => (FileType::Directory, 0, 0o555, 2),
            NodeKind::File { stream } => {
                let size = match stream.known_size() {
                    Some(size) => size,
                    None => stream.size().unwrap_or_else(|e| {
                        warn!("Size of '{}' unavailable: {}", node.name, e);
                        0
                    }),
                };
                (FileType::RegularFile, size, 0o444, 1)
            }
        };
        Some(FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: node.mtime,
            mtime: node.mtime,
            ctime: node.mtime,
            crtime: node.mtime,
            kind,
            perm,
            nlink,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: 512,
            flags: 0,
        })
    }
}

fn file_type(kind: &NodeKind) -> FileType {
    match kind {
        NodeKind::Directory { .. } => FileType::Directory,
        NodeKind::File { .. } => FileType::RegularFile,
    }
}

/// Read-only filesystem following the clipboard's file collection
pub struct ClipboardFs {
    os: Arc<dyn OsClipboard>,
    chunk_size: u32,
    tree: FileTree,
    source: Option<Arc<VirtualFileCollection>>,
}

impl ClipboardFs {
    pub fn new(os: Arc<dyn OsClipboard>, chunk_size: u32) -> Self {
        Self {
            os,
            chunk_size: chunk_size.max(1),
            tree: FileTree::empty(),
            source: None,
        }
    }

    /// Rebuild the tree if the clipboard now holds another collection
    fn refresh(&mut self) {
        let current = self.os.file_collection().filter(|c| c.is_valid());
        let unchanged = match (&self.source, &current) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.tree = match &current {
            Some(collection) => FileTree::build(collection),
            None => FileTree::empty(),
        };
        self.source = current;
    }
}

impl Filesystem for ClipboardFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.refresh();
        let found = name
            .to_str()
            .and_then(|n| self.tree.child(parent, n))
            .and_then(|ino| self.tree.attr(ino));
        match found {
            Some(attr) => {
                trace!("lookup: {:?} -> inode {}", name, attr.ino);
                reply.entry(&TTL, &attr, 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        self.refresh();
        match self.tree.attr(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_WRONLY != 0 || flags & libc::O_RDWR != 0 {
            reply.error(libc::EACCES);
            return;
        }
        self.refresh();
        if self.tree.stream(ino).is_some() {
            reply.opened(ino, 0);
        } else {
            reply.error(libc::ENOENT);
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(stream) = self.tree.stream(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let len = size.min(self.chunk_size) as usize;
        debug!("FUSE read: '{}' offset={} size={}", stream.name(), offset, len);

        match stream.read_at(offset.max(0) as u64, len) {
            Ok(data) => reply.data(&data),
            Err(ClipboardError::Aborted) => {
                debug!("FUSE read of '{}' after the clipboard changed", stream.name());
                reply.error(libc::ENOENT);
            }
            Err(e) => {
                warn!("FUSE read of '{}' failed: {}", stream.name(), e);
                reply.error(libc::EIO);
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        self.refresh();
        let Some(entries) = self.tree.entries(ino) else {
            reply.error(libc::ENOTDIR);
            return;
        };
        for (i, (inode, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            // true means the buffer is full
            if reply.add(*inode, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        self.refresh();
        if self.tree.entries(ino).is_some() {
            reply.opened(0, 0);
        } else {
            reply.error(libc::ENOTDIR);
        }
    }
}

/// Wrapper for BackgroundSession that implements Send + Sync
///
/// The session only holds the join handle of fuser's background thread and
/// the unmount guard; all filesystem state lives on that thread.
struct SendableSession(fuser::BackgroundSession);

// SAFETY: the background session is only dropped (unmounted), never used
// concurrently from several threads.
unsafe impl Send for SendableSession {}
unsafe impl Sync for SendableSession {}

/// Manages the FUSE mount lifecycle
pub struct FuseManager {
    mount_point: PathBuf,
    session: Option<SendableSession>,
}

impl FuseManager {
    pub fn new(mount_point: Option<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.unwrap_or_else(get_mount_point),
            session: None,
        }
    }

    /// Mount the filesystem for `os`'s file collection
    ///
    /// Tries with `allow_other` first so file managers of other users can
    /// browse it, then falls back to a user-only mount.
    pub fn mount(&mut self, os: Arc<dyn OsClipboard>, chunk_size: u32) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.mount_point)?;
        info!("Mounting clipboard filesystem at {:?}", self.mount_point);

        let options_with_allow_other = vec![
            MountOption::RO,
            MountOption::FSName(MOUNT_DIR_NAME.to_string()),
            MountOption::AllowOther,
            MountOption::AutoUnmount,
        ];
        match fuser::spawn_mount2(
            ClipboardFs::new(Arc::clone(&os), chunk_size),
            &self.mount_point,
            &options_with_allow_other,
        ) {
            Ok(session) => {
                self.session = Some(SendableSession(session));
                info!("Clipboard filesystem mounted (allow_other enabled)");
                return Ok(());
            }
            Err(e) => debug!("Mount with allow_other failed ({}), retrying without it", e),
        }

        let options_user_only = vec![
            MountOption::RO,
            MountOption::FSName(MOUNT_DIR_NAME.to_string()),
            MountOption::AutoUnmount,
        ];
        let session = fuser::spawn_mount2(
            ClipboardFs::new(os, chunk_size),
            &self.mount_point,
            &options_user_only,
        )?;
        self.session = Some(SendableSession(session));
        info!("Clipboard filesystem mounted (user-only mode)");
        Ok(())
    }

    pub fn unmount(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Unmounting clipboard filesystem");
            drop(session);
        }
        // Fails harmlessly if something else lives there
        let _ = std::fs::remove_dir(&self.mount_point);
    }

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    pub fn mount_point(&self) -> &PathBuf {
        &self.mount_point
    }
}

impl Drop for FuseManager {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Default mount point under the user's runtime directory
pub fn get_mount_point() -> PathBuf {
    let runtime_dir = dirs::runtime_dir().unwrap_or_else(|| {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{}", uid))
    });
    runtime_dir.join(MOUNT_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::formats::FileDescriptor;
    use crate::clipboard::stream::{CollectionFormats, FileContentsSource, MockFileContentsSource};
    use bytes::Bytes;

    fn collection(
        source: &Arc<dyn FileContentsSource>,
        descriptors: Vec<FileDescriptor>,
    ) -> Arc<VirtualFileCollection> {
        VirtualFileCollection::new(
            1,
            4,
            CollectionFormats {
                file_descriptor: 0xC000,
                file_contents: 0xC001,
            },
            Bytes::new(),
            descriptors,
            Arc::downgrade(source),
        )
    }

    #[test]
    fn test_get_mount_point() {
        assert!(get_mount_point().ends_with(MOUNT_DIR_NAME));
    }

    #[test]
    fn test_tree_layout() {
        let source: Arc<dyn FileContentsSource> = Arc::new(MockFileContentsSource::new());
        let c = collection(
            &source,
            vec![
                FileDescriptor::file("notes.txt", 11),
                FileDescriptor::directory("photos"),
                FileDescriptor::file("photos\\a.jpg", 100),
                FileDescriptor::file("photos\\raw\\b.cr2", 3),
            ],
        );
        let tree = FileTree::build(&c);
        assert_eq!(tree.generation, 4);

        let notes = tree.child(ROOT_INODE, "notes.txt").unwrap();
        let photos = tree.child(ROOT_INODE, "photos").unwrap();
        let raw = tree.child(photos, "raw").unwrap();
        let cr2 = tree.child(raw, "b.cr2").unwrap();

        assert_eq!(tree.attr(notes).unwrap().size, 11);
        assert_eq!(tree.attr(notes).unwrap().kind, FileType::RegularFile);
        assert_eq!(tree.attr(photos).unwrap().kind, FileType::Directory);
        assert_eq!(tree.attr(cr2).unwrap().perm, 0o444);

        let names: Vec<String> = tree
            .entries(photos)
            .unwrap()
            .into_iter()
            .map(|(_, _, name)| name)
            .collect();
        assert_eq!(names, vec![".", "..", "a.jpg", "raw"]);
        assert!(tree.entries(notes).is_none());
        assert!(tree.child(notes, "x").is_none());
    }

    #[test]
    fn test_unknown_size_is_fetched_for_attr() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size()
            .times(1)
            .returning(|_, _| Ok(321));
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let mut descriptor = FileDescriptor::file("big.iso", 0);
        descriptor.size = None;
        let c = collection(&source, vec![descriptor]);

        let tree = FileTree::build(&c);
        let ino = tree.child(ROOT_INODE, "big.iso").unwrap();
        assert_eq!(tree.attr(ino).unwrap().size, 321);
        assert_eq!(tree.attr(ino).unwrap().blocks, 1);
    }
}
