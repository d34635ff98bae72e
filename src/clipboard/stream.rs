//! Virtual files backed by the remote peer
//!
//! A [`VirtualFileCollection`] is what the local side hands to the OS when the
//! peer announces files. It answers "how many files, what are they called"
//! from the FILEGROUPDESCRIPTORW fetched once, and exposes one
//! [`VirtualFileObject`] per entry. Bytes are only fetched when a stream is
//! read, one FILECONTENTS round trip per chunk.
//!
//! # Lifetime
//!
//! The bridge owns the current collection. Streams keep a weak reference to
//! it; once the collection is replaced, emptied, or dropped, every stream
//! answers [`ClipboardError::Aborted`] instead of reading stale state.

use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::formats::FileDescriptor;

/// Issues FILECONTENTS requests on behalf of virtual files
#[cfg_attr(test, mockall::automock)]
pub trait FileContentsSource: Send + Sync {
    /// FILECONTENTS_REQUEST(SIZE)
    fn request_size(&self, conn_id: u32, list_index: u32) -> Result<u64>;

    /// FILECONTENTS_REQUEST(RANGE); may return fewer bytes than asked for
    fn request_range(&self, conn_id: u32, list_index: u32, position: u64, len: u32)
        -> Result<Bytes>;
}

/// Data handed out by [`DataObject::get_data`]
#[derive(Clone)]
pub enum DataMedium {
    Bytes(Bytes),
    Stream(Arc<VirtualFileObject>),
}

impl std::fmt::Debug for DataMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataMedium::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            DataMedium::Stream(s) => write!(f, "Stream({})", s.index()),
        }
    }
}

/// Composite clipboard object offered to the OS
pub trait DataObject: Send + Sync {
    /// Local format ids this object can render
    fn enum_formats(&self) -> Vec<u32>;

    fn query_format(&self, format_id: u32) -> bool {
        self.enum_formats().contains(&format_id)
    }

    /// Fetch data for `format_id`; `lindex` selects a file for stream formats
    fn get_data(&self, format_id: u32, lindex: Option<usize>) -> Result<DataMedium>;
}

/// Metadata returned by [`FileStream::stat`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
    pub last_write_time: Option<DateTime<Utc>>,
}

/// Seekable read-only stream
pub trait FileStream: Send + Sync {
    /// Read into `buf`, returning 0 at end of stream
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    fn seek(&self, pos: SeekFrom) -> Result<u64>;

    fn stat(&self) -> Result<FileStat>;
}

/// Local format ids under which a collection is offered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionFormats {
    pub file_descriptor: u32,
    pub file_contents: u32,
}

#[derive(Debug, Default)]
struct Cursor {
    offset: u64,
    size: Option<u64>,
}

/// One remote file, fetched lazily
pub struct VirtualFileObject {
    index: u32,
    descriptor: FileDescriptor,
    collection: Weak<VirtualFileCollection>,
    cursor: Mutex<Cursor>,
}

impl VirtualFileObject {
    fn new(index: u32, descriptor: FileDescriptor, collection: Weak<VirtualFileCollection>) -> Self {
        let size = if descriptor.is_directory() {
            Some(0)
        } else {
            descriptor.size
        };
        Self {
            index,
            descriptor,
            collection,
            cursor: Mutex::new(Cursor { offset: 0, size }),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_directory(&self) -> bool {
        self.descriptor.is_directory()
    }

    pub fn offset(&self) -> u64 {
        self.cursor.lock().offset
    }

    /// Size if it is already known, without asking the peer
    pub fn known_size(&self) -> Option<u64> {
        self.cursor.lock().size
    }

    /// Size of the remote file, asking the peer on first use
    pub fn size(&self) -> Result<u64> {
        let mut cursor = self.cursor.lock();
        self.ensure_size(&mut cursor)
    }

    /// Positional read that leaves the stream offset untouched
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let mut cursor = self.cursor.lock();
        let size = self.ensure_size(&mut cursor)?;
        if offset >= size || len == 0 {
            return Ok(Bytes::new());
        }
        let want = (size - offset).min(len as u64).min(u32::MAX as u64) as u32;
        self.fetch(offset, want)
    }

    /// Adapter implementing `std::io::Read` and `std::io::Seek`
    pub fn reader(self: &Arc<Self>) -> VirtualFileReader {
        VirtualFileReader {
            stream: Arc::clone(self),
        }
    }

    fn out_of_bounds(&self, offset: u64, size: u64) -> ClipboardError {
        ClipboardError::InvalidData(format!(
            "offset {} outside 0..={} for '{}'",
            offset,
            size,
            self.name()
        ))
    }

    fn owner(&self) -> Result<Arc<VirtualFileCollection>> {
        let collection = self.collection.upgrade().ok_or(ClipboardError::Aborted)?;
        if !collection.is_valid() {
            return Err(ClipboardError::Aborted);
        }
        collection.check_process()?;
        Ok(collection)
    }

    fn ensure_size(&self, cursor: &mut Cursor) -> Result<u64> {
        if let Some(size) = cursor.size {
            return Ok(size);
        }
        let owner = self.owner()?;
        let source = owner.source()?;
        let size = source.request_size(owner.conn_id, self.index)?;
        // The collection may have been replaced while we waited
        if !owner.is_valid() {
            return Err(ClipboardError::Aborted);
        }
        debug!("Virtual file {} '{}' size {}", self.index, self.name(), size);
        cursor.size = Some(size);
        Ok(size)
    }

    fn fetch(&self, offset: u64, len: u32) -> Result<Bytes> {
        let owner = self.owner()?;
        let source = owner.source()?;
        let data = source.request_range(owner.conn_id, self.index, offset, len)?;
        if !owner.is_valid() {
            return Err(ClipboardError::Aborted);
        }
        trace!(
            "Virtual file {} read {} of {} bytes at {}",
            self.index,
            data.len(),
            len,
            offset
        );
        Ok(data.slice(..data.len().min(len as usize)))
    }
}

/// Failed round trips other than an abort end the stream
fn end_of_stream_on_failure(index: u32, result: Result<usize>) -> Result<usize> {
    match result {
        Err(ClipboardError::Aborted) => Err(ClipboardError::Aborted),
        Err(e) => {
            warn!("Virtual file {} read failed, treating as end of stream: {}", index, e);
            Ok(0)
        }
        ok => ok,
    }
}

impl FileStream for VirtualFileObject {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.is_directory() || buf.is_empty() {
            return Ok(0);
        }
        let mut cursor = self.cursor.lock();

        let size = match self.ensure_size(&mut cursor) {
            Ok(size) => size,
            Err(e) => return end_of_stream_on_failure(self.index, Err(e)),
        };
        // Seeks made before the size was known are checked here
        if cursor.offset > size {
            return Err(self.out_of_bounds(cursor.offset, size));
        }

        let result = (|| {
            if cursor.offset == size {
                return Ok(0);
            }
            let want = (size - cursor.offset)
                .min(buf.len() as u64)
                .min(u32::MAX as u64) as u32;
            let data = self.fetch(cursor.offset, want)?;
            buf[..data.len()].copy_from_slice(&data);
            cursor.offset += data.len() as u64;
            Ok(data.len())
        })();

        end_of_stream_on_failure(self.index, result)
    }

    /// Moves the offset only; the size is fetched for `SeekFrom::End` alone
    fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let mut cursor = self.cursor.lock();
        let (target, size) = match pos {
            SeekFrom::Start(n) => (Some(n), cursor.size),
            SeekFrom::Current(delta) => (cursor.offset.checked_add_signed(delta), cursor.size),
            SeekFrom::End(delta) => {
                let size = self.ensure_size(&mut cursor)?;
                (size.checked_add_signed(delta), Some(size))
            }
        };
        match (target, size) {
            (Some(offset), Some(size)) if offset > size => Err(self.out_of_bounds(offset, size)),
            (Some(offset), _) => {
                cursor.offset = offset;
                Ok(offset)
            }
            (None, _) => Err(ClipboardError::InvalidData(format!(
                "seek {:?} before the start of '{}'",
                pos,
                self.name()
            ))),
        }
    }

    fn stat(&self) -> Result<FileStat> {
        Ok(FileStat {
            name: self.descriptor.name.clone(),
            size: self.size()?,
            is_directory: self.is_directory(),
            last_write_time: self.descriptor.last_write_time,
        })
    }
}

/// `std::io` view of a [`VirtualFileObject`]
pub struct VirtualFileReader {
    stream: Arc<VirtualFileObject>,
}

fn to_io_error(error: ClipboardError) -> io::Error {
    match error {
        ClipboardError::Aborted => io::Error::new(io::ErrorKind::ConnectionAborted, error),
        ClipboardError::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, error),
        ClipboardError::InvalidData(_) => io::Error::new(io::ErrorKind::InvalidInput, error),
        ClipboardError::Io(e) => e,
        other => io::Error::other(other),
    }
}

impl io::Read for VirtualFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileStream::read(self.stream.as_ref(), buf).map_err(to_io_error)
    }
}

impl io::Seek for VirtualFileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        FileStream::seek(self.stream.as_ref(), pos).map_err(to_io_error)
    }
}

/// Files announced by the peer, exposed to the OS
pub struct VirtualFileCollection {
    conn_id: u32,
    generation: u64,
    process_id: u32,
    formats: CollectionFormats,
    file_group: Bytes,
    descriptors: Vec<FileDescriptor>,
    streams: Vec<Arc<VirtualFileObject>>,
    valid: AtomicBool,
    source: Weak<dyn FileContentsSource>,
}

impl std::fmt::Debug for VirtualFileCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileCollection")
            .field("conn_id", &self.conn_id)
            .field("generation", &self.generation)
            .field("files", &self.descriptors.len())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl VirtualFileCollection {
    /// Build a collection from a parsed FILEGROUPDESCRIPTORW
    pub fn new(
        conn_id: u32,
        generation: u64,
        formats: CollectionFormats,
        file_group: Bytes,
        descriptors: Vec<FileDescriptor>,
        source: Weak<dyn FileContentsSource>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let streams = descriptors
                .iter()
                .enumerate()
                .map(|(i, d)| Arc::new(VirtualFileObject::new(i as u32, d.clone(), weak.clone())))
                .collect();
            Self {
                conn_id,
                generation,
                process_id: std::process::id(),
                formats,
                file_group,
                descriptors,
                streams,
                valid: AtomicBool::new(true),
                source,
            }
        })
    }

    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn formats(&self) -> CollectionFormats {
        self.formats
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[FileDescriptor] {
        &self.descriptors
    }

    pub fn stream(&self, index: usize) -> Result<Arc<VirtualFileObject>> {
        self.check_access()?;
        self.streams.get(index).cloned().ok_or_else(|| {
            ClipboardError::InvalidData(format!(
                "file index {} out of range ({} files)",
                index,
                self.streams.len()
            ))
        })
    }

    pub fn streams(&self) -> &[Arc<VirtualFileObject>] {
        &self.streams
    }

    /// Detach every stream; later reads return `Aborted`
    pub fn invalidate(&self) {
        if self.valid.swap(false, Ordering::SeqCst) {
            debug!(
                "Invalidated virtual file collection gen {} ({} files, conn {})",
                self.generation,
                self.descriptors.len(),
                self.conn_id
            );
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Whether this process created the collection
    pub fn is_process_bound(&self) -> bool {
        self.process_id == std::process::id()
    }

    fn check_process(&self) -> Result<()> {
        if !self.is_process_bound() {
            return Err(ClipboardError::StateInconsistent(format!(
                "collection belongs to process {}",
                self.process_id
            )));
        }
        Ok(())
    }

    fn check_access(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(ClipboardError::Aborted);
        }
        self.check_process()
    }

    fn source(&self) -> Result<Arc<dyn FileContentsSource>> {
        self.source.upgrade().ok_or(ClipboardError::Aborted)
    }
}

impl DataObject for VirtualFileCollection {
    fn enum_formats(&self) -> Vec<u32> {
        vec![self.formats.file_descriptor, self.formats.file_contents]
    }

    fn get_data(&self, format_id: u32, lindex: Option<usize>) -> Result<DataMedium> {
        self.check_access()?;
        if format_id == self.formats.file_descriptor {
            Ok(DataMedium::Bytes(self.file_group.clone()))
        } else if format_id == self.formats.file_contents {
            let index = lindex.ok_or_else(|| {
                ClipboardError::InvalidData("FileContents requires a list index".to_string())
            })?;
            Ok(DataMedium::Stream(self.stream(index)?))
        } else {
            Err(ClipboardError::UnknownFormat(format_id))
        }
    }
}

impl Drop for VirtualFileCollection {
    fn drop(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek};

    const FORMATS: CollectionFormats = CollectionFormats {
        file_descriptor: 0xC001,
        file_contents: 0xC002,
    };

    /// Remote file served by the mock source
    const REMOTE: &[u8] = b"0123456789abcdef";

    fn serving_mock() -> MockFileContentsSource {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size()
            .returning(|_, _| Ok(REMOTE.len() as u64));
        mock.expect_request_range()
            .returning(|_, _, position, len| {
                let start = (position as usize).min(REMOTE.len());
                let end = (start + len as usize).min(REMOTE.len());
                Ok(Bytes::copy_from_slice(&REMOTE[start..end]))
            });
        mock
    }

    fn collection(
        source: &Arc<dyn FileContentsSource>,
        descriptors: Vec<FileDescriptor>,
    ) -> Arc<VirtualFileCollection> {
        VirtualFileCollection::new(
            7,
            1,
            FORMATS,
            Bytes::from_static(b"blob"),
            descriptors,
            Arc::downgrade(source),
        )
    }

    fn unsized_file(name: &str) -> FileDescriptor {
        let mut d = FileDescriptor::file(name, 0);
        d.size = None;
        d
    }

    #[test]
    fn test_size_fetched_lazily_once() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size()
            .withf(|conn, index| *conn == 7 && *index == 0)
            .times(1)
            .returning(|_, _| Ok(42));
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let c = collection(&source, vec![unsized_file("a.bin")]);

        let stream = c.stream(0).unwrap();
        assert_eq!(stream.known_size(), None);
        assert_eq!(stream.size().unwrap(), 42);
        assert_eq!(stream.size().unwrap(), 42);
    }

    #[test]
    fn test_known_size_skips_request() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size().times(0);
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let c = collection(&source, vec![FileDescriptor::file("a.bin", 9)]);
        assert_eq!(c.stream(0).unwrap().size().unwrap(), 9);
    }

    #[test]
    fn test_short_read_then_clean_eof() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(&source, vec![unsized_file("digits.txt")]);
        let stream = c.stream(0).unwrap();

        stream.seek(SeekFrom::Start(12)).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"cdef");
        assert_eq!(stream.offset(), 16);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_io_reader_reads_whole_file() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(&source, vec![unsized_file("digits.txt")]);
        let mut reader = c.stream(0).unwrap().reader();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, REMOTE);

        assert_eq!(reader.seek(SeekFrom::End(-6)).unwrap(), 10);
        let mut tail = String::new();
        reader.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "abcdef");
    }

    #[test]
    fn test_seek_bounds() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(&source, vec![FileDescriptor::file("x", 16)]);
        let stream = c.stream(0).unwrap();

        assert_eq!(stream.seek(SeekFrom::End(0)).unwrap(), 16);
        assert_eq!(stream.seek(SeekFrom::Current(-6)).unwrap(), 10);
        assert!(stream.seek(SeekFrom::Start(17)).is_err());
        assert!(stream.seek(SeekFrom::Current(-11)).is_err());
        assert_eq!(stream.offset(), 10);
    }

    #[test]
    fn test_seek_defers_size_request_to_read() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size()
            .times(1)
            .returning(|_, _| Ok(REMOTE.len() as u64));
        mock.expect_request_range()
            .returning(|_, _, position, len| {
                let start = (position as usize).min(REMOTE.len());
                let end = (start + len as usize).min(REMOTE.len());
                Ok(Bytes::copy_from_slice(&REMOTE[start..end]))
            });
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let c = collection(&source, vec![unsized_file("digits.txt")]);
        let stream = c.stream(0).unwrap();

        assert_eq!(stream.seek(SeekFrom::Start(8)).unwrap(), 8);
        assert_eq!(stream.seek(SeekFrom::Current(2)).unwrap(), 10);
        assert_eq!(stream.known_size(), None);

        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(stream.known_size(), Some(16));
    }

    #[test]
    fn test_seek_past_unknown_size_fails_on_read() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size().returning(|_, _| Ok(4));
        mock.expect_request_range().times(0);
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let c = collection(&source, vec![unsized_file("tiny")]);
        let stream = c.stream(0).unwrap();

        assert_eq!(stream.seek(SeekFrom::Start(40)).unwrap(), 40);
        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read(&mut buf),
            Err(ClipboardError::InvalidData(_))
        ));
        // Bound is known now, so the seek itself is refused
        assert!(stream.seek(SeekFrom::Start(5)).is_err());
    }

    #[test]
    fn test_collection_debug_summary() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(&source, vec![FileDescriptor::file("a", 1)]);
        let text = format!("{c:?}");
        assert!(text.contains("conn_id: 7"));
        assert!(text.contains("files: 1"));
        assert!(text.contains("valid: true"));
    }

    #[test]
    fn test_read_at_does_not_move_offset() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(&source, vec![unsized_file("digits.txt")]);
        let stream = c.stream(0).unwrap();

        assert_eq!(&stream.read_at(4, 3).unwrap()[..], b"456");
        assert!(stream.read_at(16, 3).unwrap().is_empty());
        assert_eq!(stream.offset(), 0);
    }

    #[test]
    fn test_failed_range_is_end_of_stream() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_range()
            .returning(|_, _, _, _| Err(ClipboardError::Timeout(100)));
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let c = collection(&source, vec![FileDescriptor::file("x", 16)]);

        let mut buf = [0u8; 4];
        assert_eq!(c.stream(0).unwrap().read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_invalidated_collection_aborts_streams() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(&source, vec![unsized_file("digits.txt")]);
        let stream = c.stream(0).unwrap();

        c.invalidate();
        let mut buf = [0u8; 4];
        assert!(matches!(stream.read(&mut buf), Err(ClipboardError::Aborted)));
        assert!(matches!(stream.size(), Err(ClipboardError::Aborted)));
        assert!(matches!(c.stream(0), Err(ClipboardError::Aborted)));
        assert!(matches!(
            c.get_data(FORMATS.file_descriptor, None),
            Err(ClipboardError::Aborted)
        ));
    }

    #[test]
    fn test_dropped_collection_aborts_streams() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let stream = {
            let c = collection(&source, vec![unsized_file("digits.txt")]);
            c.stream(0).unwrap()
        };
        let mut buf = [0u8; 4];
        assert!(matches!(stream.read(&mut buf), Err(ClipboardError::Aborted)));
    }

    #[test]
    fn test_directory_entries_never_request() {
        let mut mock = MockFileContentsSource::new();
        mock.expect_request_size().times(0);
        mock.expect_request_range().times(0);
        let source: Arc<dyn FileContentsSource> = Arc::new(mock);
        let c = collection(&source, vec![FileDescriptor::directory("photos")]);

        let stream = c.stream(0).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        let stat = stream.stat().unwrap();
        assert!(stat.is_directory);
        assert_eq!(stat.size, 0);
    }

    #[test]
    fn test_data_object_formats() {
        let source: Arc<dyn FileContentsSource> = Arc::new(serving_mock());
        let c = collection(
            &source,
            vec![FileDescriptor::file("a", 1), FileDescriptor::file("b", 2)],
        );

        assert_eq!(c.enum_formats(), vec![0xC001, 0xC002]);
        assert!(c.query_format(0xC002));
        assert!(!c.query_format(13));
        assert!(c.is_process_bound());

        match c.get_data(FORMATS.file_descriptor, None).unwrap() {
            DataMedium::Bytes(b) => assert_eq!(&b[..], b"blob"),
            other => panic!("unexpected {other:?}"),
        }
        match c.get_data(FORMATS.file_contents, Some(1)).unwrap() {
            DataMedium::Stream(s) => assert_eq!(s.name(), "b"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.get_data(FORMATS.file_contents, None).is_err());
        assert!(c.get_data(FORMATS.file_contents, Some(2)).is_err());
        assert!(matches!(
            c.get_data(13, None),
            Err(ClipboardError::UnknownFormat(13))
        ));
    }
}
