//! Clipboard Formats
//!
//! Well-known format identifiers, the remote-to-local [`FormatMap`], and the
//! FILEGROUPDESCRIPTORW codec used for file transfers.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use enumflags2::{bitflags, BitFlags};
use tracing::{debug, warn};

use crate::clipboard::error::{ClipboardError, Result};
use crate::protocol::FormatListEntry;

/// Clipboard format IDs (Windows clipboard formats)
pub mod format_id {
    /// Text format (ANSI)
    pub const CF_TEXT: u32 = 1;
    /// Bitmap format
    pub const CF_BITMAP: u32 = 2;
    /// Device-independent bitmap
    pub const CF_DIB: u32 = 8;
    /// Unicode text format
    pub const CF_UNICODETEXT: u32 = 13;
    /// File drop format
    pub const CF_HDROP: u32 = 15;
    /// Locale identifier
    pub const CF_LOCALE: u32 = 16;
    /// Device-independent bitmap with color space
    pub const CF_DIBV5: u32 = 17;
    /// Start of registered (named) formats
    pub const CF_CUSTOM_START: u32 = 0xC000;
}

/// Registered format names with protocol meaning
pub mod format_name {
    /// File descriptor table announcing a file transfer
    pub const FILE_DESCRIPTOR_W: &str = "FileGroupDescriptorW";
    /// Companion format through which file bytes are streamed
    pub const FILE_CONTENTS: &str = "FileContents";
    pub const HTML: &str = "HTML Format";
    pub const PNG: &str = "PNG";
    pub const RTF: &str = "Rich Text Format";
    pub const PREFERRED_DROP_EFFECT: &str = "Preferred DropEffect";
}

use format_id::CF_HDROP;

/// Resolves registered format names to local ids
pub trait FormatRegistry {
    /// Return the local id for `name`, registering it on first use
    fn register_format(&self, name: &str) -> u32;

    /// Name of a registered local format
    fn format_name(&self, id: u32) -> Option<String>;
}

/// One row of the format map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatEntry {
    pub remote_id: u32,
    pub local_id: u32,
    pub name: Option<String>,
}

/// Remote-to-local format table
///
/// Replaced wholesale on every inbound format list.
#[derive(Debug, Default)]
pub struct FormatMap {
    entries: Vec<FormatEntry>,
    generation: u64,
}

impl FormatMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with the peer's latest format list
    pub fn rebuild<R>(&mut self, remote: &[FormatListEntry], registry: &R)
    where
        R: FormatRegistry + ?Sized,
    {
        self.clear();
        self.generation += 1;

        for format in remote {
            if self.entries.iter().any(|e| e.remote_id == format.id) {
                debug!("Ignoring duplicate remote format id {}", format.id);
                continue;
            }
            let local_id = match format.name.as_deref() {
                Some(name) => registry.register_format(name),
                None => format.id,
            };
            self.entries.push(FormatEntry {
                remote_id: format.id,
                local_id,
                name: format.name.clone(),
            });
        }

        debug!(
            "Format map generation {}: {} entries",
            self.generation,
            self.entries.len()
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remote id for a local id, identity if unmapped
    pub fn local_to_remote(&self, local_id: u32) -> u32 {
        self.entries
            .iter()
            .find(|e| e.local_id == local_id)
            .map_or(local_id, |e| e.remote_id)
    }

    /// Local id for a remote id, identity if unmapped
    pub fn remote_to_local(&self, remote_id: u32) -> u32 {
        self.entries
            .iter()
            .find(|e| e.remote_id == remote_id)
            .map_or(remote_id, |e| e.local_id)
    }

    pub fn contains_file_format(&self) -> bool {
        self.file_descriptor_entry().is_some()
    }

    pub fn file_descriptor_entry(&self) -> Option<&FormatEntry> {
        self.entries
            .iter()
            .find(|e| e.name.as_deref() == Some(format_name::FILE_DESCRIPTOR_W))
    }

    /// Local ids worth rendering on demand
    ///
    /// File formats only make sense through the virtual file path.
    pub fn delayed_render_ids(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|e| {
                !matches!(
                    e.name.as_deref(),
                    Some(format_name::FILE_DESCRIPTOR_W) | Some(format_name::FILE_CONTENTS)
                ) && e.local_id != CF_HDROP
            })
            .map(|e| e.local_id)
            .collect()
    }

    pub fn entries(&self) -> &[FormatEntry] {
        &self.entries
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// File Descriptors
// =============================================================================

/// Size of one FILEDESCRIPTORW record
pub const FILE_DESCRIPTOR_LEN: usize = 592;

/// UTF-16 units in the cFileName field, including the terminator
const FILE_NAME_UNITS: usize = 260;

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// FILEDESCRIPTORW dwFlags
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFlag {
    Clsid = 0x0000_0001,
    SizePoint = 0x0000_0002,
    Attributes = 0x0000_0004,
    CreateTime = 0x0000_0008,
    AccessTime = 0x0000_0010,
    WritesTime = 0x0000_0020,
    FileSize = 0x0000_0040,
    ProgressUi = 0x0000_4000,
    LinkUi = 0x0000_8000,
}

/// Windows FILE_ATTRIBUTE_* bits carried in descriptors
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAttribute {
    ReadOnly = 0x0000_0001,
    Hidden = 0x0000_0002,
    System = 0x0000_0004,
    Directory = 0x0000_0010,
    Archive = 0x0000_0020,
    Normal = 0x0000_0080,
}

/// Metadata for one offered file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path relative to the drop root, `\` separated
    pub name: String,
    /// Size in bytes, `None` when the sender left it out
    pub size: Option<u64>,
    pub attributes: BitFlags<FileAttribute>,
    pub last_write_time: Option<DateTime<Utc>>,
}

impl FileDescriptor {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
            attributes: FileAttribute::Normal.into(),
            last_write_time: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: Some(0),
            attributes: FileAttribute::Directory.into(),
            last_write_time: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttribute::Directory)
    }

    /// Path components, accepting either separator
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.name
            .split(['\\', '/'])
            .filter(|c| !c.is_empty() && *c != "." && *c != "..")
    }

    /// Parse a single FILEDESCRIPTORW record
    ///
    /// ```text
    /// Offset | Size | Field
    /// -------|------|------
    /// 0      | 4    | dwFlags
    /// 4      | 32   | clsid, sizel, pointl (unused)
    /// 36     | 4    | dwFileAttributes
    /// 40     | 8    | ftCreationTime
    /// 48     | 8    | ftLastAccessTime
    /// 56     | 8    | ftLastWriteTime
    /// 64     | 8    | nFileSizeHigh, nFileSizeLow
    /// 72     | 520  | cFileName (UTF-16, 260 units)
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_DESCRIPTOR_LEN {
            return Err(ClipboardError::InvalidData(format!(
                "FILEDESCRIPTORW too small: {} bytes (need {})",
                data.len(),
                FILE_DESCRIPTOR_LEN
            )));
        }

        let flags: BitFlags<DescriptorFlag> = BitFlags::from_bits_truncate(read_u32(data, 0));

        let attributes = if flags.contains(DescriptorFlag::Attributes) {
            BitFlags::from_bits_truncate(read_u32(data, 36))
        } else {
            BitFlags::empty()
        };

        let last_write_time = if flags.contains(DescriptorFlag::WritesTime) {
            filetime_to_datetime(read_u64(data, 56))
        } else {
            None
        };

        let size = if flags.contains(DescriptorFlag::FileSize) {
            let high = read_u32(data, 64) as u64;
            let low = read_u32(data, 68) as u64;
            Some((high << 32) | low)
        } else {
            None
        };

        let name = crate::protocol::pdu::decode_utf16_z(&data[72..FILE_DESCRIPTOR_LEN], "file name")?;

        Ok(FileDescriptor {
            name,
            size,
            attributes,
            last_write_time,
        })
    }

    /// Append this descriptor as a FILEDESCRIPTORW record
    ///
    /// The size fields are filled in but FD_FILESIZE is left unset, so the
    /// receiver asks for the size before reading.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut flags = DescriptorFlag::Attributes | DescriptorFlag::ProgressUi;
        if self.last_write_time.is_some() {
            flags |= DescriptorFlag::WritesTime;
        }

        let start = dst.len();
        dst.put_u32_le(flags.bits());
        dst.put_bytes(0, 32);
        dst.put_u32_le(self.attributes.bits());
        dst.put_u64_le(0);
        dst.put_u64_le(0);
        dst.put_u64_le(self.last_write_time.map_or(0, datetime_to_filetime));
        let size = if self.is_directory() {
            0
        } else {
            self.size.unwrap_or(0)
        };
        dst.put_u32_le((size >> 32) as u32);
        dst.put_u32_le(size as u32);

        let units: Vec<u16> = self.name.encode_utf16().collect();
        if units.len() >= FILE_NAME_UNITS {
            warn!(
                "File name '{}' exceeds {} UTF-16 units, truncating",
                self.name,
                FILE_NAME_UNITS - 1
            );
        }
        let mut written = 0;
        for unit in units.iter().take(FILE_NAME_UNITS - 1) {
            dst.put_u16_le(*unit);
            written += 1;
        }
        dst.put_bytes(0, (FILE_NAME_UNITS - written) * 2);

        debug_assert_eq!(dst.len() - start, FILE_DESCRIPTOR_LEN);
    }
}

/// Parse a FILEGROUPDESCRIPTORW blob (count + records)
pub fn parse_file_group(data: &[u8]) -> Result<Vec<FileDescriptor>> {
    if data.len() < 4 {
        return Err(ClipboardError::InvalidData(
            "FileGroupDescriptorW too small for count".to_string(),
        ));
    }

    let count = read_u32(data, 0) as usize;
    let expected = count
        .checked_mul(FILE_DESCRIPTOR_LEN)
        .and_then(|n| n.checked_add(4))
        .ok_or_else(|| ClipboardError::InvalidData(format!("absurd descriptor count {count}")))?;
    if data.len() < expected {
        return Err(ClipboardError::InvalidData(format!(
            "FileGroupDescriptorW too small: {} bytes (need {} for {} files)",
            data.len(),
            expected,
            count
        )));
    }

    data[4..expected]
        .chunks_exact(FILE_DESCRIPTOR_LEN)
        .map(FileDescriptor::parse)
        .collect()
}

/// Build a FILEGROUPDESCRIPTORW blob
pub fn build_file_group(descriptors: &[FileDescriptor]) -> Bytes {
    let mut dst = BytesMut::with_capacity(4 + descriptors.len() * FILE_DESCRIPTOR_LEN);
    dst.put_u32_le(descriptors.len() as u32);
    for descriptor in descriptors {
        descriptor.encode(&mut dst);
    }
    dst.freeze()
}

pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let secs = (filetime / 10_000_000) as i64 - FILETIME_UNIX_OFFSET_SECS;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

pub fn datetime_to_filetime(time: DateTime<Utc>) -> u64 {
    let secs = time.timestamp() + FILETIME_UNIX_OFFSET_SECS;
    if secs < 0 {
        return 0;
    }
    secs as u64 * 10_000_000 + (time.timestamp_subsec_nanos() / 100) as u64
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(raw)
}
