//! PFS0 (PartitionFS) - flat archive container.
//!
//! The outer container of an NSP. [`Pfs0Builder`] writes one from an ordered
//! list of files; [`Pfs0`] and [`Pfs0Reader`] read one back.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PFS0"              (4 bytes)
//! [0x04] FileCount                 (u32 LE)
//! [0x08] StringTableSize           (u32 LE)
//! [0x0C] Reserved (always 0)       (4 bytes)
//! [0x10] EntryTable                (FileCount × 0x18 bytes)
//! [0x10 + FileCount×0x18]
//!        StringTable               (StringTableSize bytes)
//! [0x10 + FileCount×0x18 + StringTableSize]
//!        FileData                  (remaining bytes)
//! ```
//!
//! ## File Entry (0x18 bytes)
//! ```text
//! [0x00] Offset  - relative to the data section start (u64 LE)
//! [0x08] Size    - in bytes (u64 LE)
//! [0x10] NameOffset - byte offset into the string table (u32 LE)
//! [0x14] Reserved   (u32)
//! ```
//!
//! ## Notes
//! * The string table holds NUL-separated names followed by 1 to 16 zero
//!   bytes, so the header ends on a 16-byte boundary and the last name is
//!   always terminated.
//! * File order is load order for consumers; the builder never reorders.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Take, Write};
use std::ops::Index;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::utils::{bytesv, le_u32, le_u64, magic, null_string};
use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"PFS0";
const HEADER_SIZE: usize = 0x10;
const ENTRY_SIZE: usize = 0x18;
const ALIGNMENT: usize = 0x10;

/// Parsed PFS0 container (metadata only).
///
/// File data is accessed via [`Pfs0Reader`].
#[derive(Debug)]
pub struct Pfs0 {
    /// All file entries in declaration order.
    pub files: Vec<Pfs0File>,
    /// Absolute byte offset (from the start of the container) to the file
    /// data section.
    pub(crate) data_offset: u64,
}

/// Metadata for a single file inside a PFS0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pfs0File {
    /// File name decoded from the string table.
    pub name: String,
    /// Offset relative to the PFS0 data section.
    pub offset: u64,
    /// File size in bytes.
    pub size: u64,
}

impl Pfs0 {
    /// Parse a PFS0 container from `r`.
    ///
    /// The reader must be positioned at the very start of the PFS0 magic.
    /// File contents are not read; use [`Pfs0Reader`] for data access.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;

        magic(r, MAGIC)?;
        let file_count = le_u32(r)?;
        let string_table_size = le_u32(r)?;
        let _reserved = le_u32(r)?;

        let mut entries = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let offset = le_u64(r)?;
            let size = le_u64(r)?;
            let name_offset = le_u32(r)?;
            let _reserved = le_u32(r)?;
            entries.push((offset, size, name_offset));
        }

        let string_table = bytesv(r, string_table_size as usize)?;

        let mut files = Vec::with_capacity(file_count as usize);
        for (offset, size, name_offset) in entries {
            let name = null_string(&string_table, name_offset as usize)?;
            files.push(Pfs0File { name, offset, size });
        }

        let data_offset = base
            + HEADER_SIZE as u64
            + file_count as u64 * ENTRY_SIZE as u64
            + string_table_size as u64;

        Ok(Self { files, data_offset })
    }

    /// Byte offset of the data section relative to the container start.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }
}

/// Streaming reader wrapper around a [`Pfs0`] container.
pub struct Pfs0Reader<R> {
    inner: R,
    /// Parsed metadata.
    pub pfs0: Pfs0,
}

impl<R: Read + Seek> Pfs0Reader<R> {
    /// Parse a PFS0 and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let pfs0 = Pfs0::parse(&mut reader)?;
        Ok(Self {
            inner: reader,
            pfs0,
        })
    }

    /// Open a file for streaming access, bounded to its byte range.
    pub fn read_file(&mut self, file: &Pfs0File) -> Result<Take<&mut R>> {
        self.inner
            .seek(SeekFrom::Start(self.pfs0.data_offset + file.offset))?;
        Ok(self.inner.by_ref().take(file.size))
    }

    /// Iterate over all file entries.
    pub fn files(&self) -> impl Iterator<Item = &Pfs0File> {
        self.pfs0.files.iter()
    }

    /// Find a file by name. Returns [`None`] if not found.
    pub fn get_file_by_name(&self, name: &str) -> Option<&Pfs0File> {
        self.pfs0.files.iter().find(|f| f.name == name)
    }
}

impl<R: Read + Seek> Index<&str> for Pfs0Reader<R> {
    type Output = Pfs0File;

    /// # Panics
    /// Panics if the file name does not exist in the archive.
    fn index(&self, index: &str) -> &Self::Output {
        self.get_file_by_name(index)
            .unwrap_or_else(|| panic!("no file '{index}' in PFS0"))
    }
}

/// Directory entry computed for one input file of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pfs0Entry {
    pub path: PathBuf,
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub name_offset: u32,
}

/// Writes a PFS0 from an ordered list of files.
///
/// Output depends only on the paths' basenames, sizes and contents, in the
/// given order.
#[derive(Debug, Clone, Default)]
pub struct Pfs0Builder {
    files: Vec<PathBuf>,
}

impl Pfs0Builder {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Stat every input and lay out the directory.
    pub fn entries(&self) -> Result<Vec<Pfs0Entry>> {
        let mut entries = Vec::with_capacity(self.files.len());
        let mut offset = 0u64;
        let mut name_offset = 0u32;
        for path in &self.files {
            let meta = fs::metadata(path).map_err(|source| Error::ContainerBuild {
                path: path.clone(),
                source,
            })?;
            if !meta.is_file() {
                return Err(Error::ContainerBuild {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                });
            }
            let name = basename(path)?;
            let size = meta.len();
            let name_len = u32::try_from(name.len() + 1).map_err(|_| Error::InvalidRange)?;
            entries.push(Pfs0Entry {
                path: path.clone(),
                name,
                offset,
                size,
                name_offset,
            });
            offset += size;
            name_offset = name_offset.checked_add(name_len).ok_or(Error::InvalidRange)?;
        }
        Ok(entries)
    }

    /// Encode the header for `entries`.
    pub fn header(entries: &[Pfs0Entry]) -> Result<Vec<u8>> {
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        let string_table = names.join("\0");

        let unpadded = HEADER_SIZE + entries.len() * ENTRY_SIZE + string_table.len();
        let padding = ALIGNMENT - unpadded % ALIGNMENT;
        let table_size =
            u32::try_from(string_table.len() + padding).map_err(|_| Error::InvalidRange)?;
        let count = u32::try_from(entries.len()).map_err(|_| Error::InvalidRange)?;

        let mut header = Vec::with_capacity(unpadded + padding);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&count.to_le_bytes());
        header.extend_from_slice(&table_size.to_le_bytes());
        header.extend_from_slice(&[0u8; 4]);
        for e in entries {
            header.extend_from_slice(&e.offset.to_le_bytes());
            header.extend_from_slice(&e.size.to_le_bytes());
            header.extend_from_slice(&e.name_offset.to_le_bytes());
            header.extend_from_slice(&[0u8; 4]);
        }
        header.extend_from_slice(string_table.as_bytes());
        header.resize(unpadded + padding, 0);
        Ok(header)
    }

    /// Write the archive to `w`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<u64> {
        let entries = self.entries()?;
        let header = Self::header(&entries)?;
        w.write_all(&header)?;

        let mut total = header.len() as u64;
        for e in &entries {
            let src_err = |source| Error::ContainerBuild {
                path: e.path.clone(),
                source,
            };
            let file = File::open(&e.path).map_err(src_err)?;
            // Never copy more than was laid out in the header.
            let copied = io::copy(&mut file.take(e.size), w)?;
            if copied != e.size {
                return Err(Error::ContainerBuild {
                    path: e.path.clone(),
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("file shrank to {copied} of {} bytes", e.size),
                    ),
                });
            }
            total += copied;
        }
        w.flush()?;
        Ok(total)
    }

    /// Write the archive to `out`, replacing any existing file.
    pub fn build(&self, out: &Path) -> Result<u64> {
        let mut w = BufWriter::new(File::create(out)?);
        let written = self.write_to(&mut w)?;
        info!(path = %out.display(), files = self.files.len(), bytes = written, "repacked archive");
        Ok(written)
    }
}

fn basename(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::ContainerBuild {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "file name is not valid UTF-8"),
        })
}
