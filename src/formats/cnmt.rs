//! CNMT (Content Meta) - manifest of the contents belonging to a title.
//!
//! The record lives in section 0 of a Meta NCA and is read after the NCA has
//! been decrypted. Offsets below are relative to the start of the record.
//!
//! ## Header
//! ```text
//! [0x00] TitleId                       (u64 LE)
//! [0x08] Version                       (u32 LE)
//! [0x0C] PackageType                   (u8)
//! [0x0E] TableOffset                   (u16 LE, extended header size)
//! [0x10] ContentEntryCount             (u16 LE)
//! [0x12] MetaEntryCount                (u16 LE)
//! [0x18] RequiredDownloadSystemVersion (u32 LE)
//! [0x28] RequiredSystemVersion         (u32 LE)
//! [len - 0x20] Digest                  (32 bytes)
//! ```
//!
//! ## Content entry (0x38 bytes, at 0x20 + TableOffset)
//! ```text
//! [0x00] Hash        (32 bytes SHA-256)
//! [0x20] ContentId   (16 bytes)
//! [0x30] Size        (u48 LE)
//! [0x36] ContentType (u16 LE)
//! ```
//!
//! ## System update entry (0x10 bytes, at 0x20)
//! ```text
//! [0x00] TitleId     (u64 LE)
//! [0x08] Version     (u32 LE)
//! [0x0C] PackageType (u8)
//! [0x0D] Reserved    (3 bytes)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;
use crate::title::TitleId;
use crate::utils::{array_at, le_u16_at, le_u32_at, le_u48_at, le_u64_at};
use crate::{Error, Result};

const HEADER_SIZE: usize = 0x20;
const CONTENT_ENTRY_SIZE: usize = 0x38;
const SYSTEM_UPDATE_ENTRY_SIZE: usize = 0x10;
const DIGEST_SIZE: usize = 0x20;

/// Kind of package a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PackageType {
    SystemProgram = 0x01,
    SystemData = 0x02,
    SystemUpdate = 0x03,
    BootImagePackage = 0x04,
    BootImagePackageSafe = 0x05,
    Application = 0x80,
    Patch = 0x81,
    AddOnContent = 0x82,
    Delta = 0x83,
}

impl PackageType {
    pub fn name(self) -> &'static str {
        match self {
            Self::SystemProgram => "SystemProgram",
            Self::SystemData => "SystemData",
            Self::SystemUpdate => "SystemUpdate",
            Self::BootImagePackage => "BootImagePackage",
            Self::BootImagePackageSafe => "BootImagePackageSafe",
            Self::Application => "Application",
            Self::Patch => "Patch",
            Self::AddOnContent => "AddOnContent",
            Self::Delta => "Delta",
        }
    }
}

impl TryFrom<u8> for PackageType {
    type Error = RecordError;
    fn try_from(v: u8) -> std::result::Result<Self, RecordError> {
        match v {
            0x01 => Ok(Self::SystemProgram),
            0x02 => Ok(Self::SystemData),
            0x03 => Ok(Self::SystemUpdate),
            0x04 => Ok(Self::BootImagePackage),
            0x05 => Ok(Self::BootImagePackageSafe),
            0x80 => Ok(Self::Application),
            0x81 => Ok(Self::Patch),
            0x82 => Ok(Self::AddOnContent),
            0x83 => Ok(Self::Delta),
            x => Err(RecordError::UnknownPackageType(x)),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a sub-content blob listed in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ContentType {
    Meta = 0,
    Program = 1,
    Data = 2,
    Control = 3,
    HtmlDocument = 4,
    LegalInformation = 5,
    DeltaFragment = 6,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        Self::Meta,
        Self::Program,
        Self::Data,
        Self::Control,
        Self::HtmlDocument,
        Self::LegalInformation,
        Self::DeltaFragment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Meta => "Meta",
            Self::Program => "Program",
            Self::Data => "Data",
            Self::Control => "Control",
            Self::HtmlDocument => "HtmlDocument",
            Self::LegalInformation => "LegalInformation",
            Self::DeltaFragment => "DeltaFragment",
        }
    }

    fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u16 == code)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 16-byte content id; also the file stem of the NCA on the CDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub [u8; 16]);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let mut id = [0u8; 16];
        hex::decode_to_slice(s.trim(), &mut id).map_err(|_| Error::Parse("bad content id"))?;
        Ok(Self(id))
    }
}

/// One content blob referenced by a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub id: ContentId,
    pub content_type: ContentType,
    pub size: u64,
    pub hash: [u8; 32],
}

/// One title listed by a system update record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemUpdateEntry {
    pub title: TitleId,
    pub version: u32,
    pub package_type: PackageType,
}

/// Body of a record; the layout depends on the package type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    SystemUpdate(Vec<SystemUpdateEntry>),
    Contents(Vec<ContentEntry>),
}

/// Decoded CNMT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadataRecord {
    pub package_type: PackageType,
    pub title: TitleId,
    pub version: u32,
    pub required_system_version: u32,
    pub required_download_system_version: u32,
    pub digest: [u8; 32],
    pub body: RecordBody,
}

/// Bounds-checked view used while decoding.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn truncated(&self, offset: usize) -> RecordError {
        RecordError::Truncated {
            offset,
            len: self.0.len(),
        }
    }

    fn u8(&self, offset: usize) -> std::result::Result<u8, RecordError> {
        self.0.get(offset).copied().ok_or(self.truncated(offset))
    }

    fn u16(&self, offset: usize) -> std::result::Result<u16, RecordError> {
        le_u16_at(self.0, offset).ok_or(self.truncated(offset))
    }

    fn u32(&self, offset: usize) -> std::result::Result<u32, RecordError> {
        le_u32_at(self.0, offset).ok_or(self.truncated(offset))
    }

    fn u48(&self, offset: usize) -> std::result::Result<u64, RecordError> {
        le_u48_at(self.0, offset).ok_or(self.truncated(offset))
    }

    fn u64(&self, offset: usize) -> std::result::Result<u64, RecordError> {
        le_u64_at(self.0, offset).ok_or(self.truncated(offset))
    }

    fn array<const N: usize>(&self, offset: usize) -> std::result::Result<[u8; N], RecordError> {
        array_at(self.0, offset).ok_or(self.truncated(offset))
    }
}

impl ContentMetadataRecord {
    /// Decode a record from the decrypted CNMT bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self::decode_fields(&Fields(buf))?)
    }

    fn decode_fields(f: &Fields<'_>) -> std::result::Result<Self, RecordError> {
        let title = TitleId(f.u64(0x00)?);
        let version = f.u32(0x08)?;
        let package_type = PackageType::try_from(f.u8(0x0C)?)?;
        let table_offset = f.u16(0x0E)? as usize;
        let content_count = f.u16(0x10)? as usize;
        let meta_count = f.u16(0x12)? as usize;
        let required_download_system_version = f.u32(0x18)?;
        let required_system_version = f.u32(0x28)?;

        // The digest is always the trailing 32 bytes, whatever the layout.
        let digest_offset = f.0.len().checked_sub(DIGEST_SIZE).ok_or(f.truncated(0))?;
        let digest = f.array::<32>(digest_offset)?;

        let body = if package_type == PackageType::SystemUpdate {
            let mut entries = Vec::with_capacity(meta_count);
            for n in 0..meta_count {
                let off = HEADER_SIZE + n * SYSTEM_UPDATE_ENTRY_SIZE;
                entries.push(SystemUpdateEntry {
                    title: TitleId(f.u64(off)?),
                    version: f.u32(off + 0x08)?,
                    package_type: PackageType::try_from(f.u8(off + 0x0C)?)?,
                });
            }
            RecordBody::SystemUpdate(entries)
        } else {
            let base = HEADER_SIZE + table_offset;
            let mut entries = Vec::with_capacity(content_count);
            for n in 0..content_count {
                let off = base + n * CONTENT_ENTRY_SIZE;
                let code = f.u16(off + 0x36)?;
                let content_type = ContentType::from_code(code)
                    .ok_or(RecordError::UnknownContentType { entry: n, code })?;
                entries.push(ContentEntry {
                    hash: f.array::<32>(off)?,
                    id: ContentId(f.array::<16>(off + 0x20)?),
                    size: f.u48(off + 0x30)?,
                    content_type,
                });
            }
            RecordBody::Contents(entries)
        };

        Ok(Self {
            package_type,
            title,
            version,
            required_system_version,
            required_download_system_version,
            digest,
            body,
        })
    }

    /// Content entries matching `filter`, or all of them, in declaration
    /// order. Empty for system update records.
    pub fn contents(&self, filter: Option<ContentType>) -> impl Iterator<Item = &ContentEntry> {
        let entries = match &self.body {
            RecordBody::Contents(entries) => entries.as_slice(),
            RecordBody::SystemUpdate(_) => &[],
        };
        entries
            .iter()
            .filter(move |e| filter.is_none_or(|t| e.content_type == t))
    }

    /// Look up a content entry by id.
    pub fn content(&self, id: &ContentId) -> Option<&ContentEntry> {
        self.contents(None).find(|e| e.id == *id)
    }

    /// Titles listed by a system update record. Empty for other records.
    pub fn system_titles(&self) -> &[SystemUpdateEntry] {
        match &self.body {
            RecordBody::SystemUpdate(entries) => entries,
            RecordBody::Contents(_) => &[],
        }
    }

    /// Look up a system update entry by title id.
    pub fn system_title(&self, title: TitleId) -> Option<&SystemUpdateEntry> {
        self.system_titles().iter().find(|e| e.title == title)
    }

    /// Complementary Base/Update id of the owning title.
    pub fn patch_id(&self) -> TitleId {
        self.title.patch_id()
    }
}
