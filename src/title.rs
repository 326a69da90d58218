//! Title identifiers and the Base / Update / AddOn relation.
//!
//! A title id is a 64-bit value whose low three hex digits encode the role
//! of the title:
//!
//! ```text
//! 0100000000010000   base application      (low digits 000)
//! 0100000000010800   update of that base   (low digits 800)
//! 0100000000011001   add-on content        (low two digits != 00)
//! ```
//!
//! Add-on ids sit one 0x1000 block above their base, so the base is found by
//! stepping back one block and clearing the low digits.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

const LOW_DIGITS: u64 = 0xFFF;
const UPDATE_SUFFIX: u64 = 0x800;
const ADDON_STRIDE: u64 = 0x1000;

/// Role of a title, derived from its low hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TitleKind {
    Base,
    Update,
    AddOn,
}

impl TitleKind {
    /// Short label used in archive file names.
    pub fn label(self) -> &'static str {
        match self {
            Self::Base => "GAME",
            Self::Update => "UPDATE",
            Self::AddOn => "DLC",
        }
    }
}

/// A 64-bit title identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TitleId(pub u64);

impl TitleId {
    /// Title id of the system update meta package.
    pub const SYSTEM_UPDATE: TitleId = TitleId(0x0100_0000_0000_0816);

    /// Classify the id. Returns [`None`] for ids that end in `00` without
    /// being a base or an update.
    pub fn kind(self) -> Option<TitleKind> {
        match self.0 & LOW_DIGITS {
            0x000 => Some(TitleKind::Base),
            UPDATE_SUFFIX => Some(TitleKind::Update),
            low if low & 0xFF == 0 => None,
            _ => Some(TitleKind::AddOn),
        }
    }

    /// Like [`kind`](Self::kind) but fails with [`Error::InvalidTitleId`].
    pub fn require_kind(self) -> Result<TitleKind> {
        self.kind()
            .ok_or_else(|| Error::InvalidTitleId(self.to_string()))
    }

    /// Base application this title belongs to.
    pub fn base(self) -> Result<TitleId> {
        Ok(match self.require_kind()? {
            TitleKind::Base => self,
            TitleKind::Update => TitleId(self.0 & !LOW_DIGITS),
            TitleKind::AddOn => TitleId(self.0.wrapping_sub(ADDON_STRIDE) & !LOW_DIGITS),
        })
    }

    /// Update title sharing this title's high digits.
    pub fn update(self) -> Result<TitleId> {
        self.require_kind()?;
        Ok(TitleId((self.0 & !LOW_DIGITS) | UPDATE_SUFFIX))
    }

    /// The complementary Base/Update id written as `PatchId` in manifests:
    /// an update maps to its base, everything else to the `800` id.
    pub fn patch_id(self) -> TitleId {
        if self.0 & LOW_DIGITS == UPDATE_SUFFIX {
            TitleId(self.0 & !LOW_DIGITS)
        } else {
            TitleId((self.0 & !LOW_DIGITS) | UPDATE_SUFFIX)
        }
    }

    /// Big-endian bytes, the order used inside rights ids.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for TitleId {
    type Err = Error;

    /// Parse up to 16 hex digits; shorter strings are left-zero-padded.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidTitleId(s.to_owned()));
        }
        u64::from_str_radix(s, 16)
            .map(TitleId)
            .map_err(|_| Error::InvalidTitleId(s.to_owned()))
    }
}
