//! Key material handled by the repackaging step.
//!
//! No cryptography happens here. A [`TitleKey`] is only copied into tickets,
//! and a [`RightsId`] is only used to name tickets and look them up on the
//! license endpoint. Both are 16 bytes and render as 32 lowercase hex digits.
//!
//! ## Rights id layout
//! ```text
//! [0x00] TitleId        (u64 BE)
//! [0x08] KeyGeneration  (u64 BE, zero-extended)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::title::TitleId;
use crate::{Error, Result};

/// Decrypted title key supplied on the command line or read from a ticket.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TitleKey(pub [u8; 16]);

impl TitleKey {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for TitleKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_hex_16(s).map(Self).ok_or(Error::InvalidRequest {
            input: s.to_owned(),
            reason: "title key must be 32 hexadecimal digits",
        })
    }
}

impl fmt::Display for TitleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// Keys are secrets; keep them out of debug logs.
impl fmt::Debug for TitleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TitleKey(..)")
    }
}

/// Identifier binding a ticket to a title and key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RightsId(pub [u8; 16]);

impl RightsId {
    pub fn new(title: TitleId, key_generation: u8) -> Self {
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&title.to_be_bytes());
        id[8..].copy_from_slice(&u64::from(key_generation).to_be_bytes());
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for RightsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

fn decode_hex_16(s: &str) -> Option<[u8; 16]> {
    let mut out = [0u8; 16];
    hex::decode_to_slice(s.trim(), &mut out).ok()?;
    Some(out)
}
