//! Tickets and the combined ticket+certificate blob (CETK).
//!
//! A ticket is synthesized by patching a template ticket; a CETK served by
//! the license endpoint is split into its ticket and certificate chain.
//!
//! ## Ticket fields patched into the template
//! ```text
//! [0x180] TitleKey       (0x10 bytes)
//! [0x285] KeyGeneration  (1 byte)
//! [0x2A0] RightsId       (0x10 bytes)
//! ```
//!
//! ## CETK layout
//! ```text
//! [0x000] Ticket              (0x2C0 bytes, title key at 0x180)
//! [0x2C0] Certificate chain   (up to 0x700 bytes)
//! ```

use crate::keys::{RightsId, TitleKey};
use crate::{Error, Result};

const TITLE_KEY: std::ops::Range<usize> = 0x180..0x190;
const KEY_GENERATION: usize = 0x285;
const RIGHTS_ID: std::ops::Range<usize> = 0x2A0..0x2B0;

/// Size of the ticket part of a CETK.
pub const TICKET_SIZE: usize = 0x2C0;
/// Maximum size of the certificate part of a CETK.
pub const CERTIFICATE_SIZE: usize = 0x700;

/// Patch a template ticket with the title's key material.
pub fn synthesize_ticket(
    template: &[u8],
    key: &TitleKey,
    key_generation: u8,
    rights_id: &RightsId,
) -> Result<Vec<u8>> {
    if template.len() < RIGHTS_ID.end {
        return Err(Error::Parse("ticket template is too short"));
    }
    let mut ticket = template.to_vec();
    ticket[TITLE_KEY].copy_from_slice(key.as_bytes());
    ticket[KEY_GENERATION] = key_generation;
    ticket[RIGHTS_ID].copy_from_slice(rights_id.as_bytes());
    Ok(ticket)
}

/// A CETK split into its parts.
#[derive(Debug, Clone)]
pub struct Cetk {
    pub ticket: Vec<u8>,
    pub certificate: Vec<u8>,
    pub title_key: TitleKey,
}

impl Cetk {
    pub fn split(blob: &[u8]) -> Result<Self> {
        if blob.len() <= TICKET_SIZE {
            return Err(Error::Parse("cetk ends before the certificate"));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&blob[TITLE_KEY]);
        let cert_end = blob.len().min(TICKET_SIZE + CERTIFICATE_SIZE);
        Ok(Self {
            ticket: blob[..TICKET_SIZE].to_vec(),
            certificate: blob[TICKET_SIZE..cert_end].to_vec(),
            title_key: TitleKey(key),
        })
    }
}
