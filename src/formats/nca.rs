//! NCA header - the part of a decrypted NCA the repackager needs.
//!
//! The decryption tool writes the plaintext header (`Header.bin`) next to
//! the extracted sections. Only the format version and the key generation,
//! which feeds the ticket and the manifest, are decoded here.
//!
//! ## Header Layout (decrypted, offsets from the start of `Header.bin`)
//! ```text
//! [0x000] RSA-2048 sig[0]  (0x100)
//! [0x100] RSA-2048 sig[1]  (0x100)
//! [0x200] Magic            NCA3/NCA2/NCA1/NCA0
//! [0x204] DistributionType (1 byte)
//! [0x205] ContentType      (1 byte)
//! [0x206] KeyGenerationOld (1 byte)
//! [0x207] KeyAreaEncKeyIdx (1 byte)
//! [0x208] ContentSize      (u64 LE)
//! [0x210] ProgramId        (u64 LE)
//! [0x218] ContentIndex     (u32 LE)
//! [0x21C] SdkAddonVersion  (u32 LE)
//! [0x220] KeyGeneration    (1 byte)
//! [0x221] SignatureKeyGen  (1 byte)
//! [0x222] Reserved         (0xE bytes)
//! [0x230] RightsId         (0x10 bytes)
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::utils::{bytesa, le_u32, le_u64, u8};
use crate::{Error, Result};

/// Decoded fields of a plaintext NCA header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcaHeader {
    /// NCA format version: 0, 1, 2, or 3.
    pub version: u8,
    /// Effective key generation (the newer of the two header fields).
    pub key_generation: u8,
}

impl NcaHeader {
    /// Parse from a reader positioned at the first signature.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        r.seek(SeekFrom::Current(0x200))?;

        let magic = bytesa::<4>(r)?;
        let version = match &magic {
            b"NCA3" => 3,
            b"NCA2" => 2,
            b"NCA1" => 1,
            b"NCA0" => 0,
            [b'N', b'C', b'A', v] if v.is_ascii_digit() => {
                return Err(Error::UnsupportedVersion(v - b'0'));
            }
            _ => return Err(Error::BadMagic),
        };

        let _distribution_type = u8(r)?;
        let _content_type = u8(r)?;
        let key_gen_old = u8(r)?;
        let _key_area_enc_key_index = u8(r)?;
        let _content_size = le_u64(r)?;
        let _program_id = le_u64(r)?;
        let _content_index = le_u32(r)?;
        let _sdk_addon_version = le_u32(r)?;
        let key_gen_new = u8(r)?;

        Ok(Self {
            version,
            key_generation: key_gen_old.max(key_gen_new),
        })
    }

    /// Parse a `Header.bin` written by the decryption tool.
    pub fn open(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        Self::parse(&mut r)
    }
}
