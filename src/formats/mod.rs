//! Binary formats handled by the repackager.
//!
//! Decoders work on plaintext: the decryption tool runs first and the
//! parsers receive its output. Readers are generic over
//! [`std::io::Read`] + [`std::io::Seek`]; the CNMT decoder takes a byte
//! slice because records are small and read whole.
//!
//! ## Format overview
//!
//! | Module     | Format      | Description |
//! |------------|-------------|-------------|
//! | [`cnmt`]   | CNMT        | Content metadata: the contents of a title, or the titles of a system update |
//! | [`nca`]    | NCA         | Version and key generation from the decrypted header |
//! | [`pfs0`]   | PFS0 / NSP  | Flat archive; built from downloaded files, parsed back for inspection |
//! | [`ticket`] | TIK / CETK  | Title key tickets and the ticket+certificate blob of the license endpoint |

pub mod cnmt;
pub mod nca;
pub mod pfs0;
pub mod ticket;
