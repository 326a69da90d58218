//! **nspkit** - resumable CDN title acquisition and NSP repackaging.
//!
//! # Modules
//! | Module | Purpose |
//! |--------|---------|
//! | [`fetch`]    | Resumable byte-exact download of one resource |
//! | [`cdn`]      | Endpoint URLs and the HTTP transport |
//! | [`formats::cnmt`]   | CNMT - content metadata record |
//! | [`formats::pfs0`]   | PFS0 / NSP - flat archive reader and builder |
//! | [`formats::nca`]    | NCA - plaintext header fields |
//! | [`formats::ticket`] | Ticket synthesis and CETK splitting |
//! | [`manifest`] | `.cnmt.xml` description of a record |
//! | [`decrypt`]  | External decryption tool interface |
//! | [`pipeline`] | Title and system update acquisition |
//! | [`request`]  | `TID-VER[-TKEY]` and system version parsing |

pub mod cdn;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod keys;
pub mod manifest;
pub mod pipeline;
pub mod request;
pub mod title;
pub mod utils;

pub use error::{Error, Result};
