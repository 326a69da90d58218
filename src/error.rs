//! Library-wide error and result types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::formats::cnmt::PackageType;

/// Result alias used throughout nspkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Every variant is terminal for the title being acquired; nothing is
/// retried automatically. Re-running an acquisition resumes any transfer
/// that was left on disk.
#[derive(Debug, Error)]
pub enum Error {
    /// A transfer ended with a different number of bytes than announced.
    #[error("{file}: downloaded data is not as big as expected ({actual}/{expected} bytes)")]
    Transfer {
        file: String,
        expected: u64,
        actual: u64,
    },
    /// The server answered with a status the transfer cannot handle.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },
    /// The server refused the client certificate.
    #[error("request rejected by server, check the client certificate: {0}")]
    Rejected(String),
    /// The remote resource does not exist.
    #[error("not found on server: {0}")]
    NotFound(String),
    /// A metadata record could not be decoded.
    #[error("malformed metadata record: {0}")]
    MalformedRecord(#[from] RecordError),
    /// An input file of an archive build is missing or unreadable.
    #[error("cannot add {path} to archive: {source}")]
    ContainerBuild {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The external decryption step failed.
    #[error("decryption of {path} failed: {reason}")]
    Decrypt { path: PathBuf, reason: String },
    /// A string is not a usable title id.
    #[error("invalid title id {0}")]
    InvalidTitleId(String),
    /// A command-line request could not be parsed.
    #[error("invalid request {input}: {reason}")]
    InvalidRequest { input: String, reason: &'static str },
    /// The configuration file could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// A format version is present in the data but not supported.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    /// A null-terminated string had no null terminator within the buffer.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The HTTP client failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reasons a CNMT buffer is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("unknown package type 0x{0:02x}")]
    UnknownPackageType(u8),
    #[error("unknown content type 0x{code:04x} for entry {entry}")]
    UnknownContentType { entry: usize, code: u16 },
    #[error("buffer of {len} bytes ends before offset 0x{offset:x}")]
    Truncated { offset: usize, len: usize },
    /// The record decoded but describes another kind of package.
    #[error("expected a {expected} record, found {found}")]
    UnexpectedPackageType {
        expected: PackageType,
        found: PackageType,
    },
}
