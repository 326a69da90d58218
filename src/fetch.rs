//! Resumable, byte-exact transfer of one remote resource to a local file.
//!
//! A file already on disk is treated as a partial download: the fetcher asks
//! for the remaining bytes and reconciles what the server answers with the
//! local size.
//!
//! | Server answer | Expected total | Action |
//! |---------------|----------------|--------|
//! | 206 + `Content-Range` | range total, or local + length | append remaining bytes |
//! | 200, length == local | `Content-Length` | already complete |
//! | 200, length != local | `Content-Length` | discard, write full body |
//! | 416, total absent or == local | `Content-Range: */N` | already complete |
//! | 416, total < local | `Content-Range: */N` | discard, fetch again from zero |
//!
//! Whatever was written stays on disk when a transfer fails, so a later run
//! picks it up again.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cdn::{Request, Response, Transport};
use crate::{Error, Result};

/// Bytes read from the body per write.
const CHUNK_SIZE: usize = 0x10000;

/// Receives transfer progress. All methods default to doing nothing.
pub trait Progress {
    /// A transfer of `name` starts with `done` bytes already present.
    fn begin(&self, _name: &str, _done: u64, _total: Option<u64>) {}
    /// `done` bytes of the file are now on disk.
    fn advance(&self, _done: u64) {}
    /// The transfer ended, successfully or not.
    fn finish(&self) {}
}

/// Progress sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {}

/// How a fetch reached its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No local file existed.
    Fresh,
    /// Remaining bytes were appended to a partial file.
    Resumed,
    /// The local file did not match the remote size and was rewritten.
    Restarted,
    /// The local file already had the expected size; nothing was written.
    AlreadyComplete,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    pub outcome: FetchOutcome,
    /// Bytes written during this call.
    pub written: u64,
    /// Size announced by the server, when it announced one.
    pub total: Option<u64>,
}

enum Plan {
    Complete(u64),
    Append(Option<u64>),
    Replace(Option<u64>),
    Restart(u64),
}

/// Downloads resources through a [`Transport`], resuming partial files.
pub struct ByteRangeFetcher<T> {
    transport: T,
    progress: Box<dyn Progress>,
}

impl<T: Transport> ByteRangeFetcher<T> {
    /// Fetcher over `transport` that reports no progress.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            progress: Box::new(Silent),
        }
    }

    /// Report transfers to `progress` instead.
    pub fn with_progress(mut self, progress: impl Progress + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Make `path` hold the full resource at `url`.
    pub fn fetch(&self, url: &str, path: &Path) -> Result<Fetched> {
        let name = display_name(path);
        let local = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return self.fresh(url, path, &name, FetchOutcome::Fresh),
        };

        let response = self.transport.send(&Request::get(url).from_offset(local))?;
        match plan(url, local, &response)? {
            Plan::Complete(total) => {
                info!(file = %name, bytes = total, "download is already complete, skipping");
                Ok(Fetched {
                    path: path.to_path_buf(),
                    outcome: FetchOutcome::AlreadyComplete,
                    written: 0,
                    total: Some(total),
                })
            }
            Plan::Append(total) => {
                info!(file = %name, from = local, "resuming download");
                let file = OpenOptions::new().append(true).open(path)?;
                self.stream(response, file, path, &name, local, total, FetchOutcome::Resumed)
            }
            Plan::Replace(total) => {
                warn!(
                    file = %name,
                    local,
                    ?total,
                    "server sent the whole file, restarting download"
                );
                let file = File::create(path)?;
                self.stream(response, file, path, &name, 0, total, FetchOutcome::Restarted)
            }
            Plan::Restart(total) => {
                warn!(
                    file = %name,
                    local,
                    total,
                    "existing file is bigger than expected, restarting download"
                );
                drop(response);
                self.fresh(url, path, &name, FetchOutcome::Restarted)
            }
        }
    }

    fn fresh(&self, url: &str, path: &Path, name: &str, outcome: FetchOutcome) -> Result<Fetched> {
        let response = self.transport.send(&Request::get(url))?;
        check_status(url, &response)?;
        if response.status != 200 {
            return Err(Error::UnexpectedStatus {
                url: url.to_owned(),
                status: response.status,
            });
        }
        let total = response.content_length;
        let file = File::create(path)?;
        self.stream(response, file, path, name, 0, total, outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn stream(
        &self,
        mut response: Response,
        file: File,
        path: &Path,
        name: &str,
        start: u64,
        total: Option<u64>,
        outcome: FetchOutcome,
    ) -> Result<Fetched> {
        let mut out = BufWriter::new(file);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        self.progress.begin(name, start, total);
        loop {
            let n = match response.body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    out.flush()?;
                    self.progress.finish();
                    return Err(e.into());
                }
            };
            out.write_all(&buf[..n])?;
            written += n as u64;
            self.progress.advance(start + written);
        }
        out.flush()?;
        self.progress.finish();

        let present = start + written;
        if let Some(expected) = total
            && present != expected
        {
            return Err(Error::Transfer {
                file: name.to_owned(),
                expected,
                actual: present,
            });
        }

        info!(file = %name, bytes = present, "saved {}", path.display());
        Ok(Fetched {
            path: path.to_path_buf(),
            outcome,
            written,
            total,
        })
    }
}

fn check_status(url: &str, response: &Response) -> Result<()> {
    match response.status {
        403 => Err(Error::Rejected(url.to_owned())),
        404 => Err(Error::NotFound(url.to_owned())),
        _ => Ok(()),
    }
}

fn plan(url: &str, local: u64, response: &Response) -> Result<Plan> {
    check_status(url, response)?;
    let range = response.content_range;
    match response.status {
        206 => {
            let start = range.and_then(|r| r.start);
            if start != Some(local) {
                return Err(Error::UnexpectedStatus {
                    url: url.to_owned(),
                    status: 206,
                });
            }
            let total = range
                .and_then(|r| r.total)
                .or_else(|| response.content_length.map(|len| local + len));
            Ok(match total {
                Some(t) if t == local => Plan::Complete(t),
                Some(t) if t < local => Plan::Restart(t),
                total => Plan::Append(total),
            })
        }
        200 => Ok(match response.content_length {
            Some(t) if t == local => Plan::Complete(t),
            total => Plan::Replace(total),
        }),
        416 => Ok(match range.and_then(|r| r.total) {
            None => Plan::Complete(local),
            Some(t) if t == local => Plan::Complete(t),
            Some(t) if t < local => Plan::Restart(t),
            Some(_) => {
                return Err(Error::UnexpectedStatus {
                    url: url.to_owned(),
                    status: 416,
                });
            }
        }),
        status => Err(Error::UnexpectedStatus {
            url: url.to_owned(),
            status,
        }),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
