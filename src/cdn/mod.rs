//! CDN access: URL construction and the transport abstraction.
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`Endpoints`] | Formats every URL the pipeline requests from the configured environment |
//! | [`Transport`] | One request, one streaming response; mocked in tests |
//! | [`http::HttpTransport`] | Blocking `reqwest` implementation with the client certificate |

pub mod http;

use std::fmt;
use std::io::Read;

use crate::Result;
use crate::config::Values;
use crate::formats::cnmt::ContentId;
use crate::keys::RightsId;
use crate::title::TitleId;

/// Response header carrying the content id of a title or ticket.
pub const CONTENT_ID_HEADER: &str = "X-Nintendo-Content-ID";

/// CDN host family used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Applications, patches and add-ons (`atum`).
    Application,
    /// System titles listed by a system update (`atumn`).
    System,
}

impl Channel {
    fn host_suffix(self) -> &'static str {
        match self {
            Self::Application => "",
            Self::System => "n",
        }
    }
}

/// URL builder bound to one environment and device id.
#[derive(Debug, Clone)]
pub struct Endpoints {
    environment: String,
    device_id: String,
}

impl Endpoints {
    pub fn new(values: &Values) -> Self {
        Self {
            environment: values.environment.clone(),
            device_id: values.device_id.clone(),
        }
    }

    fn url(&self, channel: Channel, path: &str) -> String {
        format!(
            "https://atum{}.hac.{}.d4c.nintendo.net/{path}?device_id={}",
            channel.host_suffix(),
            self.environment,
            self.device_id
        )
    }

    /// HEAD target answering with the metadata content id of a title version.
    pub fn title_meta(&self, channel: Channel, title: TitleId, version: u32) -> String {
        self.url(channel, &format!("t/a/{title}/{version}"))
    }

    /// The metadata NCA itself.
    pub fn meta_content(&self, channel: Channel, id: &ContentId) -> String {
        self.url(channel, &format!("c/a/{id}"))
    }

    /// HEAD target answering with the metadata content id of a system update.
    pub fn system_update_meta(&self, version: u32) -> String {
        self.url(
            Channel::System,
            &format!("t/s/{}/{version}", TitleId::SYSTEM_UPDATE),
        )
    }

    /// The metadata NCA of a system update.
    pub fn system_update_content(&self, id: &ContentId) -> String {
        self.url(Channel::System, &format!("c/s/{id}"))
    }

    /// A content NCA listed by a metadata record.
    pub fn content(&self, channel: Channel, id: &ContentId) -> String {
        self.url(channel, &format!("c/c/{id}"))
    }

    /// HEAD target answering with the content id of a title's ticket.
    pub fn rights(&self, rights_id: &RightsId) -> String {
        self.url(Channel::Application, &format!("r/t/{rights_id}"))
    }

    /// The combined ticket and certificate blob.
    pub fn license(&self, id: &str) -> String {
        self.url(Channel::Application, &format!("c/t/{id}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A request the transport should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    /// When set, ask for `bytes=<start>-`.
    pub range_start: Option<u64>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            range_start: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            url: url.into(),
            range_start: None,
        }
    }

    pub fn from_offset(mut self, start: u64) -> Self {
        self.range_start = Some(start);
        self
    }
}

/// Parsed `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte of the range; [`None`] for `bytes */total`.
    pub start: Option<u64>,
    /// Full resource size; [`None`] when the server sent `*`.
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse `bytes <start>-<end>/<total>` or `bytes */<total>`.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        let start = match range.trim() {
            "*" => None,
            r => Some(r.split_once('-')?.0.trim().parse().ok()?),
        };
        Some(Self { start, total })
    }
}

/// Status, the headers the pipeline cares about, and a streaming body.
pub struct Response {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    pub content_id: Option<String>,
    pub body: Box<dyn Read>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .field("content_id", &self.content_id)
            .finish_non_exhaustive()
    }
}

/// Sends one request and hands back the response without reading the body.
pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response> {
        (**self).send(request)
    }
}
