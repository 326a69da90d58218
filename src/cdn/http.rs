//! Blocking HTTP transport over `reqwest`.

use std::fs;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use tracing::debug;

use super::{CONTENT_ID_HEADER, ContentRange, Method, Request, Response, Transport};
use crate::config::{Config, Values};
use crate::{Error, Result};

/// `User-Agent` the CDN expects from a console.
pub fn user_agent(values: &Values) -> String {
    format!(
        "NintendoSDK Firmware/{} (platform:NX; did:{}; eid:{})",
        values.firmware, values.device_id, values.environment
    )
}

/// Real transport presenting the configured client certificate.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let cert_path = &config.paths.client_cert;
        let pem = fs::read(cert_path).map_err(|e| {
            Error::Config(format!(
                "cannot read client certificate {}: {e}",
                cert_path.display()
            ))
        })?;
        let identity = reqwest::Identity::from_pem(&pem)?;

        // The CDN's TLS chain is not in public root stores.
        let client = Client::builder()
            .identity(identity)
            .danger_accept_invalid_certs(true)
            .user_agent(user_agent(&config.values))
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;

        Ok(Self { client })
    }
}

fn header_str<'a>(
    headers: &'a HeaderMap,
    name: impl reqwest::header::AsHeaderName,
) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Head => self.client.head(&request.url),
        };
        builder = builder.header(ACCEPT, "*/*");
        if let Some(start) = request.range_start {
            builder = builder.header(RANGE, format!("bytes={start}-"));
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response.headers();
        let content_length =
            header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse().ok());
        let content_range = header_str(headers, CONTENT_RANGE).and_then(ContentRange::parse);
        let content_id = header_str(headers, CONTENT_ID_HEADER).map(str::to_owned);
        debug!(
            url = %request.url,
            status,
            ?content_length,
            ?content_range,
            "response"
        );

        Ok(Response {
            status,
            content_length,
            content_range,
            content_id,
            body: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_firmware_and_device() {
        let values = Values {
            firmware: "6.0.0-5".into(),
            device_id: "0011223344556677".into(),
            environment: "lp1".into(),
        };
        assert_eq!(
            user_agent(&values),
            "NintendoSDK Firmware/6.0.0-5 (platform:NX; did:0011223344556677; eid:lp1)"
        );
    }

    #[test]
    fn missing_client_certificate_is_a_config_error() {
        let mut config = Config::default();
        config.paths.client_cert = "/nonexistent/client.pem".into();
        assert!(matches!(HttpTransport::new(&config), Err(Error::Config(_))));
    }
}
