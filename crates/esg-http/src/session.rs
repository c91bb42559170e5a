use std::io::Read;
use std::time::Duration;

use esg_scheduler::{Identity, ScrapeError};
use flate2::read::GzDecoder;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

/// One HTTP client presenting a single browser identity
pub struct HttpSession {
    client: Client,
    identity: Identity,
}

impl HttpSession {
    pub fn open(identity: &Identity, timeout: Duration) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .user_agent(identity.as_str())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            identity: identity.clone(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let resp = self.client.get(url).send().map_err(transport_error)?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScrapeError::Blocked(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ScrapeError::Network(format!("HTTP {status} for {url}")));
        }

        let gzipped = matches!(
            resp.headers().get(CONTENT_TYPE),
            Some(c) if c == "application/x-gzip" || c == "application/gzip"
        );
        if gzipped {
            let compressed = resp.bytes().map_err(transport_error)?;
            let mut page = String::new();
            GzDecoder::new(&compressed[..])
                .read_to_string(&mut page)
                .map_err(|e| ScrapeError::Parse(format!("Couldn't decode {url}: {e}")))?;
            Ok(page)
        } else {
            resp.text().map_err(transport_error)
        }
    }
}

fn transport_error(e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout(e.to_string())
    } else {
        ScrapeError::Network(e.to_string())
    }
}
