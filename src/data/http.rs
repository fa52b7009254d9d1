//! Blocking HTTP seam.
//!
//! The catalog and the downloader only need "GET this URL, give me the bytes".
//! Keeping that behind `Transport` lets tests script responses (and count
//! calls) without a network, while production uses `reqwest::blocking`.

use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

const USER_AGENT: &str = concat!("rfr-monitor/", env!("CARGO_PKG_VERSION"));

/// A classified transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("malformed URL: {0}")]
    InvalidUrl(String),
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("response body interrupted: {0}")]
    Body(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, interrupted bodies, 5xx and 429 are
    /// transient; malformed URLs and other 4xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Body(_) => true,
            TransportError::Status(code) => *code >= 500 || *code == 429,
            TransportError::InvalidUrl(_) | TransportError::Other(_) => false,
        }
    }
}

pub trait Transport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// `reqwest::blocking` transport with a request timeout.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let parsed = url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let resp = self.client.get(parsed).send().map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = resp
            .bytes()
            .map_err(|e| if e.is_timeout() { TransportError::Timeout } else { TransportError::Body(e.to_string()) })?;
        Ok(body.to_vec())
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidUrl(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::Status(status.as_u16())
    } else if err.is_request() || err.is_body() {
        // Resets mid-request surface here rather than as connect errors.
        TransportError::Body(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
