use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ExistencePolicy, ProbeConfig};

/// Content type assumed when the server does not send one.
pub const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

/// Errors that abort a probe.
///
/// A missing file is not an error; it is [`ProbeOutcome::NotFound`].
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The candidate URL could not be parsed
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Network-level error (DNS, connection reset, TLS, ...)
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server did not answer within the configured timeout
    #[error("request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
}

/// Attributes of a remote file, taken from response headers only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// `Content-Length`, 0 when absent
    pub size_bytes: u64,
    /// `Content-Type`, [`DEFAULT_MIME_TYPE`] when absent
    pub content_type: String,
    /// `Last-Modified`, `None` when absent or unparseable
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(RemoteFile),
    NotFound,
}

impl ProbeOutcome {
    pub fn exists(&self) -> bool {
        matches!(self, ProbeOutcome::Found(_))
    }
}

/// Metadata-only existence checks (HTTP HEAD) with a bounded timeout.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
    existence: ExistencePolicy,
}

impl Prober {
    pub fn new(client: reqwest::Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            timeout: config.timeout(),
            existence: config.existence,
        }
    }

    /// HEAD `url` and classify the response.
    ///
    /// # Errors
    ///
    /// Transport failures and timeouts are returned as [`ProbeError`] and are
    /// never folded into `NotFound`: a vanished server must not look like a
    /// vanished file.
    pub async fn probe(&self, url: &str) -> Result<ProbeOutcome, ProbeError> {
        let parsed = url::Url::parse(url).map_err(|e| ProbeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = tokio::time::timeout(self.timeout, self.client.head(parsed).send())
            .await
            .map_err(|_| ProbeError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ProbeError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !self.counts_as_found(status) {
            tracing::debug!(url = %url, status = %status, "Remote file not found");
            return Ok(ProbeOutcome::NotFound);
        }

        let headers = response.headers();
        // Read the header directly: for HEAD responses the body is empty, so
        // reqwest's body-derived content_length() is not reliable here
        let size_bytes = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        tracing::debug!(
            url = %url,
            status = %status,
            size = size_bytes,
            content_type = %content_type,
            "Remote file found"
        );

        Ok(ProbeOutcome::Found(RemoteFile {
            size_bytes,
            content_type,
            last_modified,
        }))
    }

    fn counts_as_found(&self, status: StatusCode) -> bool {
        match self.existence {
            ExistencePolicy::Not404 => status != StatusCode::NOT_FOUND,
            ExistencePolicy::Success => status.is_success(),
        }
    }
}

/// Parse an HTTP date header (`Mon, 08 Jan 2018 10:00:00 GMT`).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
