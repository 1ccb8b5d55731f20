use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ShowConfig, UpstreamConfig, DATE_PLACEHOLDER};
use crate::discovery::{display_date, DEFAULT_MIME_TYPE};
use crate::storage::{Database, DatabaseError, Episode};
use crate::util::strip_control_chars;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that abort an upstream sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Catalog update failed: {0}")]
    Catalog(#[from] DatabaseError),
}

/// Outcome of an upstream sync.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries in the upstream feed
    pub seen: usize,
    /// URLs of matching entries upserted into the catalog
    pub imported: Vec<String>,
}

/// Fetch the broadcaster's aggregator feed and upsert every entry whose
/// enclosure belongs to the show.
///
/// Entries are matched by `upstream.match_marker` appearing in the
/// enclosure URL, the same naming convention the discovery pass probes.
pub async fn sync(
    db: &Database,
    client: &reqwest::Client,
    upstream: &UpstreamConfig,
    show: &ShowConfig,
) -> Result<SyncReport, SyncError> {
    tracing::info!(url = %upstream.url, "Fetching upstream feed");
    let bytes = fetch_feed(client, &upstream.url, upstream.timeout()).await?;
    let (seen, episodes) = parse_upstream(&bytes, &upstream.match_marker, show)?;

    let mut report = SyncReport {
        seen,
        imported: Vec::with_capacity(episodes.len()),
    };
    for episode in episodes {
        db.upsert_episode(&episode).await?;
        tracing::info!(url = %episode.url, published = %episode.publish_date, "Imported episode");
        report.imported.push(episode.url);
    }

    tracing::info!(
        seen = report.seen,
        imported = report.imported.len(),
        "Upstream sync complete"
    );
    Ok(report)
}

/// GET `url` and read the body, all within `timeout`.
///
/// The deadline covers the body as well as the headers: a server that
/// answers and then stalls mid-body still fails with [`SyncError::Timeout`].
async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, SyncError> {
    let request = async {
        let response = client.get(url).send().await.map_err(SyncError::Network)?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    };

    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| SyncError::Timeout(timeout))?
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, SyncError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(SyncError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SyncError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SyncError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Parse upstream feed bytes into catalog episodes.
///
/// Returns the total entry count and the episodes whose enclosure URL
/// contains `marker`. Entries without an enclosure or without any date are
/// skipped.
pub fn parse_upstream(
    bytes: &[u8],
    marker: &str,
    show: &ShowConfig,
) -> Result<(usize, Vec<Episode>), SyncError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| SyncError::Parse(e.to_string()))?;
    let seen = feed.entries.len();

    let episodes = feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_episode(entry, marker, show))
        .collect();

    Ok((seen, episodes))
}

fn entry_to_episode(
    entry: feed_rs::model::Entry,
    marker: &str,
    show: &ShowConfig,
) -> Option<Episode> {
    let media = entry.media.iter().find(|m| {
        m.content
            .iter()
            .any(|c| c.url.as_ref().is_some_and(|u| u.as_str().contains(marker)))
    })?;
    let content = media
        .content
        .iter()
        .find(|c| c.url.as_ref().is_some_and(|u| u.as_str().contains(marker)))?;
    let url = content.url.as_ref()?.to_string();

    let Some(publish_date) = entry.published.or(entry.updated) else {
        tracing::warn!(url = %url, "Skipping upstream entry without a date");
        return None;
    };

    let clean = |s: &str| strip_control_chars(s).trim().to_string();
    let title = entry
        .title
        .as_ref()
        .map(|t| clean(&t.content))
        .unwrap_or_else(|| {
            show.title_template
                .replace(DATE_PLACEHOLDER, &display_date(&publish_date))
        });
    let author = entry
        .authors
        .first()
        .map(|p| clean(&p.name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| show.author.clone());
    let summary = entry
        .summary
        .as_ref()
        .map(|t| clean(&t.content))
        .unwrap_or_default();
    let description = media
        .description
        .as_ref()
        .map(|t| clean(&t.content))
        .unwrap_or_else(|| summary.clone());
    let image_url = media
        .thumbnails
        .first()
        .map(|t| t.image.uri.clone())
        .unwrap_or_else(|| show.image.clone());
    let duration = media
        .duration
        .or(content.duration)
        .map(format_duration);

    Some(Episode {
        publish_date,
        size_bytes: content.size.unwrap_or(0),
        title,
        author,
        subtitle: show.subtitle.clone(),
        summary,
        description,
        image_url,
        url,
        mime_type: content
            .content_type
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        duration,
        explicitness: show.explicit.clone(),
    })
}

/// `H:MM:SS`, the form podcast clients expect in `itunes:duration`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
