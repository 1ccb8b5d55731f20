use chrono::{DateTime, Utc};
use thiserror::Error;

use super::probe::{ProbeError, ProbeOutcome, Prober, RemoteFile};
use super::walker::{candidate_url, display_date, start_date, DateRange};
use crate::config::{ShowConfig, DATE_PLACEHOLDER};
use crate::storage::{Database, DatabaseError, Episode};

/// Errors that abort a discovery or pruning pass.
///
/// Work done before the failure stays in the catalog; both passes are
/// idempotent, so rerunning resumes where the failed one stopped.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("Catalog update failed: {0}")]
    Catalog(#[from] DatabaseError),
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Where the walk started
    pub start: DateTime<Utc>,
    /// Number of candidate dates probed
    pub probed: usize,
    /// URLs found and upserted, in walk order
    pub stored: Vec<String>,
}

/// Outcome of a pruning pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub checked: usize,
    pub removed: Vec<String>,
}

/// Walk every candidate date from the catalog's newest episode (or the
/// show's epoch) up to `now`, probing each candidate URL and upserting
/// the episodes that exist.
///
/// Known dates are probed again and their records rewritten, which leaves
/// the catalog unchanged when the remote files have not changed.
///
/// # Errors
///
/// The first probe or catalog failure stops the walk; later dates are not
/// probed.
pub async fn discover(
    db: &Database,
    prober: &Prober,
    show: &ShowConfig,
    now: DateTime<Utc>,
) -> Result<DiscoveryReport, ReconcileError> {
    let latest = db.latest_publish_date().await?;
    let start = start_date(latest, show.epoch_start());
    let range = DateRange::new(start, now);

    tracing::info!(start = %start, end = %now, resumed = latest.is_some(), "Starting discovery pass");

    let mut report = DiscoveryReport {
        start,
        probed: 0,
        stored: Vec::new(),
    };

    for candidate in range.iter() {
        let url = candidate_url(&show.url_template, &candidate);
        report.probed += 1;

        let file = match prober.probe(&url).await? {
            ProbeOutcome::Found(file) => file,
            ProbeOutcome::NotFound => continue,
        };

        let episode = synthesize_episode(&url, &candidate, &file, show);
        db.upsert_episode(&episode).await?;
        tracing::info!(url = %url, published = %episode.publish_date, size = episode.size_bytes, "Stored episode");
        report.stored.push(url);
    }

    tracing::info!(
        probed = report.probed,
        stored = report.stored.len(),
        "Discovery pass complete"
    );
    Ok(report)
}

/// Re-probe every catalogued episode and delete the ones whose file is gone.
///
/// Only a definite not-found removes a record; probe errors abort the pass.
pub async fn prune(db: &Database, prober: &Prober) -> Result<PruneReport, ReconcileError> {
    let episodes = db.episodes_by_date_desc().await?;
    let mut report = PruneReport::default();

    tracing::info!(episodes = episodes.len(), "Starting pruning pass");

    for episode in &episodes {
        report.checked += 1;
        if prober.probe(&episode.url).await?.exists() {
            continue;
        }

        if db.delete_episode(&episode.url).await? {
            tracing::info!(url = %episode.url, "Episode was removed from the server");
            report.removed.push(episode.url.clone());
        }
    }

    tracing::info!(
        checked = report.checked,
        removed = report.removed.len(),
        "Pruning pass complete"
    );
    Ok(report)
}

/// Build the catalog record for a file found at `url` for broadcast date `candidate`.
///
/// The file's Last-Modified time is the publish date; the candidate date is
/// only used when the server sends none.
pub fn synthesize_episode(
    url: &str,
    candidate: &DateTime<Utc>,
    file: &RemoteFile,
    show: &ShowConfig,
) -> Episode {
    let publish_date = file.last_modified.unwrap_or_else(|| {
        tracing::warn!(url = %url, "No usable Last-Modified header, using broadcast date");
        *candidate
    });

    Episode {
        publish_date,
        size_bytes: file.size_bytes,
        title: show
            .title_template
            .replace(DATE_PLACEHOLDER, &display_date(candidate)),
        author: show.author.clone(),
        subtitle: show.subtitle.clone(),
        summary: show.summary.clone(),
        description: show.description.clone(),
        image_url: show.image.clone(),
        url: url.to_string(),
        mime_type: file.content_type.clone(),
        duration: None,
        explicitness: show.explicit.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_synthesize_uses_last_modified_and_candidate_title() {
        let show = ShowConfig::default();
        let candidate = Utc.with_ymd_and_hms(2018, 1, 8, 0, 0, 0).unwrap();
        let modified = Utc.with_ymd_and_hms(2018, 1, 8, 23, 15, 0).unwrap();
        let file = RemoteFile {
            size_bytes: 1234,
            content_type: "audio/mpeg".to_string(),
            last_modified: Some(modified),
        };

        let ep = synthesize_episode("http://h/x_2018-01-08.mp3", &candidate, &file, &show);
        assert_eq!(ep.publish_date, modified);
        assert_eq!(ep.title, "Кремов и Хрусталев @ Radio Record (08-01-2018)");
        assert_eq!(ep.size_bytes, 1234);
        assert_eq!(ep.mime_type, "audio/mpeg");
        assert_eq!(ep.author, "Radio Record");
        assert_eq!(ep.explicitness, "clean");
        assert_eq!(ep.duration, None);
    }

    #[test]
    fn test_synthesize_falls_back_to_candidate_date() {
        let show = ShowConfig::default();
        let candidate = Utc.with_ymd_and_hms(2019, 2, 3, 0, 0, 0).unwrap();
        let file = RemoteFile {
            size_bytes: 0,
            content_type: "audio/mpeg".to_string(),
            last_modified: None,
        };

        let ep = synthesize_episode("http://h/x.mp3", &candidate, &file, &show);
        assert_eq!(ep.publish_date, candidate);
    }
}
