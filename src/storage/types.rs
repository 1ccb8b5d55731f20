use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Catalog errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the catalog lock
    #[error("The episode catalog is locked by another kih process. Wait for it to finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored `pubdate` value is not a valid date-time
    #[error("Corrupt pubdate {value:?} for episode {url}")]
    InvalidDate { url: String, value: String },

    /// The newest `pubdate` in the catalog is not a valid date-time
    #[error("Corrupt pubdate {value:?} in catalog")]
    InvalidLatestDate { value: String },

    /// A stored `len` value is negative
    #[error("Corrupt length {value} for episode {url}")]
    InvalidSize { url: String, value: i64 },

    /// A content length too large for the `len` column
    #[error("Length {value} of episode {url} does not fit in the catalog")]
    SizeOutOfRange { url: String, value: u64 },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Date Encoding
// ============================================================================

/// Encodes a publish date for the `pubdate` column.
///
/// RFC 3339 in UTC with second precision and a `Z` suffix, so that lexical
/// ordering of the column equals chronological ordering.
pub fn encode_pubdate(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decodes a `pubdate` column value.
///
/// Accepts the canonical form written by [`encode_pubdate`] as well as the
/// space-separated form (`2018-01-08 10:00:00+00:00`) found in catalogs
/// written by earlier tooling.
pub fn decode_pubdate(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.trim().replacen(' ', "T", 1);
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Data Structures
// ============================================================================

/// One archived broadcast and its catalog metadata.
///
/// `url` is the primary key and doubles as the feed item guid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub publish_date: DateTime<Utc>,
    pub size_bytes: u64,
    pub title: String,
    pub author: String,
    pub subtitle: String,
    pub summary: String,
    pub description: String,
    pub image_url: String,
    pub url: String,
    pub mime_type: String,
    /// Never filled by discovery; only upstream imports carry a duration
    pub duration: Option<String>,
    pub explicitness: String,
}

/// Internal row type for episode queries (used by sqlx FromRow)
/// Converts to Episode via into_episode(), which validates pubdate and len
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EpisodeDbRow {
    pub pubdate: String,
    pub len: i64,
    pub title: String,
    pub author: String,
    pub subtitle: String,
    pub summary: String,
    pub image: String,
    pub url: String,
    pub mime_type: String,
    pub description: String,
    pub duration: Option<String>,
    pub explicit: String,
}

impl EpisodeDbRow {
    pub(crate) fn into_episode(self) -> Result<Episode, DatabaseError> {
        let publish_date =
            decode_pubdate(&self.pubdate).ok_or_else(|| DatabaseError::InvalidDate {
                url: self.url.clone(),
                value: self.pubdate.clone(),
            })?;
        let size_bytes = u64::try_from(self.len).map_err(|_| DatabaseError::InvalidSize {
            url: self.url.clone(),
            value: self.len,
        })?;

        Ok(Episode {
            publish_date,
            size_bytes,
            title: self.title,
            author: self.author,
            subtitle: self.subtitle,
            summary: self.summary,
            description: self.description,
            image_url: self.image,
            url: self.url,
            mime_type: self.mime_type,
            duration: self.duration.filter(|d| !d.is_empty()),
            explicitness: self.explicit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_pubdate_is_sortable_utc() {
        let date = Utc.with_ymd_and_hms(2018, 1, 8, 10, 0, 0).unwrap();
        assert_eq!(encode_pubdate(&date), "2018-01-08T10:00:00Z");
    }

    #[test]
    fn test_decode_pubdate_canonical() {
        let date = decode_pubdate("2018-01-08T10:00:00Z").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2018, 1, 8, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_decode_pubdate_legacy_space_separator() {
        let date = decode_pubdate("2018-01-08 13:00:00+03:00").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2018, 1, 8, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_decode_pubdate_rejects_garbage() {
        assert!(decode_pubdate("yesterday").is_none());
        assert!(decode_pubdate("").is_none());
    }

    #[test]
    fn test_row_with_corrupt_date_is_an_error() {
        let row = EpisodeDbRow {
            pubdate: "not a date".to_string(),
            len: 1,
            title: String::new(),
            author: String::new(),
            subtitle: String::new(),
            summary: String::new(),
            image: String::new(),
            url: "http://example.com/a.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            description: String::new(),
            duration: None,
            explicit: "clean".to_string(),
        };
        assert!(matches!(
            row.into_episode(),
            Err(DatabaseError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_row_with_negative_len_is_an_error() {
        let row = EpisodeDbRow {
            pubdate: "2018-01-08T10:00:00Z".to_string(),
            len: -5,
            title: String::new(),
            author: String::new(),
            subtitle: String::new(),
            summary: String::new(),
            image: String::new(),
            url: "http://example.com/a.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            description: String::new(),
            duration: Some(String::new()),
            explicit: "clean".to_string(),
        };
        assert!(matches!(
            row.into_episode(),
            Err(DatabaseError::InvalidSize { value: -5, .. })
        ));
    }
}
