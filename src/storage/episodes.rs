use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{decode_pubdate, encode_pubdate, DatabaseError, Episode, EpisodeDbRow};

const SELECT_EPISODE_COLUMNS: &str = r#"
    SELECT pubdate, len, title, author, subtitle, summary, image, url,
           type AS mime_type, description, duration, explicit
    FROM episodes
"#;

impl Database {
    // ========================================================================
    // Episode Writes
    // ========================================================================

    /// Insert an episode or replace every field of the record with the same `url`.
    ///
    /// Single statement, so a crash never leaves a partially written record.
    /// `guid` is always written as the episode url.
    pub async fn upsert_episode(&self, episode: &Episode) -> Result<(), DatabaseError> {
        // SQLite integers are signed
        let len = i64::try_from(episode.size_bytes).map_err(|_| DatabaseError::SizeOutOfRange {
            url: episode.url.clone(),
            value: episode.size_bytes,
        })?;

        sqlx::query(
            r#"
            INSERT INTO episodes (pubdate, len, title, author, subtitle, summary, image,
                                  url, type, guid, description, duration, explicit)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                pubdate = excluded.pubdate,
                len = excluded.len,
                title = excluded.title,
                author = excluded.author,
                subtitle = excluded.subtitle,
                summary = excluded.summary,
                image = excluded.image,
                type = excluded.type,
                guid = excluded.guid,
                description = excluded.description,
                duration = excluded.duration,
                explicit = excluded.explicit
        "#,
        )
        .bind(encode_pubdate(&episode.publish_date))
        .bind(len)
        .bind(&episode.title)
        .bind(&episode.author)
        .bind(&episode.subtitle)
        .bind(&episode.summary)
        .bind(&episode.image_url)
        .bind(&episode.url)
        .bind(&episode.mime_type)
        .bind(&episode.url)
        .bind(&episode.description)
        .bind(&episode.duration)
        .bind(&episode.explicitness)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Remove the episode stored under `url`.
    ///
    /// Returns `true` if a record was deleted, `false` if none existed.
    pub async fn delete_episode(&self, url: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM episodes WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Episode Queries
    // ========================================================================

    /// Most recent `pubdate` in the catalog, or `None` when it is empty.
    pub async fn latest_publish_date(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let row: (Option<String>,) = sqlx::query_as("SELECT MAX(pubdate) FROM episodes")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        match row.0 {
            None => Ok(None),
            Some(value) => match decode_pubdate(&value) {
                Some(date) => Ok(Some(date)),
                None => Err(DatabaseError::InvalidLatestDate { value }),
            },
        }
    }

    /// Every episode, newest first.
    ///
    /// Ties on `pubdate` are broken by url so the order is deterministic.
    pub async fn episodes_by_date_desc(&self) -> Result<Vec<Episode>, DatabaseError> {
        let sql = format!("{SELECT_EPISODE_COLUMNS} ORDER BY pubdate DESC, url ASC");
        let rows = sqlx::query_as::<_, EpisodeDbRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(EpisodeDbRow::into_episode).collect()
    }

    /// Look up a single episode by url.
    pub async fn get_episode(&self, url: &str) -> Result<Option<Episode>, DatabaseError> {
        let sql = format!("{SELECT_EPISODE_COLUMNS} WHERE url = ?");
        let row = sqlx::query_as::<_, EpisodeDbRow>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.map(EpisodeDbRow::into_episode).transpose()
    }

    pub async fn episode_count(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(row.0)
    }
}
