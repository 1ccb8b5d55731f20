use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{decode_pubdate, encode_pubdate, DatabaseError};

/// Columns that legacy catalogs carry under an `itunes_` prefix, with the
/// names used here.
const LEGACY_COLUMNS: [(&str, &str); 6] = [
    ("itunes_author", "author"),
    ("itunes_subtitle", "subtitle"),
    ("itunes_summary", "summary"),
    ("itunes_image", "image"),
    ("itunes_duration", "duration"),
    ("itunes_explicit", "explicit"),
];

// ============================================================================
// Database
// ============================================================================

/// Handle to the episode catalog.
///
/// Constructed once per invocation and passed by reference to every pass.
/// The pool holds a single connection: the catalog is single-writer and
/// every pass runs sequentially.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the catalog and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED).
    /// Returns `DatabaseError::Migration` if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for a competing writer before SQLITE_BUSY
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::InstanceLocked => DatabaseError::InstanceLocked,
            other => DatabaseError::Migration(other.to_string()),
        })?;
        tracing::debug!(path = %path, "Opened episode catalog");
        Ok(db)
    }

    /// Close the pool, waiting for the connection to be released.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create the `episodes` table and its date index, upgrading a legacy
    /// catalog in place.
    ///
    /// An upgrade renames the `itunes_*` columns and rewrites every
    /// `pubdate` that is not already RFC 3339 UTC, so lexical order stays
    /// chronological. Everything runs in one transaction.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('episodes')")
                .fetch_all(&mut *tx)
                .await?;
        let has = |name: &str| columns.iter().any(|c| c == name);
        for (legacy, current) in LEGACY_COLUMNS {
            if has(legacy) && !has(current) {
                sqlx::query(&format!(
                    "ALTER TABLE episodes RENAME COLUMN {legacy} TO {current}"
                ))
                .execute(&mut *tx)
                .await?;
                tracing::info!(from = legacy, to = current, "Renamed legacy catalog column");
            }
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                pubdate TEXT NOT NULL,
                len INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                subtitle TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL DEFAULT '',
                image TEXT NOT NULL DEFAULT '',
                url TEXT PRIMARY KEY,
                type TEXT NOT NULL DEFAULT '',
                guid TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                duration TEXT,
                explicit TEXT NOT NULL DEFAULT ''
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        let legacy_dates: Vec<(String, String)> = sqlx::query_as(
            "SELECT url, pubdate FROM episodes WHERE url IS NOT NULL AND pubdate NOT LIKE '%Z'",
        )
        .fetch_all(&mut *tx)
        .await?;
        for (url, value) in legacy_dates {
            // Unparseable values are left alone and reported when read
            let Some(date) = decode_pubdate(&value) else {
                continue;
            };
            sqlx::query("UPDATE episodes SET pubdate = ? WHERE url = ?")
                .bind(encode_pubdate(&date))
                .bind(&url)
                .execute(&mut *tx)
                .await?;
        }

        // Serves both MAX(pubdate) and the ORDER BY pubdate DESC scan
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_episodes_pubdate ON episodes(pubdate DESC)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::SqlitePool;

    /// Table layout of legacy catalogs (untyped columns).
    const LEGACY_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS episodes
        (pubdate, len integer, title, itunes_author, itunes_subtitle, itunes_summary,
         itunes_image, url PRIMARY KEY, type, guid, description, itunes_duration,
         itunes_explicit)";

    fn temp_catalog(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("kih_schema_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("episodes.db");
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn write_legacy_catalog(path: &str) {
        let pool = SqlitePool::connect(&format!("sqlite:{path}?mode=rwc"))
            .await
            .unwrap();
        sqlx::query(LEGACY_SCHEMA).execute(&pool).await.unwrap();
        for (pubdate, url) in [
            ("2018-01-08 10:00:00+00:00", "http://h/hik_-_rr_2018-01-08.mp3"),
            ("2018-01-09 13:00:00+03:00", "http://h/hik_-_rr_2018-01-09.mp3"),
        ] {
            sqlx::query(
                "INSERT OR REPLACE INTO episodes (pubdate, len, title, itunes_author,
                 itunes_subtitle, itunes_summary, itunes_image, url, type, guid,
                 description, itunes_duration, itunes_explicit)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(pubdate)
            .bind(1234_i64)
            .bind("Кремов и Хрусталев")
            .bind("Radio Record")
            .bind("")
            .bind("")
            .bind("http://h/cover.jpg")
            .bind(url)
            .bind("audio/mpeg")
            .bind(url)
            .bind("")
            .bind("")
            .bind("clean")
            .execute(&pool)
            .await
            .unwrap();
        }
        pool.close().await;
    }

    #[tokio::test]
    async fn test_open_upgrades_legacy_catalog() {
        let path = temp_catalog("legacy_upgrade");
        let path_str = path.to_str().unwrap();
        write_legacy_catalog(path_str).await;

        let db = Database::open(path_str).await.unwrap();

        let episodes = db.episodes_by_date_desc().await.unwrap();
        assert_eq!(episodes.len(), 2);
        // +03:00 is normalised to UTC
        assert_eq!(
            episodes[0].publish_date,
            Utc.with_ymd_and_hms(2018, 1, 9, 10, 0, 0).unwrap()
        );
        assert_eq!(episodes[1].url, "http://h/hik_-_rr_2018-01-08.mp3");
        assert_eq!(episodes[1].author, "Radio Record");
        assert_eq!(episodes[1].image_url, "http://h/cover.jpg");
        assert_eq!(episodes[1].explicitness, "clean");
        assert_eq!(episodes[1].size_bytes, 1234);
        assert_eq!(episodes[1].duration, None);

        let stored: Vec<String> =
            sqlx::query_scalar("SELECT pubdate FROM episodes ORDER BY pubdate")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        assert_eq!(stored, vec!["2018-01-08T10:00:00Z", "2018-01-09T10:00:00Z"]);

        db.close().await;
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_upgraded_catalog_accepts_writes_and_reopens() {
        let path = temp_catalog("legacy_reopen");
        let path_str = path.to_str().unwrap();
        write_legacy_catalog(path_str).await;

        let db = Database::open(path_str).await.unwrap();
        let mut episode = db
            .get_episode("http://h/hik_-_rr_2018-01-08.mp3")
            .await
            .unwrap()
            .unwrap();
        episode.size_bytes = 999;
        db.upsert_episode(&episode).await.unwrap();
        db.close().await;

        // Second open finds the current layout and changes nothing
        let db = Database::open(path_str).await.unwrap();
        assert_eq!(db.episode_count().await.unwrap(), 2);
        let reread = db.get_episode(&episode.url).await.unwrap().unwrap();
        assert_eq!(reread.size_bytes, 999);
        assert_eq!(
            db.latest_publish_date().await.unwrap(),
            Some(Utc.with_ymd_and_hms(2018, 1, 9, 10, 0, 0).unwrap())
        );

        db.close().await;
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
