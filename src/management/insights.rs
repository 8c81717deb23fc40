use std::{path::Path, sync::Mutex};

use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    config, debug,
    error::CacheError,
    types::InsightKey,
    warning,
};

/// Exact-match store of generated insights.
///
/// Implementations swallow their own failures: a broken store behaves like
/// an empty one and never blocks generation.
pub trait InsightStore: Send + Sync {
    fn get(&self, key: &InsightKey) -> Option<String>;

    /// Inserts or replaces the insight stored for `key`.
    fn put(&self, key: &InsightKey, insight: &str);
}

/// SQLite-backed insight cache.
///
/// Entries are never evicted. When the database cannot be opened the cache
/// runs in cache-less mode: every lookup misses and writes are dropped.
pub struct InsightCache {
    conn: Option<Mutex<Connection>>,
}

impl InsightCache {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> Self {
        match Self::try_open(path) {
            Ok(conn) => {
                debug!("Insight cache at {}", path.display());
                Self::with_connection(conn)
            }
            Err(e) => {
                warning!(
                    "Insight cache unavailable at {}, continuing without it: {}",
                    path.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    /// Opens the database in the local data directory.
    pub fn open_default() -> Self {
        Self::open(&config::insights_db_path())
    }

    /// Volatile cache, gone when dropped.
    pub fn in_memory() -> Self {
        match Connection::open_in_memory()
            .map_err(CacheError::from)
            .and_then(|conn| {
                initialize_schema(&conn)?;
                Ok(conn)
            }) {
            Ok(conn) => Self::with_connection(conn),
            Err(e) => {
                warning!("In-memory insight cache unavailable: {}", e);
                Self::disabled()
            }
        }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        InsightCache { conn: None }
    }

    /// False when the database could not be opened and every lookup misses.
    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Every cached insight, ordered by artist, album and track.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] in cache-less mode, or the
    /// underlying database error.
    pub fn entries(&self) -> Result<Vec<(InsightKey, String)>, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT track, artist, album, insight FROM TrackInsights
             ORDER BY artist, album, track",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                InsightKey {
                    track: row.get(0)?,
                    artist: row.get(1)?,
                    album: row.get(2)?,
                },
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn try_open(path: &Path) -> Result<Connection, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(conn)
    }

    fn with_connection(conn: Connection) -> Self {
        InsightCache {
            conn: Some(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        let conn = self.conn.as_ref().ok_or(CacheError::Unavailable)?;
        // a panic while holding the lock leaves the connection itself intact
        Ok(conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn try_get(&self, key: &InsightKey) -> Result<Option<String>, CacheError> {
        let conn = self.lock()?;
        let insight = conn
            .query_row(
                "SELECT insight FROM TrackInsights
                 WHERE track = ?1 AND artist = ?2 AND album = ?3",
                params![key.track, key.artist, key.album],
                |row| row.get(0),
            )
            .optional()?;
        Ok(insight)
    }

    fn try_put(&self, key: &InsightKey, insight: &str) -> Result<(), CacheError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO TrackInsights (track, artist, album, insight)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.track, key.artist, key.album, insight],
        )?;
        Ok(())
    }
}

impl InsightStore for InsightCache {
    fn get(&self, key: &InsightKey) -> Option<String> {
        match self.try_get(key) {
            Ok(insight) => insight,
            Err(CacheError::Unavailable) => None,
            Err(e) => {
                warning!("Insight cache lookup failed: {}", e);
                None
            }
        }
    }

    fn put(&self, key: &InsightKey, insight: &str) {
        match self.try_put(key, insight) {
            Ok(()) | Err(CacheError::Unavailable) => {}
            Err(e) => warning!("Insight cache write failed: {}", e),
        }
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS TrackInsights (
            track TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            insight TEXT NOT NULL,
            PRIMARY KEY (track, artist, album)
        )",
        [],
    )?;
    Ok(())
}
