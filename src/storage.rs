//! SQLite persistence for playlists, channels, guide sources and programmes
//!
//! Every public operation opens its own short-lived connection, so nothing is
//! atomic across calls. The database runs in WAL mode: readers (now/next
//! polling) keep working while a bulk guide load holds the write lock, and
//! bulk loads commit in chunks to keep each write transaction short.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Channel, EpgSource, Playlist, Program};

/// Programmes per insert transaction
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Row cap for guide window queries
pub const DEFAULT_GUIDE_LIMIT: usize = 2000;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        epg_url TEXT,
        created_at TEXT DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
        name TEXT,
        group_title TEXT,
        tvg_id TEXT,
        url TEXT,
        extinf TEXT,
        options TEXT NOT NULL DEFAULT '[]'
    );

    CREATE INDEX IF NOT EXISTS idx_channels_playlist ON channels(playlist_id);
    CREATE INDEX IF NOT EXISTS idx_channels_tvgid ON channels(tvg_id);

    CREATE TABLE IF NOT EXISTS epg_sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS epg_programs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tvg_id TEXT NOT NULL,
        start_ts INTEGER NOT NULL,
        stop_ts INTEGER NOT NULL,
        title TEXT,
        description TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_epg_tvg_start ON epg_programs(tvg_id, start_ts);
"#;

const PROGRAM_COLUMNS: &str = "tvg_id, start_ts, stop_ts, title, description";

/// Handle on the database file. Cheap to clone and share between threads.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Path {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self { db_path };
        store.connect()?.execute_batch(SCHEMA)?;
        debug!(path = %store.db_path.display(), "store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // switching modes needs a write lock; skip it once the file is WAL
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    // Playlists + channels

    pub fn add_playlist(&self, name: &str, url: &str) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO playlists (name, url) VALUES (?1, ?2)",
            params![name, url],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first
    pub fn list_playlists(&self) -> Result<Vec<Playlist>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, name, url, epg_url FROM playlists ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Playlist {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
                epg_url: row.get(3)?,
            })
        })?;

        let mut playlists = Vec::new();
        for playlist in rows {
            playlists.push(playlist?);
        }
        Ok(playlists)
    }

    pub fn update_playlist(&self, playlist_id: i64, name: &str, url: &str) -> Result<(), StoreError> {
        self.connect()?.execute(
            "UPDATE playlists SET name = ?1, url = ?2 WHERE id = ?3",
            params![name, url, playlist_id],
        )?;
        Ok(())
    }

    pub fn set_playlist_epg_url(&self, playlist_id: i64, epg_url: Option<&str>) -> Result<(), StoreError> {
        self.connect()?.execute(
            "UPDATE playlists SET epg_url = ?1 WHERE id = ?2",
            params![epg_url, playlist_id],
        )?;
        Ok(())
    }

    /// Remove a playlist and, through the foreign key, its channels.
    /// Unknown ids are a no-op.
    pub fn delete_playlist(&self, playlist_id: i64) -> Result<(), StoreError> {
        self.connect()?
            .execute("DELETE FROM playlists WHERE id = ?1", params![playlist_id])?;
        Ok(())
    }

    /// Atomically swap the whole channel set of a playlist
    pub fn replace_channels(&self, playlist_id: i64, channels: &[Channel]) -> Result<(), StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM channels WHERE playlist_id = ?1", params![playlist_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO channels (playlist_id, name, group_title, tvg_id, url, extinf, options)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for c in channels {
                let options = serde_json::to_string(&c.options)?;
                stmt.execute(params![
                    playlist_id,
                    c.name,
                    c.group,
                    c.tvg_id,
                    c.url,
                    c.extinf,
                    options
                ])?;
            }
        }
        tx.commit()?;
        debug!(playlist_id, count = channels.len(), "channels replaced");
        Ok(())
    }

    /// Channels of a playlist in insertion order
    pub fn get_channels(&self, playlist_id: i64) -> Result<Vec<Channel>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name, group_title, tvg_id, url, extinf, options
             FROM channels
             WHERE playlist_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![playlist_id], |row| {
            let channel = Channel {
                name: text(row, 0)?,
                group: text(row, 1)?,
                tvg_id: text(row, 2)?,
                url: text(row, 3)?,
                extinf: text(row, 4)?,
                options: Vec::new(),
            };
            Ok((channel, text(row, 5)?))
        })?;

        let mut channels = Vec::new();
        for row in rows {
            let (mut channel, options) = row?;
            if !options.is_empty() {
                channel.options = serde_json::from_str(&options)?;
            }
            channels.push(channel);
        }
        Ok(channels)
    }

    /// Distinct non-empty tvg-ids of a playlist, first-seen order
    pub fn playlist_tvg_ids(&self, playlist_id: i64) -> Result<Vec<String>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT tvg_id FROM channels
             WHERE playlist_id = ?1 AND tvg_id IS NOT NULL AND tvg_id <> ''
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![playlist_id], |row| row.get::<_, String>(0))?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in rows {
            let id = id?;
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    // Guide sources

    pub fn add_epg_source(&self, name: &str, url: &str, enabled: bool) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO epg_sources (name, url, enabled) VALUES (?1, ?2, ?3)",
            params![name, url, enabled],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first
    pub fn list_epg_sources(&self, enabled_only: bool) -> Result<Vec<EpgSource>, StoreError> {
        let conn = self.connect()?;
        let sql = if enabled_only {
            "SELECT id, name, url, enabled FROM epg_sources WHERE enabled = 1 ORDER BY id DESC"
        } else {
            "SELECT id, name, url, enabled FROM epg_sources ORDER BY id DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(EpgSource {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
                enabled: row.get(3)?,
            })
        })?;

        let mut sources = Vec::new();
        for source in rows {
            sources.push(source?);
        }
        Ok(sources)
    }

    pub fn set_epg_source_enabled(&self, source_id: i64, enabled: bool) -> Result<(), StoreError> {
        self.connect()?.execute(
            "UPDATE epg_sources SET enabled = ?1 WHERE id = ?2",
            params![enabled, source_id],
        )?;
        Ok(())
    }

    // Programmes

    /// Delete every programme
    pub fn clear_epg(&self) -> Result<(), StoreError> {
        self.connect()?.execute("DELETE FROM epg_programs", [])?;
        Ok(())
    }

    /// Append programmes, committing every `chunk_size` rows (a chunk size of
    /// 0 is treated as 1). Nothing is deduplicated; call [`Store::clear_epg`]
    /// first for replace semantics. Returns the number of rows inserted.
    pub fn upsert_epg_programs<I>(&self, programs: I, chunk_size: usize) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = Program>,
    {
        let chunk_size = chunk_size.max(1);
        let mut conn = self.connect()?;
        let mut buf: Vec<Program> = Vec::with_capacity(chunk_size.min(DEFAULT_CHUNK_SIZE));
        let mut inserted = 0;

        for program in programs {
            buf.push(program);
            if buf.len() >= chunk_size {
                inserted += insert_programs(&mut conn, &buf)?;
                buf.clear();
            }
        }
        if !buf.is_empty() {
            inserted += insert_programs(&mut conn, &buf)?;
        }

        debug!(inserted, chunk_size, "programmes inserted");
        Ok(inserted)
    }

    /// `clear_epg` followed by `upsert_epg_programs`. Not atomic as a pair.
    pub fn replace_epg_programs<I>(&self, programs: I, chunk_size: usize) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = Program>,
    {
        self.clear_epg()?;
        self.upsert_epg_programs(programs, chunk_size)
    }

    pub fn epg_program_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .connect()?
            .query_row("SELECT COUNT(*) FROM epg_programs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Programme airing at `now_ts` (latest start wins on overlap) and the
    /// first one starting after it. Matching on `tvg_id` is exact.
    pub fn get_now_next(
        &self,
        tvg_id: &str,
        now_ts: i64,
    ) -> Result<(Option<Program>, Option<Program>), StoreError> {
        let conn = self.connect()?;

        let now = conn
            .query_row(
                &format!(
                    "SELECT {PROGRAM_COLUMNS} FROM epg_programs
                     WHERE tvg_id = ?1 AND start_ts <= ?2 AND stop_ts > ?2
                     ORDER BY start_ts DESC
                     LIMIT 1"
                ),
                params![tvg_id, now_ts],
                program_from_row,
            )
            .optional()?;

        let next = conn
            .query_row(
                &format!(
                    "SELECT {PROGRAM_COLUMNS} FROM epg_programs
                     WHERE tvg_id = ?1 AND start_ts > ?2
                     ORDER BY start_ts ASC
                     LIMIT 1"
                ),
                params![tvg_id, now_ts],
                program_from_row,
            )
            .optional()?;

        Ok((now, next))
    }

    /// Programmes of `tvg_id` overlapping `[window_start, window_stop)`,
    /// by start time, at most `limit` rows
    pub fn list_epg_programs(
        &self,
        tvg_id: &str,
        window_start: i64,
        window_stop: i64,
        limit: usize,
    ) -> Result<Vec<Program>, StoreError> {
        if tvg_id.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROGRAM_COLUMNS} FROM epg_programs
             WHERE tvg_id = ?1 AND stop_ts > ?2 AND start_ts < ?3
             ORDER BY start_ts ASC
             LIMIT ?4"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![tvg_id, window_start, window_stop, limit],
            program_from_row,
        )?;

        let mut programs = Vec::new();
        for program in rows {
            programs.push(program?);
        }
        Ok(programs)
    }
}

fn insert_programs(conn: &mut Connection, programs: &[Program]) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO epg_programs ({PROGRAM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?;
        for p in programs {
            stmt.execute(params![p.tvg_id, p.start, p.stop, p.title, p.desc])?;
        }
    }
    tx.commit()?;
    Ok(programs.len())
}

fn program_from_row(row: &Row<'_>) -> rusqlite::Result<Program> {
    Ok(Program {
        tvg_id: row.get(0)?,
        start: row.get(1)?,
        stop: row.get(2)?,
        title: text(row, 3)?,
        desc: text(row, 4)?,
    })
}

/// Nullable text column as a plain string
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
