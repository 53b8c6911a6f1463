//! Durable per-destination manifest: a small metadata map plus the piece
//! table, backed by SQLite (spec §4.1).
//!
//! Named by appending `.zdm.db` to the destination's existing filename
//! (`movie.mp4` -> `movie.mp4.zdm.db`), matching the original Python
//! implementation this crate generalizes (`Path.with_suffix` applied to
//! the full suffix rather than replacing it).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::piece::{Piece, PieceStatus};

pub struct Manifest {
    conn: Mutex<Connection>,
}

/// Returns the manifest path for a given destination file.
pub fn manifest_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".zdm.db");
    dest.with_file_name(name)
}

impl Manifest {
    /// Open or create the manifest store next to `dest`.
    pub fn open(dest: &Path) -> Result<Self, rusqlite::Error> {
        let path = manifest_path(dest);
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pieces (
                idx INTEGER PRIMARY KEY,
                start INTEGER NOT NULL,
                end INTEGER NOT NULL,
                sha256 TEXT,
                status TEXT NOT NULL,
                last_url TEXT
            );",
        )
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Upsert a single piece row. Commits before returning (SQLite's
    /// default auto-commit already guarantees this per statement).
    pub fn replace_piece(&self, piece: &Piece) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO pieces (idx, start, end, sha256, status, last_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                piece.idx as i64,
                piece.start as i64,
                piece.end as i64,
                piece.sha256,
                piece.status.as_str(),
                piece.last_url,
            ],
        )?;
        Ok(())
    }

    pub fn load_pieces(&self) -> Result<Vec<Piece>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT idx, start, end, sha256, status, last_url FROM pieces ORDER BY idx",
        )?;
        let rows = stmt.query_map([], |row| {
            let idx: i64 = row.get(0)?;
            let start: i64 = row.get(1)?;
            let end: i64 = row.get(2)?;
            let sha256: Option<String> = row.get(3)?;
            let status: String = row.get(4)?;
            let last_url: Option<String> = row.get(5)?;
            Ok(Piece {
                idx: idx as u64,
                start: start as u64,
                end: end as u64,
                sha256,
                status: PieceStatus::parse(&status),
                last_url,
            })
        })?;
        rows.collect()
    }
}
