//! Database module for persistent storage of scan results

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ErrorDescriptor, Result};
use crate::models::{FileRecord, ScanResult};
use crate::sink::ResultSink;
use crate::throttle::ThrottlePolicy;

/// Summary row for a stored scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRow {
    pub id: i64,
    pub root: String,
    pub root_name: String,
    pub location: String,
    pub state: String,
    pub processed: u64,
    pub dirs_visited: u64,
    pub duration_ms: u64,
    pub saved_at: String,
}

/// Database manager for scan results
pub struct ScanDatabase {
    conn: Connection,
    label: String,
}

impl ScanDatabase {
    /// Open or create database
    pub fn open(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            label: path.to_string_lossy().to_string(),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            label: ":memory:".to_string(),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root TEXT NOT NULL,
                root_name TEXT NOT NULL,
                location TEXT NOT NULL,
                state TEXT NOT NULL,
                processed INTEGER NOT NULL,
                dirs_visited INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                saved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                scan_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                extension TEXT NOT NULL,
                file_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                folder TEXT NOT NULL,
                folders TEXT NOT NULL,
                created TEXT,
                modified TEXT,
                author TEXT,
                PRIMARY KEY (scan_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_files_type ON files(file_type);
            CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);

            CREATE TABLE IF NOT EXISTS scan_errors (
                scan_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                path TEXT NOT NULL,
                operation TEXT NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                PRIMARY KEY (scan_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_scan_errors_kind ON scan_errors(kind);
            ",
        )?;
        Ok(())
    }

    /// Store a scan with its records and errors in one transaction
    pub fn save_result(&mut self, result: &ScanResult) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO scans (root, root_name, location, state, processed, dirs_visited, duration_ms, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.root.to_string_lossy(),
                result.root_name,
                result.location.as_str(),
                result.state.as_str(),
                result.processed as i64,
                result.dirs_visited as i64,
                result.duration_ms as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let scan_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO files
                 (scan_id, seq, path, name, extension, file_type, size, folder, folders, created, modified, author)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for (seq, record) in result.records.iter().enumerate() {
                stmt.execute(params![
                    scan_id,
                    seq as i64,
                    record.path.to_string_lossy(),
                    record.name,
                    record.extension,
                    record.file_type.as_str(),
                    record.size as i64,
                    record.folder.to_string_lossy(),
                    serde_json::to_string(&record.folders)?,
                    record.created.map(|t| t.to_rfc3339()),
                    record.modified.map(|t| t.to_rfc3339()),
                    record.author,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO scan_errors (scan_id, seq, path, operation, kind, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (seq, error) in result.errors.iter().enumerate() {
                stmt.execute(params![
                    scan_id,
                    seq as i64,
                    error.path.to_string_lossy(),
                    error.operation.as_str(),
                    error.kind.as_str(),
                    error.message,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!(
            "Saved scan {} ({} records, {} errors) to {}",
            scan_id,
            result.records.len(),
            result.errors.len(),
            self.label
        );
        Ok(scan_id)
    }

    /// Get a stored scan
    pub fn get_scan(&self, scan_id: i64) -> SqliteResult<Option<ScanRow>> {
        self.conn
            .query_row(
                "SELECT id, root, root_name, location, state, processed, dirs_visited, duration_ms, saved_at
                 FROM scans WHERE id = ?1",
                [scan_id],
                |row| {
                    Ok(ScanRow {
                        id: row.get(0)?,
                        root: row.get(1)?,
                        root_name: row.get(2)?,
                        location: row.get(3)?,
                        state: row.get(4)?,
                        processed: row.get::<_, i64>(5)? as u64,
                        dirs_visited: row.get::<_, i64>(6)? as u64,
                        duration_ms: row.get::<_, i64>(7)? as u64,
                        saved_at: row.get(8)?,
                    })
                },
            )
            .optional()
    }

    /// Most recent completed scan of `root`
    pub fn latest_completed(&self, root: &str) -> SqliteResult<Option<ScanRow>> {
        self.conn
            .query_row(
                "SELECT id FROM scans WHERE root = ?1 AND state = 'completed' ORDER BY id DESC LIMIT 1",
                [root],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map_or(Ok(None), |id| self.get_scan(id))
    }

    /// Rebuild a stored scan as a [`ScanResult`]
    pub fn load_result(&self, scan_id: i64) -> SqliteResult<Option<ScanResult>> {
        let Some(scan) = self.get_scan(scan_id)? else {
            return Ok(None);
        };
        let location = text_enum(&scan.location, 3)?;
        Ok(Some(ScanResult {
            root: PathBuf::from(&scan.root),
            root_name: scan.root_name,
            location,
            throttle: ThrottlePolicy::for_class(location),
            state: text_enum(&scan.state, 4)?,
            records: self.load_records(scan_id)?,
            errors: self.load_errors(scan_id)?,
            processed: scan.processed,
            dirs_visited: scan.dirs_visited,
            duration_ms: scan.duration_ms,
        }))
    }

    /// Roots with stored scans, most recently saved first, with their newest scan id
    pub fn roots_by_recency(&self) -> SqliteResult<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT root, MAX(id) AS newest FROM scans GROUP BY root ORDER BY newest DESC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        rows.collect()
    }

    /// Delete every scan of `root` except `keep`
    pub fn delete_root(&mut self, root: &str, keep: Option<i64>) -> SqliteResult<usize> {
        self.conn.execute(
            "DELETE FROM scans WHERE root = ?1 AND id != ?2",
            params![root, keep.unwrap_or(-1)],
        )
    }

    /// Delete every stored scan
    pub fn clear(&mut self) -> SqliteResult<usize> {
        self.conn.execute("DELETE FROM scans", [])
    }

    /// Total stored file records across all scans
    pub fn total_file_count(&self) -> SqliteResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Load the records of a scan in traversal order
    pub fn load_records(&self, scan_id: i64) -> SqliteResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, name, extension, file_type, size, folder, folders, created, modified, author
             FROM files WHERE scan_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([scan_id], |row| {
            Ok(FileRecord {
                path: PathBuf::from(row.get::<_, String>(0)?),
                name: row.get(1)?,
                extension: row.get(2)?,
                file_type: json_column(row, 3)?,
                size: row.get::<_, i64>(4)? as u64,
                folder: PathBuf::from(row.get::<_, String>(5)?),
                folders: serde_json::from_str(&row.get::<_, String>(6)?)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
                created: time_column(row, 7)?,
                modified: time_column(row, 8)?,
                author: row.get(9)?,
            })
        })?;
        rows.collect()
    }

    /// Load the errors of a scan in the order they were recorded
    pub fn load_errors(&self, scan_id: i64) -> SqliteResult<Vec<ErrorDescriptor>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, operation, kind, message FROM scan_errors WHERE scan_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([scan_id], |row| {
            Ok(ErrorDescriptor {
                path: PathBuf::from(row.get::<_, String>(0)?),
                operation: json_column(row, 1)?,
                kind: json_column(row, 2)?,
                message: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Get stored scan count
    pub fn scan_count(&self) -> SqliteResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Get file count for a scan
    pub fn file_count(&self, scan_id: i64) -> SqliteResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE scan_id = ?1",
            [scan_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Get per file type counts for a scan
    pub fn get_type_counts(&self, scan_id: i64) -> SqliteResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_type, COUNT(*) FROM files WHERE scan_id = ?1 GROUP BY file_type")?;

        let rows = stmt.query_map([scan_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (file_type, count) = row?;
            counts.insert(file_type, count);
        }
        Ok(counts)
    }

    /// Get per error kind counts for a scan
    pub fn get_error_counts(&self, scan_id: i64) -> SqliteResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM scan_errors WHERE scan_id = ?1 GROUP BY kind")?;

        let rows = stmt.query_map([scan_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (kind, count) = row?;
            counts.insert(kind, count);
        }
        Ok(counts)
    }

    /// Delete a stored scan with its files and errors
    pub fn delete_scan(&mut self, scan_id: i64) -> SqliteResult<bool> {
        let deleted = self.conn.execute("DELETE FROM scans WHERE id = ?1", [scan_id])?;
        Ok(deleted > 0)
    }
}

impl ResultSink for ScanDatabase {
    fn write(&mut self, result: &ScanResult) -> Result<String> {
        let scan_id = self.save_result(result)?;
        Ok(format!("{}#scan={}", self.label, scan_id))
    }
}

/// Decode a snake_case enum stored as plain text
fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> SqliteResult<T> {
    let text: String = row.get(idx)?;
    text_enum(&text, idx)
}

fn text_enum<T: serde::de::DeserializeOwned>(text: &str, idx: usize) -> SqliteResult<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> SqliteResult<Option<DateTime<Utc>>> {
    let Some(text) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&text)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
