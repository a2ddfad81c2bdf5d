// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! SQLite binding.
//!
//! Every session opens its own connection on the shared database file.
//! Units of work start with `BEGIN IMMEDIATE`, so writers serialize on the
//! database lock and wait up to the busy timeout for it. A lock that cannot be
//! acquired in time surfaces as [`TpccError::Conflict`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};

use super::sql::{SqlConnection, SqlRow, SqlSession, SqlValue};
use super::{Layout, WorkloadStore};
use crate::error::{Result, TpccError};

const ENGINE: &str = "sqlite";

/// Default time a session waits for the database lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// File-backed SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    layout: Layout,
    busy_timeout: Duration,
    sync_on_write: bool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>, layout: Layout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            path,
            layout,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            sync_on_write: false,
        };
        // Fail early on an unusable path.
        store.connect()?;
        Ok(store)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Use `synchronous = FULL` instead of `OFF`.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<SqliteConnection> {
        let conn = Connection::open(&self.path).map_err(map_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(map_err)?;
        conn.set_prepared_statement_cache_capacity(64);
        for problem in configure_sqlite(&conn, self.sync_on_write) {
            tracing::warn!(path = %self.path.display(), %problem, "sqlite setting not applied");
        }
        Ok(SqliteConnection { conn })
    }
}

/// Applies the connection pragmas and returns the ones that did not take.
///
/// `journal_mode` reports the mode actually in effect rather than failing,
/// so a database that cannot use WAL shows up here too.
fn configure_sqlite(conn: &Connection, sync_on_write: bool) -> Vec<String> {
    let mut problems = Vec::new();
    match conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0)) {
        Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
        Ok(mode) => problems.push(format!("journal_mode is {mode}, not wal")),
        Err(err) => problems.push(format!("journal_mode: {err}")),
    }
    let synchronous = if sync_on_write {
        "PRAGMA synchronous = FULL"
    } else {
        "PRAGMA synchronous = OFF"
    };
    // 64MB page cache
    for pragma in [synchronous, "PRAGMA cache_size = -64000", "PRAGMA temp_store = MEMORY"] {
        if let Err(err) = conn.execute_batch(pragma) {
            problems.push(format!("{pragma}: {err}"));
        }
    }
    problems
}

impl WorkloadStore for SqliteStore {
    type Session = SqlSession<SqliteConnection>;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn layout(&self) -> Layout {
        self.layout
    }

    fn open_session(&self) -> Result<Self::Session> {
        Ok(SqlSession::new(self.connect()?, self.layout))
    }
}

/// One SQLite connection.
pub struct SqliteConnection {
    conn: Connection,
}

fn map_err(err: rusqlite::Error) -> TpccError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            TpccError::Conflict(err.to_string())
        }
        _ => TpccError::Backend {
            engine: ENGINE,
            message: err.to_string(),
        },
    }
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Int(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) | ValueRef::Blob(v) => {
            SqlValue::Text(String::from_utf8_lossy(v).into_owned())
        }
    }
}

impl SqlConnection for SqliteConnection {
    const BEGIN: &'static str = "BEGIN IMMEDIATE";

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_err)?;
        stmt.execute(params_from_iter(params.iter().map(to_sqlite)))
            .map_err(map_err)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue], columns: usize) -> Result<Vec<SqlRow>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_err)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sqlite)))
            .map_err(map_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_err)? {
            let values = (0..columns)
                .map(|i| row.get_ref(i).map(from_sqlite))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_err)?;
            out.push(SqlRow::new(values));
        }
        Ok(out)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(map_err)
    }
}
