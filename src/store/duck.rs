// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! DuckDB binding.
//!
//! Note: This module requires the `duckdb` feature (enabled by default).
//!
//! One database instance is opened per store. Sessions are cloned connections
//! of that instance, so in-memory databases are shared between workers.
//! DuckDB uses optimistic concurrency: two units of work updating the same
//! row fail the later one with a transaction conflict, which surfaces as
//! [`TpccError::Conflict`]. Bulk inserts go through the appender.

use std::path::Path;

use duckdb::types::Value;
use duckdb::{appender_params_from_iter, params_from_iter, Connection};
use parking_lot::Mutex;

use super::sql::{SqlConnection, SqlRow, SqlSession, SqlValue};
use super::{Layout, WorkloadStore};
use crate::error::{Result, TpccError};

const ENGINE: &str = "duckdb";

/// DuckDB store backed by a file or by memory.
pub struct DuckStore {
    conn: Mutex<Connection>,
    layout: Layout,
}

impl DuckStore {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, layout: Layout) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(map_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            layout,
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(layout: Layout) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            layout,
        })
    }
}

impl WorkloadStore for DuckStore {
    type Session = SqlSession<DuckConnection>;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn layout(&self) -> Layout {
        self.layout
    }

    fn open_session(&self) -> Result<Self::Session> {
        let conn = self.conn.lock().try_clone().map_err(map_err)?;
        Ok(SqlSession::new(DuckConnection { conn }, self.layout))
    }
}

/// One DuckDB connection.
pub struct DuckConnection {
    conn: Connection,
}

fn map_err(err: duckdb::Error) -> TpccError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("conflict") || lower.contains("could not commit") {
        TpccError::Conflict(message)
    } else {
        TpccError::Backend {
            engine: ENGINE,
            message,
        }
    }
}

fn to_duck(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Int(v) => Value::BigInt(*v),
        SqlValue::Real(v) => Value::Double(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
    }
}

fn from_duck(value: Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(v) => SqlValue::Int(i64::from(v)),
        Value::TinyInt(v) => SqlValue::Int(i64::from(v)),
        Value::SmallInt(v) => SqlValue::Int(i64::from(v)),
        Value::Int(v) => SqlValue::Int(i64::from(v)),
        Value::BigInt(v) => SqlValue::Int(v),
        Value::UTinyInt(v) => SqlValue::Int(i64::from(v)),
        Value::USmallInt(v) => SqlValue::Int(i64::from(v)),
        Value::UInt(v) => SqlValue::Int(i64::from(v)),
        Value::UBigInt(v) => SqlValue::Int(
            i64::try_from(v).map_err(|_| TpccError::Decode(format!("{v} overflows i64")))?,
        ),
        Value::HugeInt(v) => SqlValue::Int(
            i64::try_from(v).map_err(|_| TpccError::Decode(format!("{v} overflows i64")))?,
        ),
        Value::Float(v) => SqlValue::Real(f64::from(v)),
        Value::Double(v) => SqlValue::Real(v),
        Value::Text(v) => SqlValue::Text(v),
        other => {
            return Err(TpccError::Decode(format!(
                "unsupported duckdb value {other:?}"
            )))
        }
    })
}

impl SqlConnection for DuckConnection {
    const BEGIN: &'static str = "BEGIN TRANSACTION";

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_err)?;
        stmt.execute(params_from_iter(params.iter().map(to_duck)))
            .map_err(map_err)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue], columns: usize) -> Result<Vec<SqlRow>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_err)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_duck)))
            .map_err(map_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_err)? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                let value: Value = row.get(i).map_err(map_err)?;
                values.push(from_duck(value)?);
            }
            out.push(SqlRow::new(values));
        }
        Ok(out)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(map_err)
    }

    fn insert_rows(&mut self, table: &str, _columns: &str, rows: Vec<Vec<SqlValue>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut appender = self.conn.appender(table).map_err(map_err)?;
        for row in &rows {
            appender
                .append_row(appender_params_from_iter(row.iter().map(to_duck)))
                .map_err(map_err)?;
        }
        appender.flush().map_err(map_err)
    }
}
