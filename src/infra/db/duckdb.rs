//! Embedded DuckDB backend behind the `duckdb` cargo feature.

use std::sync::Mutex;

use duckdb::types::ValueRef;
use duckdb::{AccessMode, Config};
use tracing::{debug, warn};

use super::{Connection, ConnectionError, Row};
use crate::cache::lock::mutex_lock;

/// Read-only connection to an on-disk (or in-memory) DuckDB database.
///
/// The underlying handle is not `Sync`, so it sits behind a mutex; catalog
/// traffic is introspection-only and never contends on the serving path.
pub struct DuckdbConnection {
    inner: Mutex<duckdb::Connection>,
}

impl DuckdbConnection {
    /// Opens `path` and loads the spatial extension. `:memory:` opens a
    /// fresh in-memory database, which is mainly useful for smoke testing.
    pub fn open(path: &str) -> Result<Self, ConnectionError> {
        let conn = if path == ":memory:" {
            duckdb::Connection::open_in_memory()
        } else {
            let config = Config::default()
                .access_mode(AccessMode::ReadOnly)
                .map_err(|err| ConnectionError::Open {
                    path: path.to_string(),
                    reason: err.to_string(),
                })?;
            duckdb::Connection::open_with_flags(path, config)
        }
        .map_err(|err| ConnectionError::Open {
            path: path.to_string(),
            reason: err.to_string(),
        })?;

        if let Err(err) = conn.execute_batch("INSTALL spatial; LOAD spatial;") {
            debug!(error = %err, "spatial extension install skipped");
            if let Err(err) = conn.execute_batch("LOAD spatial;") {
                warn!(
                    error = %err,
                    "spatial extension unavailable; geometry probes will fail"
                );
            }
        }

        Ok(Self {
            inner: Mutex::new(conn),
        })
    }
}

impl Connection for DuckdbConnection {
    fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError> {
        let conn = mutex_lock(&self.inner, "db::duckdb", "query");
        let mut stmt = conn
            .prepare(sql)
            .map_err(|err| ConnectionError::query(err.to_string()))?;
        let mut rows = stmt
            .query([])
            .map_err(|err| ConnectionError::query(err.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|err| ConnectionError::query(err.to_string()))?
        {
            let width = row.as_ref().column_count();
            let mut rendered = Row::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|err| ConnectionError::query(err.to_string()))?;
                rendered.push(render_value(value));
            }
            out.push(rendered);
        }
        Ok(out)
    }
}

fn render_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Boolean(v) => Some(v.to_string()),
        ValueRef::TinyInt(v) => Some(v.to_string()),
        ValueRef::SmallInt(v) => Some(v.to_string()),
        ValueRef::Int(v) => Some(v.to_string()),
        ValueRef::BigInt(v) => Some(v.to_string()),
        ValueRef::HugeInt(v) => Some(v.to_string()),
        ValueRef::UTinyInt(v) => Some(v.to_string()),
        ValueRef::USmallInt(v) => Some(v.to_string()),
        ValueRef::UInt(v) => Some(v.to_string()),
        ValueRef::UBigInt(v) => Some(v.to_string()),
        ValueRef::Float(v) => Some(v.to_string()),
        ValueRef::Double(v) => Some(v.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        other => Some(format!("{other:?}")),
    }
}
