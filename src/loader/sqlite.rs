use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use rusqlite::Connection;
use rusqlite::types::ValueRef;

use super::{INDICATOR_COLUMNS, IndicatorSource, RowStream, ScanError};
use crate::consts::INDICATOR_TABLE;
use crate::validate::RawIndicator;

/// SQLite-backed indicator source, for local runs without PostgreSQL.
/// Reads the same table and columns.
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open indicator database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn read_all(&self) -> Result<Vec<Result<RawIndicator, ScanError>>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn
            .prepare(&format!("SELECT {INDICATOR_COLUMNS} FROM {INDICATOR_TABLE}"))
            .context("failed to query indicators")?;
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().context("indicator scan interrupted")? {
            out.push(decode(row).map_err(|e| ScanError::Row(e.to_string())));
        }
        Ok(out)
    }
}

/// Dates are often stored as integers (`202310`); accept any scalar.
fn text_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<String> {
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(i) => Ok(i.to_string()),
        ValueRef::Real(f) => Ok(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => row.get(idx),
    }
}

fn decode(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIndicator> {
    Ok(RawIndicator {
        region_code: text_column(row, 0)?,
        sub_region: text_column(row, 1)?,
        value_region: row.get(2)?,
        value_macro_region: row.get(3)?,
        value_national: row.get(4)?,
        reference_date: text_column(row, 5)?,
        updated_date: text_column(row, 6)?,
    })
}

#[async_trait]
impl IndicatorSource for SqliteSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn scan(&self) -> Result<RowStream> {
        let rows = self.read_all()?;
        Ok(futures::stream::iter(rows).boxed())
    }
}
