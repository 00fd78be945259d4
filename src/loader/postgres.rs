//! PostgreSQL indicator source.
//!
//! Opens a fresh connection for every scan; a scan happens once per engine
//! generation so there is nothing to pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, warn};

use super::{IndicatorSource, RowStream, ScanError};
use crate::consts::INDICATOR_TABLE;
use crate::validate::RawIndicator;

/// Indicator values may be stored as NUMERIC and dates as DATE; the casts
/// give the loader one wire type per column regardless.
fn scan_sql() -> String {
    format!(
        "SELECT estado::text, regiao::text, \
                valor_uf::float8, valor_regiao::float8, valor_brasil::float8, \
                dt_competencia::text, dt_atualizacao::text \
         FROM {INDICATOR_TABLE}"
    )
}

pub struct PostgresSource {
    connstr: String,
}

impl PostgresSource {
    /// `connstr` is a libpq-style string, e.g. `"host=localhost dbname=sus user=postgres"`.
    pub fn new(connstr: impl Into<String>) -> Self {
        Self {
            connstr: connstr.into(),
        }
    }
}

fn decode(row: &Row) -> Result<RawIndicator, tokio_postgres::Error> {
    Ok(RawIndicator {
        region_code: row.try_get(0)?,
        sub_region: row.try_get(1)?,
        value_region: row.try_get(2)?,
        value_macro_region: row.try_get(3)?,
        value_national: row.try_get(4)?,
        reference_date: row.try_get(5)?,
        updated_date: row.try_get(6)?,
    })
}

#[async_trait]
impl IndicatorSource for PostgresSource {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn scan(&self) -> Result<RowStream> {
        let (client, connection) = tokio_postgres::connect(&self.connstr, NoTls)
            .await
            .context("failed to connect to indicator database")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("indicator database connection closed with error: {}", e);
            }
        });

        let rows = client
            .query_raw(scan_sql().as_str(), Vec::<String>::new())
            .await
            .context("failed to query indicators")?;
        debug!(table = INDICATOR_TABLE, "indicator scan started");

        // The stream owns the client so the connection lives until the scan ends.
        let stream = rows.map(move |item| {
            let _client = &client;
            match item {
                Ok(row) => decode(&row).map_err(|e| ScanError::Row(e.to_string())),
                Err(e) => Err(ScanError::Source(
                    anyhow::Error::new(e).context("indicator scan interrupted"),
                )),
            }
        });
        Ok(stream.boxed())
    }
}
