pub mod mock;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::pipe::PipeClient;
use crate::validate::{LoadRecord, RawIndicator};

/// Columns every store adapter reads, in order.
pub const INDICATOR_COLUMNS: &str = "estado, regiao, valor_uf, valor_regiao, valor_brasil, dt_competencia, dt_atualizacao";

/// Why a scan produced no row.
#[derive(Debug, Error)]
pub enum ScanError {
    /// One row could not be decoded. The scan goes on.
    #[error("unreadable row: {0}")]
    Row(String),
    /// The scan itself broke. Nothing more will come.
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

pub type RowStream = BoxStream<'static, Result<RawIndicator, ScanError>>;

/// A store that can produce every indicator row in one forward pass.
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    fn name(&self) -> &str;
    async fn scan(&self) -> anyhow::Result<RowStream>;
}

/// Counts for one bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// `L` commands written to the engine.
    pub loaded: usize,
    /// Rows dropped because their region code was invalid.
    pub skipped: usize,
    /// Rows the store returned but could not be decoded.
    pub failed: usize,
}

/// A load that stopped early. Whatever was sent before the failure stays
/// in the engine.
#[derive(Debug, Error)]
#[error("bulk load aborted after {} records: {:#}", .report.loaded, .cause)]
pub struct LoadError {
    pub report: LoadReport,
    pub cause: anyhow::Error,
}

/// Stream every row of `source` into engine `generation` as `L` commands.
pub async fn load_all(
    source: &dyn IndicatorSource,
    pipe: &PipeClient,
    generation: u64,
) -> Result<LoadReport, LoadError> {
    let mut report = LoadReport::default();

    let mut rows = match source.scan().await {
        Ok(rows) => rows,
        Err(cause) => return Err(LoadError { report, cause }),
    };

    while let Some(item) = rows.next().await {
        match item {
            Ok(raw) => match LoadRecord::from_raw(&raw) {
                Some(record) => {
                    if let Err(e) = pipe.load(generation, &record).await {
                        return Err(LoadError {
                            report,
                            cause: e.into(),
                        });
                    }
                    report.loaded += 1;
                }
                None => {
                    debug!(region_code = %raw.region_code, "dropping row with invalid region code");
                    report.skipped += 1;
                }
            },
            Err(ScanError::Row(reason)) => {
                warn!(source = source.name(), "skipping row: {}", reason);
                report.failed += 1;
            }
            Err(ScanError::Source(cause)) => return Err(LoadError { report, cause }),
        }
    }

    Ok(report)
}
