use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use futures::StreamExt;

use super::{IndicatorSource, RowStream, ScanError};
use crate::validate::RawIndicator;

/// One scripted scan step.
#[derive(Debug, Clone)]
pub enum MockRow {
    Row(RawIndicator),
    /// A row that fails to decode.
    Bad(String),
    /// The connection drops here.
    Disconnect(String),
}

/// A scripted source for tests. Every scan replays the same rows.
pub struct MockSource {
    rows: Vec<MockRow>,
    unreachable: Option<String>,
}

impl MockSource {
    pub fn new(rows: Vec<MockRow>) -> Self {
        Self {
            rows,
            unreachable: None,
        }
    }

    /// A source whose scan cannot even start.
    pub fn unreachable(reason: &str) -> Self {
        Self {
            rows: Vec::new(),
            unreachable: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl IndicatorSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn scan(&self) -> Result<RowStream> {
        if let Some(reason) = &self.unreachable {
            bail!("{reason}");
        }
        let items: Vec<_> = self
            .rows
            .iter()
            .cloned()
            .map(|row| match row {
                MockRow::Row(raw) => Ok(raw),
                MockRow::Bad(reason) => Err(ScanError::Row(reason)),
                MockRow::Disconnect(reason) => Err(ScanError::Source(anyhow!(reason))),
            })
            .collect();
        // A real cursor yields nothing after the connection drops.
        let cut = items
            .iter()
            .position(|i| matches!(i, Err(ScanError::Source(_))))
            .map_or(items.len(), |p| p + 1);
        Ok(futures::stream::iter(items.into_iter().take(cut)).boxed())
    }
}
