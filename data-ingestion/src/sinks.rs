//! Append-only JSON-lines persistence for streamed events and order books

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DepthSnapshot, Event, PersistenceError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Destination for drained event batches
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persist one `(channel, symbol)` batch in arrival order
    async fn persist(
        &self,
        channel: &str,
        symbol: &str,
        batch: &[Event],
        drained_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
}

/// Writes each batch to `<dir>/<channel>-<symbol>-<YYYYMM>.txt`
///
/// The monthly rotation key is taken from the drain time, not from the events.
pub struct JsonlEventSink {
    dir: PathBuf,
}

impl JsonlEventSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_path(&self, channel: &str, symbol: &str, drained_at: DateTime<Utc>) -> PathBuf {
        let rotate_suffix = drained_at.format("%Y%m");
        self.dir
            .join(format!("{}-{}-{}.txt", channel, symbol, rotate_suffix))
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn persist(
        &self,
        channel: &str,
        symbol: &str,
        batch: &[Event],
        drained_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let path = self.file_path(channel, symbol, drained_at);
        append_lines(&path, batch.iter().map(|e| &e.payload)).await?;
        debug!("📝 Appended {} events to {}", batch.len(), path.display());
        Ok(())
    }
}

/// Appends order book snapshots to `<dir>/depth-<symbol>-<freq>.txt`
pub struct DepthWriter {
    dir: PathBuf,
}

impl DepthWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_path(&self, symbol: &str, freq: &str) -> PathBuf {
        self.dir.join(format!("depth-{}-{}.txt", symbol, freq))
    }

    /// Append every snapshot to its symbol's file, one JSON object per line
    pub async fn store_depth(&self, depths: &[DepthSnapshot], freq: &str) -> Result<(), PersistenceError> {
        for depth in depths {
            let path = self.file_path(&depth.symbol, freq);
            append_lines(&path, std::iter::once(depth)).await?;
        }
        Ok(())
    }
}

/// Serialize records and append them to `path`, creating parent folders on demand
async fn append_lines<'a, T, I>(path: &Path, records: I) -> Result<(), PersistenceError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    // Serialize first so a bad record never leaves a partial batch behind
    let mut lines = String::new();
    for record in records {
        lines.push_str(&serde_json::to_string(record)?);
        lines.push('\n');
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.write_all(lines.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
}
