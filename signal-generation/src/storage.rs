// Signal Storage Interface
// Holds the latest published signal for notification consumers

use async_trait::async_trait;
use common::Signal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest-signal slot shared between the analysis cycle and its readers
///
/// A publish replaces the whole record; readers see either the previous or
/// the new signal, never a mix.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Replace the latest signal
    async fn publish(&self, signal: Arc<Signal>);

    /// Latest published signal, if any cycle succeeded yet
    async fn latest(&self) -> Option<Arc<Signal>>;

    /// Number of signals published so far
    async fn published(&self) -> u64;
}

/// In-memory latest-signal slot
#[derive(Default)]
pub struct InMemorySignalStore {
    latest: RwLock<Option<Arc<Signal>>>,
    published: AtomicU64,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn publish(&self, signal: Arc<Signal>) {
        let mut latest = self.latest.write().await;
        *latest = Some(signal);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    async fn latest(&self) -> Option<Arc<Signal>> {
        self.latest.read().await.clone()
    }

    async fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
