//! Ingress queue for streamed exchange events
//!
//! Producers hold a cloneable [`EventSender`]; the single [`EventDrain`]
//! periodically takes everything queued and hands it to a persistence sink
//! grouped by `(channel, symbol)`.
//!
//! The queue is bounded. What happens on overflow is chosen by
//! [`OverflowPolicy`]: `DropNewest` rejects the incoming event and counts it,
//! `Block` makes `ingest` wait until a drain frees capacity. Capacity should
//! be sized against the drain frequency.

use crate::sinks::EventSink;
use chrono::Utc;
use common::{Event, OverflowPolicy};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Result of handing one event to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Queued,
    /// Buffer full under `DropNewest`
    Dropped,
    /// Drain side is gone
    Closed,
}

/// Summary of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events removed from the queue
    pub drained: usize,
    /// `(channel, symbol)` batches handed to the sink
    pub groups: usize,
    /// Batches the sink failed to persist (dropped, not retried)
    pub failed_groups: usize,
    /// Events lost to failed batches
    pub failed_events: usize,
}

/// Create a bounded event buffer
pub fn event_buffer(capacity: usize, policy: OverflowPolicy) -> (EventSender, EventDrain) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    let sender = EventSender {
        tx,
        policy,
        dropped: dropped.clone(),
    };
    let drain = EventDrain {
        rx,
        capacity,
        dropped,
    };
    (sender, drain)
}

/// Producer half of the event buffer
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Queue an event according to the overflow policy
    pub async fn ingest(&self, event: Event) -> IngestOutcome {
        match self.policy {
            OverflowPolicy::DropNewest => self.try_ingest(event),
            OverflowPolicy::Block => match self.tx.send(event).await {
                Ok(()) => IngestOutcome::Queued,
                Err(_) => IngestOutcome::Closed,
            },
        }
    }

    /// Queue an event without waiting; a full buffer drops it
    pub fn try_ingest(&self, event: Event) -> IngestOutcome {
        match self.tx.try_send(event) {
            Ok(()) => IngestOutcome::Queued,
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Event buffer full, dropping {} event for {} ({} dropped so far)",
                    event.channel, event.symbol, total
                );
                IngestOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => IngestOutcome::Closed,
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// No free slot: the next `ingest` would drop or wait
    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    /// Events rejected because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half of the event buffer
#[derive(Debug)]
pub struct EventDrain {
    rx: mpsc::Receiver<Event>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl EventDrain {
    /// Remove the events currently queued, in arrival order
    ///
    /// At most `capacity` events are taken, which covers everything present
    /// when the call started. Events arriving meanwhile stay for the next drain.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while events.len() < self.capacity {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    /// Drain the queue and persist each `(channel, symbol)` group with one sink call
    ///
    /// A failing group is logged and dropped; the remaining groups are still
    /// persisted and the queue stays drained.
    pub async fn drain_and_persist(&mut self, sink: &dyn EventSink) -> DrainReport {
        let drained_at = Utc::now();
        let events = self.drain();
        let mut report = DrainReport {
            drained: events.len(),
            ..Default::default()
        };

        if events.is_empty() {
            debug!("Event buffer empty, nothing to persist");
            return report;
        }

        for ((channel, symbol), batch) in group_events(events) {
            report.groups += 1;
            if let Err(e) = sink.persist(&channel, &symbol, &batch, drained_at).await {
                error!(
                    "Failed to persist {} {} events for {}: {}",
                    batch.len(), channel, symbol, e
                );
                report.failed_groups += 1;
                report.failed_events += batch.len();
            }
        }

        info!(
            "Persisted {} events in {} groups ({} groups failed)",
            report.drained - report.failed_events,
            report.groups,
            report.failed_groups
        );
        report
    }

    /// Events rejected by producers because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Group events by `(channel, symbol)`, preserving arrival order inside each group
pub fn group_events(events: Vec<Event>) -> BTreeMap<(String, String), Vec<Event>> {
    let mut groups: BTreeMap<(String, String), Vec<Event>> = BTreeMap::new();
    for event in events {
        groups
            .entry((event.channel.clone(), event.symbol.clone()))
            .or_default()
            .push(event);
    }
    groups
}
