//! Data Ingestion (Layer 0)
//!
//! In-memory state fed by the exchange collaborators:
//! - Bounded per-symbol kline history with merge-on-overlap ingestion
//! - Event buffer for streamed messages, drained into rotated JSON-lines files
//! - Append-only order book persistence

pub mod databases;
pub mod event_bus;
pub mod sinks;

pub use databases::timeseries::{HistorySnapshot, StoreReport, TimeSeriesStore, MISSING_SAFETY_MARGIN};
pub use event_bus::{event_buffer, DrainReport, EventDrain, EventSender, IngestOutcome};
pub use sinks::{DepthWriter, EventSink, JsonlEventSink};
