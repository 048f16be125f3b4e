//! Operational telemetry: pipeline counters and session history.

pub mod counters;
pub mod history;

// Re-export commonly used types
pub use counters::{CounterStats, PersistedCounters, PipelineCounters, SharedCounters};
pub use history::SessionHistory;
