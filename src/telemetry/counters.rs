//! Pipeline counters.
//!
//! Tracks what flowed through the pipeline so an operator can tell a silent
//! camera from a failing estimator. Only counts are kept, never frame data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Atomic counters shared by the acquisition and processing threads.
#[derive(Debug)]
pub struct PipelineCounters {
    samples_accepted: AtomicU64,
    samples_rejected: AtomicU64,
    points_detected: AtomicU64,
    points_missing: AtomicU64,
    /// Frames dropped because the event queue was full
    frames_dropped: AtomicU64,
    estimates: AtomicU64,
    signal_failures: AtomicU64,
    budget_overruns: AtomicU64,
    activations: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting counters
    persist_path: Option<PathBuf>,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            samples_accepted: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            points_detected: AtomicU64::new(0),
            points_missing: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            estimates: AtomicU64::new(0),
            signal_failures: AtomicU64::new(0),
            budget_overruns: AtomicU64::new(0),
            activations: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Counters that resume from, and save back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut counters = Self::new();
        counters.persist_path = Some(path);

        if let Err(e) = counters.load() {
            warn!("Could not load previous pipeline counters: {e}");
        }

        counters
    }

    pub fn record_sample(&self, accepted: bool) {
        let counter = if accepted {
            &self.samples_accepted
        } else {
            &self.samples_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_point(&self, detected: bool) {
        let counter = if detected {
            &self.points_detected
        } else {
            &self.points_missing
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_estimate(&self, failed: bool) {
        self.estimates.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.signal_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_budget_overrun(&self) {
        self.budget_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_activations(&self, count: u64) {
        self.activations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CounterStats {
        CounterStats {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            points_detected: self.points_detected.load(Ordering::Relaxed),
            points_missing: self.points_missing.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            estimates: self.estimates.load(Ordering::Relaxed),
            signal_failures: self.signal_failures.load(Ordering::Relaxed),
            budget_overruns: self.budget_overruns.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Pipeline Statistics:\n\
             - Samples accepted / rejected: {} / {}\n\
             - Points detected / missing: {} / {}\n\
             - Frames dropped: {}\n\
             - Estimates (failed): {} ({})\n\
             - Frame budget overruns: {}\n\
             - Zone activations: {}\n\
             - Session duration: {} seconds",
            stats.samples_accepted,
            stats.samples_rejected,
            stats.points_detected,
            stats.points_missing,
            stats.frames_dropped,
            stats.estimates,
            stats.signal_failures,
            stats.budget_overruns,
            stats.activations,
            stats.session_duration_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedCounters {
                samples_accepted: stats.samples_accepted,
                samples_rejected: stats.samples_rejected,
                points_detected: stats.points_detected,
                points_missing: stats.points_missing,
                frames_dropped: stats.frames_dropped,
                estimates: stats.estimates,
                signal_failures: stats.signal_failures,
                budget_overruns: stats.budget_overruns,
                activations: stats.activations,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedCounters =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                let pairs = [
                    (&self.samples_accepted, persisted.samples_accepted),
                    (&self.samples_rejected, persisted.samples_rejected),
                    (&self.points_detected, persisted.points_detected),
                    (&self.points_missing, persisted.points_missing),
                    (&self.frames_dropped, persisted.frames_dropped),
                    (&self.estimates, persisted.estimates),
                    (&self.signal_failures, persisted.signal_failures),
                    (&self.budget_overruns, persisted.budget_overruns),
                    (&self.activations, persisted.activations),
                ];
                for (counter, value) in pairs {
                    counter.store(value, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Read persisted counters without creating a live instance.
    pub fn read_persisted(path: &std::path::Path) -> Result<Option<PersistedCounters>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let persisted = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Some(persisted))
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.samples_accepted,
            &self.samples_rejected,
            &self.points_detected,
            &self.points_missing,
            &self.frames_dropped,
            &self.estimates,
            &self.signal_failures,
            &self.budget_overruns,
            &self.activations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterStats {
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub points_detected: u64,
    pub points_missing: u64,
    pub frames_dropped: u64,
    pub estimates: u64,
    pub signal_failures: u64,
    pub budget_overruns: u64,
    pub activations: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Counter totals as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCounters {
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub points_detected: u64,
    pub points_missing: u64,
    pub frames_dropped: u64,
    pub estimates: u64,
    pub signal_failures: u64,
    pub budget_overruns: u64,
    pub activations: u64,
    /// When the totals were last saved
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared counters.
pub type SharedCounters = Arc<PipelineCounters>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let counters = PipelineCounters::new();

        counters.record_sample(true);
        counters.record_sample(true);
        counters.record_sample(false);
        counters.record_point(false);
        counters.record_estimate(true);
        counters.record_activations(3);

        let stats = counters.stats();
        assert_eq!(stats.samples_accepted, 2);
        assert_eq!(stats.samples_rejected, 1);
        assert_eq!(stats.points_missing, 1);
        assert_eq!((stats.estimates, stats.signal_failures), (1, 1));
        assert_eq!(stats.activations, 3);
    }

    #[test]
    fn test_reset() {
        let counters = PipelineCounters::new();
        counters.record_frame_dropped();
        counters.record_budget_overrun();
        counters.reset();

        let stats = counters.stats();
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.budget_overruns, 0);
    }

    #[test]
    fn test_persistence_resumes_counts() {
        let path = std::env::temp_dir()
            .join(format!("companion-sense-counters-{}", uuid::Uuid::new_v4()))
            .join("counters.json");

        let counters = PipelineCounters::with_persistence(path.clone());
        counters.record_sample(true);
        counters.record_activations(2);
        let saved_after = Utc::now();
        counters.save().unwrap();

        let resumed = PipelineCounters::with_persistence(path.clone());
        assert_eq!(resumed.stats().samples_accepted, 1);
        assert_eq!(resumed.stats().activations, 2);

        let read = PipelineCounters::read_persisted(&path).unwrap().unwrap();
        assert_eq!(read.activations, 2);
        assert!(read.last_updated >= saved_after);
        // A resumed instance starts a new session; the save time stays on disk
        assert!(resumed.stats().session_start >= read.last_updated);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineCounters::new().summary();
        assert!(summary.contains("Frames dropped"));
        assert!(summary.contains("Zone activations"));
    }
}
