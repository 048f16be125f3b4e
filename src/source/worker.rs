//! Acquisition worker thread.
//!
//! Polls a [`LandmarkSource`] at the tick rate and publishes every sample and
//! point onto a bounded channel. When the consumer falls behind, new frames are
//! dropped and counted rather than blocking acquisition.

use crate::source::types::LandmarkEvent;
use crate::source::LandmarkSource;
use crate::telemetry::SharedCounters;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Monotonic seconds since a fixed origin.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur while running a worker thread.
#[derive(Debug)]
pub enum WorkerError {
    AlreadyRunning,
    NotRunning,
    Spawn(String),
    /// Thread did not acknowledge stop within the timeout
    StopTimeout(&'static str),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::AlreadyRunning => write!(f, "Worker is already running"),
            WorkerError::NotRunning => write!(f, "Worker is not running"),
            WorkerError::Spawn(e) => write!(f, "Failed to spawn worker: {e}"),
            WorkerError::StopTimeout(name) => write!(f, "Worker {name} did not stop in time"),
        }
    }
}

impl std::error::Error for WorkerError {}

/// A running thread with a completion signal for bounded shutdown.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    name: &'static str,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl WorkerHandle {
    /// Spawn `body`, signalling completion when it returns.
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = bounded(1);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body();
                let _ = done_tx.send(());
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        Ok(Self { name, handle, done })
    }

    /// Wait for completion, then join. A thread that misses the deadline is detached.
    pub(crate) fn join_within(self, timeout: Duration) -> Result<(), WorkerError> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.handle.join();
                debug!("Worker {} joined", self.name);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                error!("Worker {} did not stop within {:?}", self.name, timeout);
                Err(WorkerError::StopTimeout(self.name))
            }
        }
    }
}

/// Drives a [`LandmarkSource`] on a dedicated thread.
pub struct SourceWorker {
    running: Arc<AtomicBool>,
    handle: Option<WorkerHandle>,
}

impl SourceWorker {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start polling `source` every `interval`, publishing onto `sender`.
    pub fn start<S>(
        &mut self,
        mut source: S,
        sender: Sender<LandmarkEvent>,
        clock: Clock,
        interval: Duration,
        counters: SharedCounters,
    ) -> Result<(), WorkerError>
    where
        S: LandmarkSource + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let spawned = WorkerHandle::spawn("acquisition", move || {
            info!("Acquisition started at {:?} per frame", interval);
            while running.load(Ordering::SeqCst) {
                let frame_start = Instant::now();
                let now = clock.now();

                let mut events = Vec::with_capacity(2);
                if let Some(sample) = source.next_sample(now) {
                    events.push(LandmarkEvent::Sample(sample));
                }
                events.push(LandmarkEvent::Point {
                    observation: source.next_point(now),
                    at: now,
                });

                for event in events {
                    match sender.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => counters.record_frame_dropped(),
                        Err(TrySendError::Disconnected(_)) => {
                            debug!("Event channel closed, stopping acquisition");
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                }

                if let Some(rest) = interval.checked_sub(frame_start.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
            info!("Acquisition stopped");
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Signal the thread to stop and wait up to `timeout` for it.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        self.running.store(false, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle.join_within(timeout),
            None => Err(WorkerError::NotRunning),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for SourceWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SourceWorker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SyntheticConfig, SyntheticSource};
    use crate::telemetry::PipelineCounters;

    #[test]
    fn test_worker_publishes_and_stops() {
        let (tx, rx) = bounded(64);
        let counters = Arc::new(PipelineCounters::new());
        let mut worker = SourceWorker::new();
        worker
            .start(
                SyntheticSource::new(SyntheticConfig::default()),
                tx,
                Clock::new(),
                Duration::from_millis(5),
                Arc::clone(&counters),
            )
            .unwrap();
        assert!(worker.is_running());

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(first, LandmarkEvent::Sample(_)));

        worker.stop(Duration::from_secs(1)).unwrap();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.stop(Duration::from_millis(10)),
            Err(WorkerError::NotRunning)
        ));
    }

    #[test]
    fn test_full_channel_drops_frames() {
        let (tx, _rx) = bounded(1);
        let counters = Arc::new(PipelineCounters::new());
        let mut worker = SourceWorker::new();
        worker
            .start(
                SyntheticSource::new(SyntheticConfig::default()),
                tx,
                Clock::new(),
                Duration::from_millis(2),
                Arc::clone(&counters),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        worker.stop(Duration::from_secs(1)).unwrap();
        assert!(counters.stats().frames_dropped > 0);
    }

    #[test]
    fn test_double_start_rejected() {
        let (tx, _rx) = bounded(8);
        let counters = Arc::new(PipelineCounters::new());
        let mut worker = SourceWorker::new();
        let source = || SyntheticSource::new(SyntheticConfig::default());
        worker
            .start(source(), tx.clone(), Clock::new(), Duration::from_millis(5), Arc::clone(&counters))
            .unwrap();
        assert!(matches!(
            worker.start(source(), tx, Clock::new(), Duration::from_millis(5), counters),
            Err(WorkerError::AlreadyRunning)
        ));
        worker.stop(Duration::from_secs(1)).unwrap();
    }
}
