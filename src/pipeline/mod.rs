//! Threaded sensing pipeline.
//!
//! ```text
//!  ┌──────────────┐  bounded channel  ┌──────────────┐
//!  │ SourceWorker │──LandmarkEvent───▶│  processing  │──▶ Mutex<Engine> ◀── readers
//!  │ (acquire)    │   (drop if full)  │  (ingest,    │                      (status,
//!  └──────────────┘                   │   tick)      │                       commands)
//!                                     └──────────────┘
//! ```
//!
//! Lifecycle: [`Pipeline::new`] → [`Pipeline::start`] → [`Pipeline::stop`] →
//! [`Pipeline::dispose`]. A stopped pipeline can be started again.

pub mod engine;

pub use crate::source::worker::Clock;
pub use engine::{CalibrationStatus, Engine, EngineStatus};

use crate::config::{Config, ConfigError};
use crate::core::calibration::CalibrationError;
use crate::core::game::{CommandError, SessionSummary};
use crate::core::physio::{FusedAssessment, PhysiologicalSummary};
use crate::core::signal::BpmEstimate;
use crate::core::zones::{Zone, ZoneReport};
use crate::core::GameSnapshot;
use crate::source::types::LandmarkEvent;
use crate::source::worker::{SourceWorker, WorkerError, WorkerHandle};
use crate::source::LandmarkSource;
use crate::store::{ConfigStore, Snapshot};
use crate::telemetry::SharedCounters;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// Pipeline lifecycle failures.
#[derive(Debug)]
pub enum PipelineError {
    AlreadyRunning,
    NotRunning,
    Config(ConfigError),
    Worker(WorkerError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::AlreadyRunning => write!(f, "Pipeline is already running"),
            PipelineError::NotRunning => write!(f, "Pipeline is not running"),
            PipelineError::Config(e) => write!(f, "Pipeline configuration error: {e}"),
            PipelineError::Worker(e) => write!(f, "Pipeline worker error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Config(e) => Some(e),
            PipelineError::Worker(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl From<WorkerError> for PipelineError {
    fn from(e: WorkerError) -> Self {
        PipelineError::Worker(e)
    }
}

/// One sensing pipeline: an acquisition thread feeding a processing thread.
pub struct Pipeline {
    config: Config,
    engine: Arc<Mutex<Engine>>,
    counters: SharedCounters,
    clock: Clock,
    worker: SourceWorker,
    processor: Option<WorkerHandle>,
    processing: Arc<AtomicBool>,
    /// Kept so in-flight frames can be drained on stop
    events: Option<Receiver<LandmarkEvent>>,
}

impl Pipeline {
    pub fn new(config: Config, counters: SharedCounters) -> Result<Self, PipelineError> {
        config.validate()?;
        let engine = Engine::new(&config, Arc::clone(&counters));
        Ok(Self::with_engine(config, engine, counters))
    }

    /// Build around a prepared engine.
    pub fn with_engine(config: Config, engine: Engine, counters: SharedCounters) -> Self {
        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            counters,
            clock: Clock::new(),
            worker: SourceWorker::new(),
            processor: None,
            processing: Arc::new(AtomicBool::new(false)),
            events: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &SharedCounters {
        &self.counters
    }

    /// Seconds on the pipeline clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_running(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure against the engine under the pipeline lock.
    pub fn with_engine_mut<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut self.lock())
    }

    /// Start acquisition from `source` and the processing loop.
    pub fn start<S>(&mut self, source: S) -> Result<(), PipelineError>
    where
        S: LandmarkSource + 'static,
    {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }

        let interval = self.config.pipeline.tick_interval();
        let (tx, rx) = bounded(self.config.pipeline.channel_capacity);

        self.processing.store(true, Ordering::SeqCst);
        let processing = Arc::clone(&self.processing);
        let engine = Arc::clone(&self.engine);
        let clock = self.clock;
        let events = rx.clone();

        let processor = WorkerHandle::spawn("processing", move || {
            let mut last_tick = Instant::now();
            while processing.load(Ordering::SeqCst) {
                match events.recv_timeout(interval) {
                    Ok(event) => {
                        engine
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .ingest(event);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if last_tick.elapsed() >= interval {
                    last_tick = Instant::now();
                    engine
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .tick(clock.now());
                }
            }
            processing.store(false, Ordering::SeqCst);
        });

        let processor = match processor {
            Ok(handle) => handle,
            Err(e) => {
                self.processing.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        if let Err(e) = self.worker.start(source, tx, clock, interval, Arc::clone(&self.counters)) {
            self.processing.store(false, Ordering::SeqCst);
            let _ = processor.join_within(self.config.pipeline.stop_timeout);
            return Err(e.into());
        }

        self.processor = Some(processor);
        self.events = Some(rx);
        info!(
            "Pipeline started at {:.1} Hz",
            self.config.pipeline.tick_rate_hz
        );
        Ok(())
    }

    /// Halt both threads within the configured timeout and discard queued frames.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        let Some(processor) = self.processor.take() else {
            return Err(PipelineError::NotRunning);
        };
        let timeout = self.config.pipeline.stop_timeout;

        // Acquisition first so no new frames arrive while processing winds down
        let acquisition = self.worker.stop(timeout);
        self.processing.store(false, Ordering::SeqCst);
        let processing = processor.join_within(timeout);

        if let Some(events) = self.events.take() {
            let discarded = events.try_iter().count();
            if discarded > 0 {
                info!("Discarded {discarded} in-flight frames");
            }
        }

        if let Err(e) = self.counters.save() {
            warn!("Failed to save pipeline counters: {e}");
        }
        info!("Pipeline stopped");

        acquisition?;
        processing?;
        Ok(())
    }

    /// Stop if needed and release the pipeline.
    pub fn dispose(mut self) -> Result<(), PipelineError> {
        if self.processor.is_some() {
            self.stop()?;
        }
        Ok(())
    }

    pub fn get_bpm(&self) -> BpmEstimate {
        self.lock().get_bpm()
    }

    pub fn get_zone_state(&self) -> ZoneReport {
        self.lock().get_zone_state()
    }

    pub fn get_game_state(&self) -> GameSnapshot {
        let now = self.now();
        self.lock().get_game_state(now)
    }

    pub fn status(&self) -> EngineStatus {
        let now = self.now();
        self.lock().status(now)
    }

    pub fn assessment(&self) -> FusedAssessment {
        self.lock().assessment()
    }

    pub fn set_physiology(&self, summary: PhysiologicalSummary) {
        self.lock().set_physiology(summary);
    }

    pub fn set_ready(&self) -> Result<(), CommandError> {
        self.lock().set_ready()
    }

    pub fn start_game(&self) -> Result<(), CommandError> {
        let now = self.now();
        self.lock().start_game(now)
    }

    pub fn pause(&self) -> Result<(), CommandError> {
        let now = self.now();
        self.lock().pause(now)
    }

    pub fn resume(&self) -> Result<(), CommandError> {
        let now = self.now();
        self.lock().resume(now)
    }

    pub fn stop_game(&self) {
        let now = self.now();
        self.lock().stop_game(now);
    }

    pub fn take_finished_sessions(&self) -> Vec<SessionSummary> {
        self.lock().take_finished_sessions()
    }

    pub fn set_calibration_point(&self, index: usize, x: f64, y: f64) -> Result<(), CalibrationError> {
        self.lock().set_calibration_point(index, x, y)
    }

    pub fn compute_homography(&self) -> Result<(), CalibrationError> {
        self.lock().compute_homography()
    }

    pub fn configure_zones(&self, zones: Vec<Zone>) -> Result<(), ConfigError> {
        self.lock().configure_zones(zones)
    }

    /// Load and apply the stored snapshot. Returns false when none was stored.
    pub fn load_from(&self, store: &dyn ConfigStore) -> Result<bool, ConfigError> {
        match store.load()? {
            Some(snapshot) => {
                self.lock().apply_snapshot(&snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn save_to(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        let snapshot: Snapshot = self.lock().snapshot();
        store.save(&snapshot)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.processor.is_some() {
            if let Err(e) = self.stop() {
                warn!("Pipeline did not stop cleanly: {e}");
            }
        }
    }
}
