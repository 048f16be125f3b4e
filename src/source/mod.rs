//! Landmark acquisition.
//!
//! Camera capture and landmark inference live outside this crate. A
//! [`LandmarkSource`] hands the pipeline one scalar sample and one tracked
//! point per frame; the [`SourceWorker`] polls it on its own thread and
//! publishes the results onto a bounded channel.

pub mod synthetic;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use synthetic::{SyntheticConfig, SyntheticSource, WalkStep};
pub use types::{FootPair, Landmark, LandmarkEvent, PointObservation, Sample};
pub use worker::{Clock, SourceWorker, WorkerError};

/// Per-frame supplier of samples and tracked points.
pub trait LandmarkSource: Send {
    /// Skin-region sample for this frame, or `None` when no face was found.
    fn next_sample(&mut self, now: f64) -> Option<Sample>;

    /// Tracked point for this frame in camera-normalized coordinates.
    fn next_point(&mut self, now: f64) -> PointObservation;
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_sample(&mut self, now: f64) -> Option<Sample> {
        (**self).next_sample(now)
    }

    fn next_point(&mut self, now: f64) -> PointObservation {
        (**self).next_point(now)
    }
}
