//! Fixed-capacity sample window and heart-rate estimation.
//!
//! Samples are collected into a FIFO window of `capacity` entries (150 at
//! 30 Hz covers 5 s). Once the window is full, each estimate runs:
//!
//! 1. Linear detrend against the sample timestamps
//! 2. Uniform resampling to absorb capture jitter
//! 3. Zero-phase Butterworth band-pass over the physiological band
//! 4. Windowed magnitude spectrum
//! 5. Peak bin inside the band (DC excluded)
//! 6. BPM = peak frequency × 60
//!
//! Motion artifacts that alias into the band are not rejected.

use crate::core::dsp::{self, BandPass, SignalError};
use crate::source::types::Sample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// A heart-rate estimate, or the explicit "unknown" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BpmEstimate {
    #[default]
    Unknown,
    Known(u32),
}

impl BpmEstimate {
    pub fn value(&self) -> Option<u32> {
        match self {
            BpmEstimate::Known(bpm) => Some(*bpm),
            BpmEstimate::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, BpmEstimate::Known(_))
    }
}

impl std::fmt::Display for BpmEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BpmEstimate::Known(bpm) => write!(f, "{bpm}"),
            BpmEstimate::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reasons a sample is refused by [`SignalWindow::push`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleError {
    /// Timestamp or value is NaN or infinite
    NonFinite,
    /// Timestamp does not advance past the newest sample
    OutOfOrder { last: f64, got: f64 },
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::NonFinite => write!(f, "Sample is not finite"),
            SampleError::OutOfOrder { last, got } => {
                write!(f, "Sample at {got:.3}s does not follow {last:.3}s")
            }
        }
    }
}

impl std::error::Error for SampleError {}

/// Window shape and physiological band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Number of samples per estimate
    pub window_size: usize,
    /// Lower band edge in Hz
    pub band_low_hz: f64,
    /// Upper band edge in Hz
    pub band_high_hz: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_size: 150,
            band_low_hz: 0.75,
            band_high_hz: 3.0,
        }
    }
}

impl SignalConfig {
    /// Band edges expressed in beats per minute.
    pub fn bpm_range(&self) -> (u32, u32) {
        (
            (self.band_low_hz * 60.0).ceil() as u32,
            (self.band_high_hz * 60.0).floor() as u32,
        )
    }
}

/// Sliding window of samples with a cached heart-rate estimate.
#[derive(Debug, Clone)]
pub struct SignalWindow {
    config: SignalConfig,
    samples: VecDeque<Sample>,
    /// Bumped on every accepted push
    generation: u64,
    /// Generation the cached estimate was computed for
    estimated_at: Option<u64>,
    last_estimate: BpmEstimate,
    last_error: Option<SignalError>,
}

impl SignalWindow {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.window_size),
            config,
            generation: 0,
            estimated_at: None,
            last_estimate: BpmEstimate::Unknown,
            last_error: None,
        }
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// Non-finite or out-of-order samples are refused and leave the window untouched.
    pub fn push(&mut self, sample: Sample) -> Result<(), SampleError> {
        if !sample.is_finite() {
            return Err(SampleError::NonFinite);
        }
        if let Some(last) = self.samples.back() {
            if sample.timestamp <= last.timestamp {
                return Err(SampleError::OutOfOrder {
                    last: last.timestamp,
                    got: sample.timestamp,
                });
            }
        }

        if self.samples.len() == self.config.window_size {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.generation += 1;
        Ok(())
    }

    /// True once the window holds exactly `window_size` samples.
    pub fn ready(&self) -> bool {
        self.samples.len() == self.config.window_size
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.window_size
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Last published estimate, without recomputing.
    pub fn last_estimate(&self) -> BpmEstimate {
        self.last_estimate
    }

    /// True when the next [`estimate`](Self::estimate) will run the full computation.
    pub fn needs_estimate(&self) -> bool {
        self.ready() && self.estimated_at != Some(self.generation)
    }

    /// Failure recorded by the most recent computation, if any.
    pub fn last_error(&self) -> Option<&SignalError> {
        self.last_error.as_ref()
    }

    /// Estimate the heart rate of the current window.
    ///
    /// Before the window is full, or when the computation fails, the previous
    /// estimate is returned unchanged. Calls without an intervening push return
    /// the cached result.
    pub fn estimate(&mut self) -> BpmEstimate {
        if !self.ready() || self.estimated_at == Some(self.generation) {
            return self.last_estimate;
        }
        self.estimated_at = Some(self.generation);

        match self.compute() {
            Ok(bpm) => {
                self.last_estimate = BpmEstimate::Known(bpm);
                self.last_error = None;
            }
            Err(e) => {
                debug!("Keeping previous estimate {}: {e}", self.last_estimate);
                self.last_error = Some(e);
            }
        }
        self.last_estimate
    }

    fn compute(&self) -> Result<u32, SignalError> {
        let (min_bpm, max_bpm) = self.config.bpm_range();
        if min_bpm > max_bpm {
            return Err(SignalError::EmptyBand);
        }

        let times: Vec<f64> = self.samples.iter().map(|s| s.timestamp).collect();
        let values: Vec<f64> = self.samples.iter().map(|s| s.value).collect();

        let detrended = dsp::linear_detrend(&times, &values);
        if dsp::is_flat(&detrended) {
            return Err(SignalError::ZeroVariance);
        }

        let (uniform, sample_rate) = dsp::resample_uniform(&times, &detrended, times.len())?;
        let filter =
            BandPass::butterworth(self.config.band_low_hz, self.config.band_high_hz, sample_rate)?;
        let filtered = filter.filtfilt(&uniform)?;
        if dsp::is_flat(&filtered) {
            return Err(SignalError::ZeroVariance);
        }

        let hz = dsp::peak_frequency(
            &filtered,
            sample_rate,
            self.config.band_low_hz,
            self.config.band_high_hz,
        )?;

        let bpm = (hz * 60.0).round();
        if !bpm.is_finite() {
            return Err(SignalError::NonFinite);
        }
        Ok((bpm as u32).clamp(min_bpm, max_bpm))
    }

    /// Drop all samples and the cached estimate.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.generation = 0;
        self.estimated_at = None;
        self.last_estimate = BpmEstimate::Unknown;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 30.0;

    fn filled_window(freq_hz: f64) -> SignalWindow {
        let mut window = SignalWindow::new(SignalConfig::default());
        for i in 0..window.capacity() {
            let t = i as f64 / FS;
            window
                .push(Sample::new(t, (2.0 * PI * freq_hz * t).sin()))
                .unwrap();
        }
        window
    }

    #[test]
    fn test_sinusoid_accuracy_across_band() {
        for freq in [0.8, 1.0, 1.25, 1.5, 1.8, 2.1, 2.5] {
            let mut window = filled_window(freq);
            assert!(window.ready());
            let bpm = window.estimate().value().expect("estimate should be known");
            let expected = freq * 60.0;
            assert!(
                (bpm as f64 - expected).abs() <= 3.0,
                "{freq} Hz: expected ~{expected}, got {bpm}"
            );
        }
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let mut window = filled_window(1.3);
        let first = window.estimate();
        let second = window.estimate();
        assert_eq!(first, second);
        assert!(first.is_known());
    }

    #[test]
    fn test_not_ready_returns_unknown() {
        let mut window = SignalWindow::new(SignalConfig::default());
        for i in 0..10 {
            window.push(Sample::new(i as f64 / FS, 1.0)).unwrap();
        }
        assert!(!window.ready());
        assert_eq!(window.estimate(), BpmEstimate::Unknown);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut window = SignalWindow::new(SignalConfig {
            window_size: 32,
            ..SignalConfig::default()
        });
        for i in 0..40 {
            window.push(Sample::new(i as f64, i as f64)).unwrap();
        }
        assert_eq!(window.len(), 32);
        assert!(window.ready());
        assert_eq!(window.samples.front().unwrap().timestamp, 8.0);
    }

    #[test]
    fn test_rejects_bad_samples_without_mutation() {
        let mut window = SignalWindow::new(SignalConfig::default());
        window.push(Sample::new(1.0, 0.5)).unwrap();

        assert_eq!(
            window.push(Sample::new(2.0, f64::NAN)),
            Err(SampleError::NonFinite)
        );
        assert_eq!(
            window.push(Sample::new(f64::INFINITY, 0.5)),
            Err(SampleError::NonFinite)
        );
        assert!(matches!(
            window.push(Sample::new(1.0, 0.7)),
            Err(SampleError::OutOfOrder { .. })
        ));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_flat_window_keeps_previous_estimate() {
        let mut window = filled_window(1.5);
        let good = window.estimate();
        assert!(good.is_known());

        let start = window.capacity() as f64 / FS;
        for i in 0..window.capacity() {
            window
                .push(Sample::new(start + i as f64 / FS, 0.42))
                .unwrap();
        }
        assert_eq!(window.estimate(), good);
        assert_eq!(window.last_error(), Some(&SignalError::ZeroVariance));
    }

    #[test]
    fn test_jittered_timestamps() {
        let mut window = SignalWindow::new(SignalConfig::default());
        let freq = 1.4;
        let mut t = 0.0;
        for i in 0..window.capacity() {
            window
                .push(Sample::new(t, (2.0 * PI * freq * t).sin()))
                .unwrap();
            t += if i % 2 == 0 { 0.030 } else { 0.0367 };
        }
        let bpm = window.estimate().value().unwrap();
        assert!((bpm as f64 - freq * 60.0).abs() <= 3.0, "got {bpm}");
    }

    #[test]
    fn test_band_without_whole_bpm_is_recoverable() {
        let mut window = SignalWindow::new(SignalConfig {
            band_low_hz: 60.5 / 60.0,
            band_high_hz: 60.9 / 60.0,
            ..SignalConfig::default()
        });
        assert_eq!(window.config().bpm_range(), (61, 60));
        for i in 0..window.capacity() {
            let t = i as f64 / FS;
            window
                .push(Sample::new(t, (2.0 * PI * 1.01 * t).sin()))
                .unwrap();
        }

        assert_eq!(window.estimate(), BpmEstimate::Unknown);
        assert_eq!(window.last_error(), Some(&SignalError::EmptyBand));
    }

    #[test]
    fn test_reset() {
        let mut window = filled_window(1.5);
        window.estimate();
        window.reset();
        assert!(window.is_empty());
        assert_eq!(window.last_estimate(), BpmEstimate::Unknown);
    }
}
