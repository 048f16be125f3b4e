//! Numerical building blocks for the heart-rate window.
//!
//! Every function here is pure and allocation-bounded by the window size, so a
//! full estimate over a 5 s window stays well inside a 30 Hz frame budget.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use statrs::statistics::Statistics;
use std::f64::consts::PI;

/// Smallest FFT length used for peak search. Zero padding a 150-sample window
/// to this length gives a bin spacing under 1 BPM at 30 Hz.
pub const MIN_FFT_LEN: usize = 2048;

/// Variance below which a detrended window is treated as flat.
const FLAT_VARIANCE: f64 = 1e-12;

/// Butterworth quality factor for a second-order section.
const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Numerical failures while turning a window into a frequency estimate.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Fewer samples than the filter needs
    TooShort(usize),
    /// First and last timestamps coincide
    ZeroSpan,
    /// Window carries no variation after detrending
    ZeroVariance,
    /// Band edges are not inside (0, nyquist)
    InvalidBand { low_hz: f64, high_hz: f64, nyquist_hz: f64 },
    /// Band holds no spectrum bin or no whole BPM value
    EmptyBand,
    /// An intermediate value became NaN or infinite
    NonFinite,
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::TooShort(n) => write!(f, "Window too short: {n} samples"),
            SignalError::ZeroSpan => write!(f, "Window spans zero time"),
            SignalError::ZeroVariance => write!(f, "Window has zero variance"),
            SignalError::InvalidBand {
                low_hz,
                high_hz,
                nyquist_hz,
            } => write!(
                f,
                "Band {low_hz:.2}-{high_hz:.2} Hz invalid for nyquist {nyquist_hz:.2} Hz"
            ),
            SignalError::EmptyBand => write!(f, "Band contains no usable frequencies"),
            SignalError::NonFinite => write!(f, "Non-finite value during filtering"),
        }
    }
}

impl std::error::Error for SignalError {}

/// Remove the least-squares line fitted against the sample times.
pub fn linear_detrend(times: &[f64], values: &[f64]) -> Vec<f64> {
    let t_mean = times.mean();
    let v_mean = values.mean();

    let mut num = 0.0;
    let mut den = 0.0;
    for (&t, &v) in times.iter().zip(values) {
        num += (t - t_mean) * (v - v_mean);
        den += (t - t_mean) * (t - t_mean);
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };

    times
        .iter()
        .zip(values)
        .map(|(&t, &v)| v - (v_mean + slope * (t - t_mean)))
        .collect()
}

/// Whether a window is too flat to carry a pulse.
pub fn is_flat(values: &[f64]) -> bool {
    let variance = values.variance();
    !variance.is_finite() || variance < FLAT_VARIANCE
}

/// Linearly interpolate `values` onto `n` evenly spaced instants spanning the
/// first to last timestamp. Returns the resampled series and its sample rate.
///
/// `times` must be strictly increasing.
pub fn resample_uniform(
    times: &[f64],
    values: &[f64],
    n: usize,
) -> Result<(Vec<f64>, f64), SignalError> {
    if times.len() < 2 || n < 2 {
        return Err(SignalError::TooShort(times.len()));
    }

    let t0 = times[0];
    let span = times[times.len() - 1] - t0;
    if span <= 0.0 || !span.is_finite() {
        return Err(SignalError::ZeroSpan);
    }

    let step = span / (n - 1) as f64;
    let mut out = Vec::with_capacity(n);
    let mut j = 0;
    for i in 0..n {
        let t = t0 + step * i as f64;
        while j + 2 < times.len() && times[j + 1] < t {
            j += 1;
        }
        let (ta, tb) = (times[j], times[j + 1]);
        let frac = ((t - ta) / (tb - ta)).clamp(0.0, 1.0);
        out.push(values[j] + frac * (values[j + 1] - values[j]));
    }

    Ok((out, (n - 1) as f64 / span))
}

/// A second-order IIR section in transposed direct form II, normalized so a0 = 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Second-order Butterworth low-pass via the bilinear transform.
    pub fn butterworth_lowpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        let (cos_w0, alpha) = Self::prewarp(cutoff_hz, sample_rate);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Second-order Butterworth high-pass via the bilinear transform.
    pub fn butterworth_highpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        let (cos_w0, alpha) = Self::prewarp(cutoff_hz, sample_rate);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn prewarp(cutoff_hz: f64, sample_rate: f64) -> (f64, f64) {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        (w0.cos(), w0.sin() / (2.0 * BUTTERWORTH_Q))
    }

    /// Run the section over `input`, starting from the steady state for a
    /// constant input equal to the first sample.
    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        let Some(&x0) = input.first() else {
            return Vec::new();
        };

        let y_ss = x0 * (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2);
        let mut z1 = y_ss - self.b0 * x0;
        let mut z2 = self.b2 * x0 - self.a2 * y_ss;

        input
            .iter()
            .map(|&x| {
                let y = self.b0 * x + z1;
                z1 = self.b1 * x - self.a1 * y + z2;
                z2 = self.b2 * x - self.a2 * y;
                y
            })
            .collect()
    }
}

/// Zero-phase band-pass built from a high-pass and a low-pass Butterworth section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPass {
    highpass: Biquad,
    lowpass: Biquad,
}

impl BandPass {
    /// Samples of odd reflection added to each end before filtering.
    const EDGE_PAD: usize = 15;

    pub fn butterworth(low_hz: f64, high_hz: f64, sample_rate: f64) -> Result<Self, SignalError> {
        let nyquist_hz = sample_rate / 2.0;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist_hz) {
            return Err(SignalError::InvalidBand {
                low_hz,
                high_hz,
                nyquist_hz,
            });
        }

        Ok(Self {
            highpass: Biquad::butterworth_highpass(low_hz, sample_rate),
            lowpass: Biquad::butterworth_lowpass(high_hz, sample_rate),
        })
    }

    fn apply_once(&self, input: &[f64]) -> Vec<f64> {
        self.lowpass.apply(&self.highpass.apply(input))
    }

    /// Forward-backward filtering with odd-reflection padding at both edges.
    pub fn filtfilt(&self, input: &[f64]) -> Result<Vec<f64>, SignalError> {
        let n = input.len();
        if n < 4 {
            return Err(SignalError::TooShort(n));
        }
        let pad = Self::EDGE_PAD.min(n - 1);
        let first = input[0];
        let last = input[n - 1];

        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
        extended.extend_from_slice(input);
        extended.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));

        let mut forward = self.apply_once(&extended);
        forward.reverse();
        let mut backward = self.apply_once(&forward);
        backward.reverse();

        let output = backward[pad..pad + n].to_vec();
        if output.iter().any(|v| !v.is_finite()) {
            return Err(SignalError::NonFinite);
        }
        Ok(output)
    }
}

/// Hann window coefficients.
pub fn hann_window(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos()))
        .collect()
}

/// Magnitude spectrum of a Hann-windowed, zero-padded real signal.
/// Returns the magnitudes of bins `0..=fft_len/2` and the FFT length used.
pub fn magnitude_spectrum(signal: &[f64]) -> (Vec<f64>, usize) {
    let fft_len = signal.len().next_power_of_two().max(MIN_FFT_LEN);
    let window = hann_window(signal.len());

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .zip(&window)
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();
    buffer.resize(fft_len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    fft.process(&mut buffer);

    let magnitudes = buffer.iter().take(fft_len / 2 + 1).map(|c| c.norm()).collect();
    (magnitudes, fft_len)
}

/// Dominant frequency inside `[low_hz, high_hz]`, never the DC bin, refined by
/// parabolic interpolation over the neighbouring bins.
pub fn peak_frequency(
    signal: &[f64],
    sample_rate: f64,
    low_hz: f64,
    high_hz: f64,
) -> Result<f64, SignalError> {
    let (spectrum, fft_len) = magnitude_spectrum(signal);
    let resolution = sample_rate / fft_len as f64;

    let min_bin = ((low_hz / resolution).ceil() as usize).max(1);
    let max_bin = ((high_hz / resolution).floor() as usize).min(spectrum.len() - 1);
    if min_bin > max_bin {
        return Err(SignalError::EmptyBand);
    }

    let mut peak_bin = min_bin;
    for bin in min_bin..=max_bin {
        if spectrum[bin] > spectrum[peak_bin] {
            peak_bin = bin;
        }
    }
    if !spectrum[peak_bin].is_finite() {
        return Err(SignalError::NonFinite);
    }

    let mut refined = peak_bin as f64;
    if peak_bin + 1 < spectrum.len() {
        let (left, mid, right) = (
            spectrum[peak_bin - 1],
            spectrum[peak_bin],
            spectrum[peak_bin + 1],
        );
        let denom = left - 2.0 * mid + right;
        if denom.abs() > f64::EPSILON {
            let delta = 0.5 * (left - right) / denom;
            if delta.is_finite() && delta.abs() <= 0.5 {
                refined += delta;
            }
        }
    }

    Ok(refined * resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f64, fs: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let times: Vec<f64> = (0..n).map(|i| i as f64 / fs).collect();
        let values = times.iter().map(|t| (2.0 * PI * freq_hz * t).sin()).collect();
        (times, values)
    }

    #[test]
    fn test_detrend_removes_line() {
        let times: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let values: Vec<f64> = times.iter().map(|t| 3.0 * t + 2.0).collect();
        let out = linear_detrend(&times, &values);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
        assert!(is_flat(&out));
    }

    #[test]
    fn test_resample_jittered_line() {
        let times = vec![0.0, 0.03, 0.07, 0.10, 0.13, 0.2];
        let values: Vec<f64> = times.iter().map(|t| 10.0 * t).collect();
        let (out, fs) = resample_uniform(&times, &values, 5).unwrap();
        assert_eq!(out.len(), 5);
        assert!((fs - 20.0).abs() < 1e-9);
        for (i, v) in out.iter().enumerate() {
            assert!((v - 10.0 * 0.05 * i as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_resample_zero_span() {
        let err = resample_uniform(&[1.0, 1.0], &[0.0, 1.0], 2).unwrap_err();
        assert_eq!(err, SignalError::ZeroSpan);
    }

    #[test]
    fn test_bandpass_rejects_band_above_nyquist() {
        assert!(matches!(
            BandPass::butterworth(0.75, 3.0, 5.0),
            Err(SignalError::InvalidBand { .. })
        ));
        assert!(BandPass::butterworth(0.75, 3.0, 30.0).is_ok());
    }

    #[test]
    fn test_bandpass_attenuates_out_of_band() {
        let filter = BandPass::butterworth(0.75, 3.0, 30.0).unwrap();
        let (_, in_band) = sine(1.5, 30.0, 300);
        let (_, out_band) = sine(10.0, 30.0, 300);

        let energy = |v: &[f64]| v[50..250].iter().map(|x| x * x).sum::<f64>();
        let kept = energy(&filter.filtfilt(&in_band).unwrap()) / energy(&in_band);
        let removed = energy(&filter.filtfilt(&out_band).unwrap()) / energy(&out_band);

        assert!(kept > 0.7, "in-band energy ratio {kept}");
        assert!(removed < 0.05, "out-of-band energy ratio {removed}");
    }

    #[test]
    fn test_peak_frequency_of_sine() {
        let (_, values) = sine(1.2, 30.0, 150);
        let hz = peak_frequency(&values, 30.0, 0.75, 3.0).unwrap();
        assert!((hz - 1.2).abs() < 0.03, "got {hz}");
    }

    #[test]
    fn test_hann_endpoints() {
        let w = hann_window(5);
        assert!(w[0].abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
        assert!(w[4].abs() < 1e-12);
    }
}
