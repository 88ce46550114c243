//! Fundamental frequency estimation
//!
//! YIN: the squared difference function of the signal against its lagged
//! copy, normalized by its cumulative mean, searched for the first dip below
//! an absolute threshold and refined with parabolic interpolation.
//!
//! The difference function is computed through a real FFT cross-correlation
//! of the first half of the buffer with the whole buffer. For lags shorter
//! than half the buffer the circular product never wraps, so the result is
//! identical to the direct sum at O(N log N) instead of O(N^2).

use log::trace;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use crate::audio::AudioBuffer;
use crate::config::TunerConfig;
use crate::error::{PitchError, PitchResult};

/// Lowest frequency the estimator will report, in Hz.
pub const MIN_FREQUENCY: f32 = 20.0;
/// Highest frequency the estimator will report, in Hz.
pub const MAX_FREQUENCY: f32 = 1200.0;

struct CorrelationPlan {
    size: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    head: Vec<f64>,
    signal: Vec<f64>,
    head_spectrum: Vec<Complex<f64>>,
    signal_spectrum: Vec<Complex<f64>>,
    correlation: Vec<f64>,
}

impl CorrelationPlan {
    fn new(planner: &mut RealFftPlanner<f64>, size: usize) -> Self {
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            size,
            head: forward.make_input_vec(),
            signal: forward.make_input_vec(),
            head_spectrum: forward.make_output_vec(),
            signal_spectrum: forward.make_output_vec(),
            correlation: inverse.make_output_vec(),
            forward,
            inverse,
        }
    }

    /// `sum(x[j] * x[j + lag])` over `j < window`, for every `lag < window`.
    fn cross_correlate(&mut self, samples: &[f32], window: usize) -> PitchResult<&[f64]> {
        self.head.iter_mut().for_each(|v| *v = 0.0);
        for (dst, &src) in self.head.iter_mut().zip(&samples[..window]) {
            *dst = src as f64;
        }
        for (dst, &src) in self.signal.iter_mut().zip(samples) {
            *dst = src as f64;
        }

        self.forward
            .process(&mut self.head, &mut self.head_spectrum)
            .map_err(|e| PitchError::Fft(e.to_string()))?;
        self.forward
            .process(&mut self.signal, &mut self.signal_spectrum)
            .map_err(|e| PitchError::Fft(e.to_string()))?;

        for (head, signal) in self.head_spectrum.iter_mut().zip(&self.signal_spectrum) {
            *head = head.conj() * *signal;
        }

        // DC and Nyquist bins of a real signal's spectrum are real.
        if let Some(first) = self.head_spectrum.first_mut() {
            first.im = 0.0;
        }
        if self.size % 2 == 0 {
            if let Some(last) = self.head_spectrum.last_mut() {
                last.im = 0.0;
            }
        }

        self.inverse
            .process(&mut self.head_spectrum, &mut self.correlation)
            .map_err(|e| PitchError::Fft(e.to_string()))?;

        let scale = 1.0 / self.size as f64;
        for value in self.correlation.iter_mut().take(window) {
            *value *= scale;
        }

        Ok(&self.correlation[..window])
    }
}

pub struct PitchDetector {
    planner: RealFftPlanner<f64>,
    plan: Option<CorrelationPlan>,
    threshold: f64,
    min_rms: f32,
}

impl PitchDetector {
    pub fn new(config: &TunerConfig) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let plan = Some(CorrelationPlan::new(&mut planner, config.buffer_size));

        Self {
            planner,
            plan,
            threshold: config.yin_threshold as f64,
            min_rms: config.min_rms,
        }
    }

    /// Estimates the fundamental of `buffer`.
    ///
    /// `Ok(None)` means no pitch: silence, noise, a buffer too short to hold
    /// two periods of any supported frequency, or an estimate outside
    /// `MIN_FREQUENCY..=MAX_FREQUENCY`. `Err` is reserved for malformed input.
    pub fn estimate(&mut self, buffer: &AudioBuffer) -> PitchResult<Option<f32>> {
        let sample_rate = buffer.sample_rate();
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PitchError::InvalidSampleRate(sample_rate));
        }
        if buffer.is_empty() {
            return Err(PitchError::EmptyBuffer);
        }

        let window = buffer.len() / 2;
        let max_lag = ((sample_rate / MIN_FREQUENCY).floor() as usize).min(window.saturating_sub(1));
        let min_lag = 2;
        let min_period = (sample_rate / MAX_FREQUENCY).ceil() as usize;
        if max_lag < min_period.max(min_lag + 1) {
            return Ok(None);
        }

        if buffer.rms() < self.min_rms {
            return Ok(None);
        }

        let diff = self.difference_function(buffer.samples(), window)?;
        let cmnd = cumulative_mean_normalized_difference(&diff);

        let Some(tau) = absolute_threshold(&cmnd, min_lag, max_lag, self.threshold) else {
            return Ok(None);
        };

        let period = parabolic_interpolation(&cmnd, tau);
        let frequency = (sample_rate as f64 / period) as f32;
        trace!(
            "YIN lag {} -> {:.3} samples, cmnd {:.4}, {:.2} Hz",
            tau,
            period,
            cmnd[tau],
            frequency
        );

        if frequency.is_finite() && (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
            Ok(Some(frequency))
        } else {
            Ok(None)
        }
    }

    /// `d(lag) = sum((x[j] - x[j + lag])^2)` over `j < window`, expanded as
    /// `energy(head) + energy(lagged) - 2 * correlation(lag)`.
    fn difference_function(&mut self, samples: &[f32], window: usize) -> PitchResult<Vec<f64>> {
        let size = samples.len();
        if self.plan.as_ref().map(|plan| plan.size) != Some(size) {
            self.plan = Some(CorrelationPlan::new(&mut self.planner, size));
        }
        let plan = match self.plan.as_mut() {
            Some(plan) => plan,
            None => return Err(PitchError::Fft("correlation plan missing".into())),
        };

        let correlation = plan.cross_correlate(samples, window)?;

        let squared = |i: usize| {
            let v = samples[i] as f64;
            v * v
        };
        let head_energy: f64 = (0..window).map(squared).sum();
        let mut lagged_energy = head_energy;

        let mut diff = vec![0.0; window];
        for lag in 1..window {
            lagged_energy += squared(lag + window - 1) - squared(lag - 1);
            diff[lag] = (head_energy + lagged_energy - 2.0 * correlation[lag]).max(0.0);
        }

        Ok(diff)
    }
}

fn cumulative_mean_normalized_difference(diff: &[f64]) -> Vec<f64> {
    let mut cmnd = vec![1.0; diff.len()];
    let mut running_sum = 0.0;

    for lag in 1..diff.len() {
        running_sum += diff[lag];
        if running_sum > 0.0 {
            cmnd[lag] = diff[lag] * lag as f64 / running_sum;
        }
    }

    cmnd
}

/// First lag whose normalized difference drops below `threshold`, walked
/// forward to the bottom of that dip.
fn absolute_threshold(cmnd: &[f64], min_lag: usize, max_lag: usize, threshold: f64) -> Option<usize> {
    let mut lag = min_lag;
    while lag <= max_lag {
        if cmnd[lag] < threshold {
            while lag < max_lag && cmnd[lag + 1] < cmnd[lag] {
                lag += 1;
            }
            // A dip still falling at the edge of the window has its
            // minimum outside it: the period is longer than we can see.
            return match cmnd.get(lag + 1) {
                Some(&next) if next >= cmnd[lag] => Some(lag),
                _ => None,
            };
        }
        lag += 1;
    }
    None
}

fn parabolic_interpolation(cmnd: &[f64], lag: usize) -> f64 {
    if lag == 0 || lag + 1 >= cmnd.len() {
        return lag as f64;
    }

    let s0 = cmnd[lag - 1];
    let s1 = cmnd[lag];
    let s2 = cmnd[lag + 1];
    let denominator = s0 - 2.0 * s1 + s2;

    if denominator.abs() < 1e-12 {
        return lag as f64;
    }

    let shift = 0.5 * (s0 - s2) / denominator;
    if shift.is_finite() && shift.abs() <= 1.0 {
        lag as f64 + shift
    } else {
        lag as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE_RATE: f32 = 44100.0;

    fn generate_sine(frequency: f32, sample_rate: f32, len: usize) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate).sin())
            .collect();
        AudioBuffer::new(samples, sample_rate)
    }

    fn detector() -> PitchDetector {
        PitchDetector::new(&TunerConfig::default())
    }

    #[test]
    fn test_sine_within_one_percent() {
        let mut detector = detector();
        for frequency in [82.41, 110.0, 146.83, 196.0, 246.94, 329.63, 440.0, 1000.0] {
            let buffer = generate_sine(frequency, SAMPLE_RATE, 4096);
            let estimate = detector
                .estimate(&buffer)
                .unwrap()
                .unwrap_or_else(|| panic!("no pitch for {} Hz", frequency));
            assert!(
                (estimate - frequency).abs() <= frequency * 0.01,
                "Expected ~{} Hz, got {}",
                frequency,
                estimate
            );
        }
    }

    #[test]
    fn test_other_sample_rate_and_length() {
        let mut detector = detector();
        let buffer = generate_sine(220.0, 48000.0, 2048);
        let estimate = detector.estimate(&buffer).unwrap().unwrap();
        assert!((estimate - 220.0).abs() < 2.2, "got {}", estimate);
    }

    #[test]
    fn test_harmonic_rich_signal_reports_fundamental() {
        let mut detector = detector();
        let samples = (0..4096)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                0.4 * (2.0 * std::f32::consts::PI * 110.0 * t).sin()
                    + 0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 330.0 * t).sin()
            })
            .collect();
        let estimate = detector
            .estimate(&AudioBuffer::new(samples, SAMPLE_RATE))
            .unwrap()
            .unwrap();
        assert!((estimate - 110.0).abs() < 1.1, "got {}", estimate);
    }

    #[test]
    fn test_silence_is_no_pitch() {
        let buffer = AudioBuffer::new(vec![0.0; 4096], SAMPLE_RATE);
        assert_eq!(detector().estimate(&buffer).unwrap(), None);

        let ungated = TunerConfig {
            min_rms: 0.0,
            ..Default::default()
        };
        assert_eq!(PitchDetector::new(&ungated).estimate(&buffer).unwrap(), None);
    }

    #[test]
    fn test_noise_is_no_pitch() {
        let mut seed: u32 = 0x1234_5678;
        let samples = (0..4096)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect();
        let buffer = AudioBuffer::new(samples, SAMPLE_RATE);
        assert_eq!(detector().estimate(&buffer).unwrap(), None);
    }

    #[test]
    fn test_above_range_is_no_pitch() {
        let buffer = generate_sine(1500.0, SAMPLE_RATE, 4096);
        assert_eq!(detector().estimate(&buffer).unwrap(), None);
    }

    #[test]
    fn test_period_beyond_window_is_no_pitch() {
        let mut detector = detector();
        for sample_rate in [44100.0, 48000.0] {
            let longest_period = (4096 / 2 - 1) as f32;
            let mut frequency = 20.0;
            while frequency <= 23.0 {
                let buffer = generate_sine(frequency, sample_rate, 4096);
                let estimate = detector.estimate(&buffer).unwrap();
                if sample_rate / frequency > longest_period {
                    assert_eq!(estimate, None, "{} Hz at {} Hz", frequency, sample_rate);
                } else if let Some(estimate) = estimate {
                    assert!(
                        (estimate - frequency).abs() <= frequency * 0.01,
                        "Expected ~{} Hz at {} Hz, got {}",
                        frequency,
                        sample_rate,
                        estimate
                    );
                }
                frequency += 0.25;
            }
        }
    }

    #[test]
    fn test_dip_falling_at_window_edge_has_no_lag() {
        let falling = [1.0, 0.9, 0.5, 0.1, 0.05, 0.02];
        assert_eq!(absolute_threshold(&falling, 2, 5, 0.15), None);
        assert_eq!(absolute_threshold(&falling, 2, 4, 0.15), None);

        let dip = [1.0, 0.9, 0.1, 0.05, 0.2, 0.8];
        assert_eq!(absolute_threshold(&dip, 2, 5, 0.15), Some(3));
    }

    #[test]
    fn test_too_short_buffer_is_no_pitch() {
        // 32 usable lags cannot hold two periods of even 1200 Hz at 44.1 kHz
        let buffer = generate_sine(440.0, SAMPLE_RATE, 64);
        assert_eq!(detector().estimate(&buffer).unwrap(), None);
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        let mut detector = detector();
        assert!(matches!(
            detector.estimate(&AudioBuffer::new(vec![0.1; 4096], 0.0)),
            Err(PitchError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            detector.estimate(&AudioBuffer::new(vec![0.1; 4096], -44100.0)),
            Err(PitchError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            detector.estimate(&AudioBuffer::new(vec![0.1; 4096], f32::NAN)),
            Err(PitchError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            detector.estimate(&AudioBuffer::new(Vec::new(), SAMPLE_RATE)),
            Err(PitchError::EmptyBuffer)
        ));
    }

    #[test]
    fn test_deterministic() {
        let mut detector = detector();
        let buffer = generate_sine(196.0, SAMPLE_RATE, 4096);
        let first = detector.estimate(&buffer).unwrap();
        let second = detector.estimate(&buffer).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fft_difference_matches_direct_sum() {
        let buffer = generate_sine(146.83, SAMPLE_RATE, 1024);
        let samples = buffer.samples();
        let window = samples.len() / 2;

        let fast = detector().difference_function(samples, window).unwrap();

        for lag in [1, 7, 100, 300, window - 1] {
            let direct: f64 = (0..window)
                .map(|j| {
                    let delta = samples[j] as f64 - samples[j + lag] as f64;
                    delta * delta
                })
                .sum();
            assert_relative_eq!(fast[lag], direct, epsilon = 1e-6, max_relative = 1e-6);
        }
    }
}
