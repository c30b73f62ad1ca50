//! Spectral analysis
//!
//! Fixed-size magnitude spectra for the detection pipeline. The transform
//! size is locked in at construction; per-call input length is normalized by
//! zero-padding or truncation.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

/// Errors returned by the spectral analyzer.
#[derive(Debug, Error)]
pub enum SpectrumError {
    /// An error occurred during the configuration of the analyzer.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Window function applied to samples ahead of the transform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// No shaping; samples enter the transform as captured.
    #[default]
    Rectangular,
    /// Hann window, trading peak height for less spectral leakage.
    Hann,
}

/// Builder for a [`SpectralAnalyzer`].
pub struct SpectralAnalyzerBuilder {
    transform_size: usize,
    sample_rate: usize,
    window: WindowFunction,
}

impl SpectralAnalyzerBuilder {
    /// Start with default parameters:
    /// transform_size = 2048, sample_rate = 44_100, rectangular window.
    pub fn new() -> Self {
        SpectralAnalyzerBuilder {
            transform_size: 2048,
            sample_rate: 44_100,
            window: WindowFunction::Rectangular,
        }
    }

    /// Set the transform size. Must be a power of two.
    pub fn transform_size(mut self, size: usize) -> Self {
        self.transform_size = size;
        self
    }

    /// Set the sampling rate of the audio.
    pub fn sample_rate(mut self, rate: usize) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the window function.
    pub fn window(mut self, window: WindowFunction) -> Self {
        self.window = window;
        self
    }

    /// Finalize and create the analyzer.
    pub fn build(self) -> Result<SpectralAnalyzer, SpectrumError> {
        if self.transform_size == 0 || !self.transform_size.is_power_of_two() {
            return Err(SpectrumError::Configuration(
                "transform_size must be a non-zero power of two".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(SpectrumError::Configuration(
                "sample_rate cannot be zero".into(),
            ));
        }

        // Prepare the FFT plan once
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.transform_size);

        let window_values = match self.window {
            WindowFunction::Rectangular => None,
            WindowFunction::Hann => Some(make_hann_window(self.transform_size)),
        };

        Ok(SpectralAnalyzer {
            transform_size: self.transform_size,
            sample_rate: self.sample_rate,
            fft_buffer: vec![Complex { re: 0.0, im: 0.0 }; self.transform_size],
            magnitude: vec![0.0; self.transform_size / 2],
            window_values,
            fft,
        })
    }
}

impl Default for SpectralAnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size FFT producing half-spectrum magnitudes.
pub struct SpectralAnalyzer {
    transform_size: usize,
    sample_rate: usize,
    fft_buffer: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
    window_values: Option<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralAnalyzer {
    /// Start customizing with a builder.
    pub fn builder() -> SpectralAnalyzerBuilder {
        SpectralAnalyzerBuilder::new()
    }

    /// Transform a sample buffer into its magnitude spectrum.
    ///
    /// Inputs shorter than the transform size are zero-padded, longer inputs
    /// are truncated; neither is an error. Every input slot is rewritten on
    /// each call, so no data from a prior call survives into this one. The
    /// returned slice holds the first half of the bins (up to Nyquist), with
    /// bin `i` centered at `i * sample_rate / transform_size` Hz and
    /// unnormalized magnitudes `sqrt(re^2 + im^2)`.
    pub fn transform(&mut self, samples: &[f32]) -> &[f32] {
        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            let mut sample = samples.get(i).copied().unwrap_or(0.0);
            if let Some(window) = &self.window_values {
                sample *= window[i];
            }
            slot.re = sample;
            slot.im = 0.0;
        }

        self.fft.process(&mut self.fft_buffer);

        for (i, mag) in self.magnitude.iter_mut().enumerate() {
            let c = &self.fft_buffer[i];
            *mag = (c.re * c.re + c.im * c.im).sqrt();
        }
        &self.magnitude
    }

    /// Width of one spectrum bin in Hz.
    pub fn frequency_resolution(&self) -> f32 {
        self.sample_rate as f32 / self.transform_size as f32
    }

    /// Center frequency of bin `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.frequency_resolution()
    }

    /// Configured transform size.
    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Configured sampling rate.
    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    /// Number of magnitude bins exposed per transform.
    pub fn spectrum_len(&self) -> usize {
        self.transform_size / 2
    }
}

fn make_hann_window(size: usize) -> Vec<f32> {
    let denom = (size - 1) as f32;
    (0..size)
        .map(|n| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / denom).cos()))
        .collect()
}
