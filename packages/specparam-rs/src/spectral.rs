//! Welch power spectral density
//!
//! Short-time spectra over overlapping Hann-windowed segments, averaged
//! across segments. Defaults follow the usual EEG resting-state setup:
//! one-second segments, one-eighth overlap, density scaling, one-sided
//! output.

use crate::error::{Result, SpecParamError};
use crate::types::PowerSpectrum;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::f64::consts::PI;

thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// How segment spectra are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvgType {
    #[default]
    Mean,
    Median,
}

impl std::str::FromStr for AvgType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(AvgType::Mean),
            "median" => Ok(AvgType::Median),
            other => Err(format!("Unknown averaging '{}'. Valid: mean, median", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WelchSettings {
    /// Segment length in samples (default: one second)
    pub nperseg: Option<usize>,
    /// Overlap in samples (default: nperseg / 8)
    pub noverlap: Option<usize>,
    pub avg_type: AvgType,
    /// Percentage of highest-power segments to discard before averaging
    pub outlier_percent: Option<f64>,
}

/// Periodic Hann window (the DFT-even form used for spectral analysis).
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Resolve segment length and overlap for a signal of `len` samples.
fn segment_params(len: usize, fs: f64, settings: &WelchSettings) -> Result<(usize, usize)> {
    let mut nperseg = settings.nperseg.unwrap_or(fs as usize);
    if nperseg == 0 {
        return Err(SpecParamError::InvalidParameter(
            "segment length must be greater than 0".to_string(),
        ));
    }
    if nperseg > len {
        log::debug!(
            "nperseg = {} is greater than input length = {}, using nperseg = {}",
            nperseg,
            len,
            len
        );
        nperseg = len;
    }

    let noverlap = settings.noverlap.unwrap_or(nperseg / 8);
    if noverlap >= nperseg {
        return Err(SpecParamError::InvalidParameter(format!(
            "overlap ({}) must be less than segment length ({})",
            noverlap, nperseg
        )));
    }
    Ok((nperseg, noverlap))
}

/// Density-scaled one-sided periodogram of every segment.
fn segment_spectra(signal: &[f64], fs: f64, nperseg: usize, noverlap: usize) -> Vec<Vec<f64>> {
    let step = nperseg - noverlap;
    let n_segments = (signal.len() - noverlap) / step;
    let window = hann_window(nperseg);
    let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());
    let n_positive = nperseg / 2 + 1;

    let fft = FFT_PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(nperseg));
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];

    (0..n_segments)
        .map(|seg| {
            let segment = &signal[seg * step..seg * step + nperseg];
            let mean = segment.iter().sum::<f64>() / nperseg as f64;
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&window) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            fft.process(&mut buffer);

            let mut power: Vec<f64> = buffer[..n_positive]
                .iter()
                .map(|c| c.norm_sqr() * scale)
                .collect();
            // Fold negative frequencies; DC and an even-length Nyquist bin are unique.
            let last = if nperseg % 2 == 0 {
                n_positive - 1
            } else {
                n_positive
            };
            for p in &mut power[1..last] {
                *p *= 2.0;
            }
            power
        })
        .collect()
}

/// Drop the `percent` of segments with the highest mean log10 power.
fn discard_outliers(mut segments: Vec<Vec<f64>>, percent: f64) -> Vec<Vec<f64>> {
    let n_discard = (segments.len() as f64 / 100.0 * percent).ceil() as usize;
    if n_discard == 0 || n_discard >= segments.len() {
        return segments;
    }

    let mean_log = |seg: &Vec<f64>| {
        seg.iter().map(|p| p.max(f64::MIN_POSITIVE).log10()).sum::<f64>() / seg.len() as f64
    };
    segments.sort_by(|a, b| mean_log(a).total_cmp(&mean_log(b)));
    segments.truncate(segments.len() - n_discard);
    segments
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Compute the Welch power spectrum of one channel.
pub fn compute_spectrum_welch(
    signal: &[f64],
    fs: f64,
    settings: &WelchSettings,
) -> Result<PowerSpectrum> {
    if signal.is_empty() {
        return Err(SpecParamError::Spectrum("empty signal".to_string()));
    }
    if !(fs > 0.0 && fs.is_finite()) {
        return Err(SpecParamError::Spectrum(format!(
            "invalid sampling rate {}",
            fs
        )));
    }

    let (nperseg, noverlap) = segment_params(signal.len(), fs, settings)?;
    let mut segments = segment_spectra(signal, fs, nperseg, noverlap);
    if let Some(percent) = settings.outlier_percent {
        segments = discard_outliers(segments, percent);
    }

    let n_positive = nperseg / 2 + 1;
    let frequencies: Vec<f64> = (0..n_positive)
        .map(|k| k as f64 * fs / nperseg as f64)
        .collect();

    let power: Vec<f64> = match settings.avg_type {
        AvgType::Mean => (0..n_positive)
            .map(|k| segments.iter().map(|s| s[k]).sum::<f64>() / segments.len() as f64)
            .collect(),
        AvgType::Median => (0..n_positive)
            .map(|k| {
                let mut column: Vec<f64> = segments.iter().map(|s| s[k]).collect();
                median(&mut column)
            })
            .collect(),
    };

    Ok(PowerSpectrum { frequencies, power })
}
