//! Spectral parameterization
//!
//! Decomposes a log10 power spectrum into an aperiodic component (offset,
//! optional knee, exponent) plus a sum of Gaussian peaks:
//!
//! 1. robust aperiodic fit (fit, flatten, refit on the quietest bins)
//! 2. iterative peak search on the flattened spectrum
//! 3. joint bounded fit of all peak Gaussians
//! 4. final aperiodic fit on the spectrum with the peaks removed

pub mod funcs;
pub mod optimize;

use crate::error::{Result, SpecParamError};
use crate::types::{FrequencyRange, PeakParams};
use funcs::{
    aperiodic_fixed, aperiodic_knee, gauss_std_from_fwhm, gaussian_sum, mean_abs_error,
    percentile, r_squared, std_dev,
};
use nalgebra::DMatrix;
use optimize::{levenberg_marquardt, linear_least_squares, Bounds, LmOptions};
use serde::{Deserialize, Serialize};

/// Percentile of the flattened spectrum kept for the robust aperiodic refit
const AP_PERCENTILE_THRESH: f64 = 0.025;
/// Peak center bound, in multiples of the guessed std on either side
const CF_BOUND: f64 = 1.5;
/// Peaks closer than this many stds to a range edge are dropped
const BW_STD_EDGE: f64 = 1.0;
/// Overlap threshold between neighbouring guesses, in stds
const GAUSS_OVERLAP_THRESH: f64 = 0.75;
const MAX_FUNCTION_EVALS: usize = 5000;
/// Peaks below this height (log10 power) are rounding residue, not signal
const HEIGHT_FLOOR: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AperiodicMode {
    /// `offset - log10(f^exp)`
    #[default]
    Fixed,
    /// `offset - log10(knee + f^exp)`
    Knee,
}

impl std::str::FromStr for AperiodicMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(AperiodicMode::Fixed),
            "knee" => Ok(AperiodicMode::Knee),
            other => Err(format!(
                "Unknown aperiodic mode '{}'. Valid: fixed, knee",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Allowed full peak bandwidth in Hz, `[min, max]`
    pub peak_width_limits: [f64; 2],
    pub max_n_peaks: Option<usize>,
    /// Absolute minimum peak height above the aperiodic fit, log10 power
    pub min_peak_height: f64,
    /// Relative detection threshold, in standard deviations of the flattened spectrum
    pub peak_threshold: f64,
    pub aperiodic_mode: AperiodicMode,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            peak_width_limits: [1.0, 12.0],
            max_n_peaks: None,
            min_peak_height: 0.0,
            peak_threshold: 2.0,
            aperiodic_mode: AperiodicMode::Fixed,
        }
    }
}

impl ModelSettings {
    pub fn validate(&self) -> Result<()> {
        let [lo, hi] = self.peak_width_limits;
        if !(lo > 0.0 && hi > lo && hi.is_finite()) {
            return Err(SpecParamError::InvalidParameter(format!(
                "peak width limits must satisfy 0 < min < max, got [{}, {}]",
                lo, hi
            )));
        }
        if self.min_peak_height < 0.0 || !self.min_peak_height.is_finite() {
            return Err(SpecParamError::InvalidParameter(format!(
                "minimum peak height must be >= 0, got {}",
                self.min_peak_height
            )));
        }
        if self.peak_threshold < 0.0 || !self.peak_threshold.is_finite() {
            return Err(SpecParamError::InvalidParameter(format!(
                "peak threshold must be >= 0, got {}",
                self.peak_threshold
            )));
        }
        Ok(())
    }

    fn gauss_std_limits(&self) -> [f64; 2] {
        [self.peak_width_limits[0] / 2.0, self.peak_width_limits[1] / 2.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AperiodicParams {
    pub offset: f64,
    pub knee: Option<f64>,
    pub exponent: f64,
}

impl AperiodicParams {
    fn from_vec(mode: AperiodicMode, params: &[f64]) -> Self {
        match mode {
            AperiodicMode::Fixed => Self {
                offset: params[0],
                knee: None,
                exponent: params[1],
            },
            AperiodicMode::Knee => Self {
                offset: params[0],
                knee: Some(params[1]),
                exponent: params[2],
            },
        }
    }

    fn nan(mode: AperiodicMode) -> Self {
        Self {
            offset: f64::NAN,
            knee: (mode == AperiodicMode::Knee).then_some(f64::NAN),
            exponent: f64::NAN,
        }
    }

    pub fn evaluate(&self, freqs: &[f64]) -> Vec<f64> {
        match self.knee {
            None => aperiodic_fixed(freqs, self.offset, self.exponent),
            Some(knee) => aperiodic_knee(freqs, self.offset, knee, self.exponent),
        }
    }
}

/// A fitted Gaussian: center, height, standard deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    pub center: f64,
    pub height: f64,
    pub std: f64,
}

/// Everything produced by one model fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralFit {
    pub freqs: Vec<f64>,
    /// Fitted data, log10 power
    pub power_spectrum: Vec<f64>,
    pub aperiodic: AperiodicParams,
    pub gaussians: Vec<GaussianParams>,
    pub peaks: Vec<PeakParams>,
    pub aperiodic_fit: Vec<f64>,
    pub peak_fit: Vec<f64>,
    pub modeled_spectrum: Vec<f64>,
    pub r_squared: f64,
    pub error: f64,
    /// False when the optimizer failed and the parameters are NaN
    pub success: bool,
}

impl SpectralFit {
    pub fn n_peaks(&self) -> usize {
        self.peaks.len()
    }
}

pub struct SpectralModel {
    settings: ModelSettings,
    lm_options: LmOptions,
}

impl SpectralModel {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            lm_options: LmOptions {
                max_evals: MAX_FUNCTION_EVALS,
                ..Default::default()
            },
        })
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Fit a linear-power spectrum over `f_range` (inclusive).
    ///
    /// Invalid input is an error. An optimizer failure is not: it returns a
    /// fit with `success == false`, NaN parameters and no peaks.
    pub fn fit(&self, freqs: &[f64], power: &[f64], f_range: FrequencyRange) -> Result<SpectralFit> {
        let (freqs, spectrum) = self.prepare(freqs, power, f_range)?;

        match self.fit_log_spectrum(&freqs, &spectrum) {
            Some(fit) => Ok(fit),
            None => {
                log::debug!("Model fitting was unsuccessful");
                Ok(self.failed_fit(freqs, spectrum))
            }
        }
    }

    fn prepare(
        &self,
        freqs: &[f64],
        power: &[f64],
        f_range: FrequencyRange,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        if freqs.len() != power.len() {
            return Err(SpecParamError::InvalidParameter(format!(
                "{} frequencies but {} power values",
                freqs.len(),
                power.len()
            )));
        }
        if !(f_range.low < f_range.high) {
            return Err(SpecParamError::InvalidParameter(format!(
                "frequency range [{}, {}] is empty",
                f_range.low, f_range.high
            )));
        }

        // A 0 Hz bin has no finite aperiodic value
        let (freqs, power): (Vec<f64>, Vec<f64>) = freqs
            .iter()
            .zip(power)
            .filter(|(f, _)| f_range.contains(**f) && **f > 0.0)
            .map(|(f, p)| (*f, *p))
            .unzip();

        if freqs.len() < 3 {
            return Err(SpecParamError::InvalidParameter(format!(
                "only {} frequency bins in [{}, {}] Hz",
                freqs.len(),
                f_range.low,
                f_range.high
            )));
        }
        if power.iter().any(|p| !(*p > 0.0 && p.is_finite())) {
            return Err(SpecParamError::InvalidParameter(
                "power spectrum contains non-positive or non-finite values".to_string(),
            ));
        }

        let freq_res = freqs[1] - freqs[0];
        if self.settings.peak_width_limits[0] < 2.0 * freq_res {
            log::debug!(
                "Lower peak width limit {} Hz is below twice the frequency resolution ({} Hz)",
                self.settings.peak_width_limits[0],
                freq_res
            );
        }

        let spectrum = power.iter().map(|p| p.log10()).collect();
        Ok((freqs, spectrum))
    }

    fn failed_fit(&self, freqs: Vec<f64>, spectrum: Vec<f64>) -> SpectralFit {
        let n = freqs.len();
        SpectralFit {
            freqs,
            power_spectrum: spectrum,
            aperiodic: AperiodicParams::nan(self.settings.aperiodic_mode),
            gaussians: Vec::new(),
            peaks: Vec::new(),
            aperiodic_fit: vec![f64::NAN; n],
            peak_fit: vec![f64::NAN; n],
            modeled_spectrum: vec![f64::NAN; n],
            r_squared: f64::NAN,
            error: f64::NAN,
            success: false,
        }
    }

    fn fit_log_spectrum(&self, freqs: &[f64], spectrum: &[f64]) -> Option<SpectralFit> {
        let mode = self.settings.aperiodic_mode;

        let robust_ap = self.robust_aperiodic_fit(freqs, spectrum)?;
        let initial_ap_fit = AperiodicParams::from_vec(mode, &robust_ap).evaluate(freqs);
        let flat: Vec<f64> = spectrum
            .iter()
            .zip(&initial_ap_fit)
            .map(|(s, a)| s - a)
            .collect();

        let gaussian_vec = self.fit_peaks(freqs, &flat)?;
        let peak_fit = gaussian_sum(freqs, &gaussian_vec);

        let peak_removed: Vec<f64> = spectrum.iter().zip(&peak_fit).map(|(s, p)| s - p).collect();
        let ap_vec = self.simple_aperiodic_fit(freqs, &peak_removed)?;
        let aperiodic = AperiodicParams::from_vec(mode, &ap_vec);
        let aperiodic_fit = aperiodic.evaluate(freqs);

        let modeled_spectrum: Vec<f64> = aperiodic_fit
            .iter()
            .zip(&peak_fit)
            .map(|(a, p)| a + p)
            .collect();
        if modeled_spectrum.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let gaussians: Vec<GaussianParams> = gaussian_vec
            .chunks_exact(3)
            .map(|g| GaussianParams {
                center: g[0],
                height: g[1],
                std: g[2],
            })
            .collect();
        let peaks = gaussians
            .iter()
            .map(|g| {
                let nearest = freqs
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| (*a - g.center).abs().total_cmp(&(*b - g.center).abs()))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                PeakParams {
                    center_frequency: g.center,
                    power: modeled_spectrum[nearest] - aperiodic_fit[nearest],
                    bandwidth: 2.0 * g.std,
                }
            })
            .collect();

        Some(SpectralFit {
            freqs: freqs.to_vec(),
            power_spectrum: spectrum.to_vec(),
            aperiodic,
            gaussians,
            peaks,
            r_squared: r_squared(spectrum, &modeled_spectrum),
            error: mean_abs_error(spectrum, &modeled_spectrum),
            aperiodic_fit,
            peak_fit,
            modeled_spectrum,
            success: true,
        })
    }

    fn aperiodic_guess(&self, freqs: &[f64], spectrum: &[f64]) -> Vec<f64> {
        let last = freqs.len() - 1;
        let exponent = ((spectrum[last] - spectrum[0]) / (freqs[last].log10() - freqs[0].log10())).abs();
        match self.settings.aperiodic_mode {
            AperiodicMode::Fixed => vec![spectrum[0], exponent],
            AperiodicMode::Knee => vec![spectrum[0], 0.0, exponent],
        }
    }

    /// Aperiodic fit starting from `p0` (or the default guess).
    fn aperiodic_fit_from(&self, freqs: &[f64], spectrum: &[f64], p0: &[f64]) -> Option<Vec<f64>> {
        match self.settings.aperiodic_mode {
            AperiodicMode::Fixed => {
                // offset - exp * log10(f) is linear in its parameters
                let design = DMatrix::from_fn(freqs.len(), 2, |i, j| {
                    if j == 0 {
                        1.0
                    } else {
                        -freqs[i].log10()
                    }
                });
                linear_least_squares(&design, spectrum)
            }
            AperiodicMode::Knee => levenberg_marquardt(
                |f: &[f64], p: &[f64]| aperiodic_knee(f, p[0], p[1], p[2]),
                freqs,
                spectrum,
                p0,
                &Bounds::unbounded(3),
                self.lm_options,
            ),
        }
    }

    fn simple_aperiodic_fit(&self, freqs: &[f64], spectrum: &[f64]) -> Option<Vec<f64>> {
        let guess = self.aperiodic_guess(freqs, spectrum);
        self.aperiodic_fit_from(freqs, spectrum, &guess)
    }

    fn robust_aperiodic_fit(&self, freqs: &[f64], spectrum: &[f64]) -> Option<Vec<f64>> {
        let initial = self.simple_aperiodic_fit(freqs, spectrum)?;
        let initial_fit =
            AperiodicParams::from_vec(self.settings.aperiodic_mode, &initial).evaluate(freqs);

        let flat: Vec<f64> = spectrum
            .iter()
            .zip(&initial_fit)
            .map(|(s, a)| (s - a).max(0.0))
            .collect();
        let threshold = percentile(&flat, AP_PERCENTILE_THRESH);

        let (quiet_freqs, quiet_power): (Vec<f64>, Vec<f64>) = freqs
            .iter()
            .zip(spectrum)
            .zip(&flat)
            .filter(|(_, f)| **f <= threshold)
            .map(|((f, s), _)| (*f, *s))
            .unzip();

        // Too few quiet bins to refit: keep the initial fit
        if quiet_freqs.len() < initial.len() {
            return Some(initial);
        }
        self.aperiodic_fit_from(&quiet_freqs, &quiet_power, &initial)
    }

    /// Search for peaks on a flattened spectrum; returns `[cf, height, std]*`.
    fn fit_peaks(&self, freqs: &[f64], flat: &[f64]) -> Option<Vec<f64>> {
        let guesses = self.guess_peaks(freqs, flat);
        let guesses = drop_edge_peaks(freqs, guesses);
        let guesses = drop_overlapping_peaks(guesses);

        if guesses.is_empty() {
            return Some(Vec::new());
        }
        self.fit_peak_guess(freqs, flat, &guesses)
    }

    fn guess_peaks(&self, freqs: &[f64], flat: &[f64]) -> Vec<[f64; 3]> {
        let freq_res = freqs[1] - freqs[0];
        let [std_lo, std_hi] = self.settings.gauss_std_limits();
        let max_n_peaks = self.settings.max_n_peaks.unwrap_or(usize::MAX);

        let mut flat_iter = flat.to_vec();
        let mut guesses: Vec<[f64; 3]> = Vec::new();

        while guesses.len() < max_n_peaks {
            let (max_ind, max_height) = flat_iter
                .iter()
                .copied()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .unwrap_or((0, f64::NAN));

            if !(max_height > self.settings.peak_threshold * std_dev(&flat_iter)) {
                break;
            }
            if !(max_height > self.settings.min_peak_height.max(HEIGHT_FLOOR)) {
                break;
            }

            let guess_freq = freqs[max_ind];
            let half_height = 0.5 * max_height;
            let left = (1..max_ind).rev().find(|&i| flat_iter[i] <= half_height);
            let right = (max_ind + 1..flat_iter.len()).find(|&i| flat_iter[i] <= half_height);

            let short_side = [left, right]
                .iter()
                .flatten()
                .map(|&i| i.abs_diff(max_ind))
                .min();
            let guess_std = match short_side {
                Some(side) => gauss_std_from_fwhm(side as f64 * 2.0 * freq_res),
                None => (std_lo + std_hi) / 2.0,
            }
            .clamp(std_lo, std_hi);

            let guess = [guess_freq, max_height, guess_std];
            for (value, g) in flat_iter.iter_mut().zip(gaussian_sum(freqs, &guess)) {
                *value -= g;
            }
            guesses.push(guess);
        }

        guesses
    }

    fn fit_peak_guess(&self, freqs: &[f64], flat: &[f64], guesses: &[[f64; 3]]) -> Option<Vec<f64>> {
        let [std_lo, std_hi] = self.settings.gauss_std_limits();
        let (f_lo, f_hi) = (freqs[0], freqs[freqs.len() - 1]);

        let mut bounds = Bounds {
            lower: Vec::with_capacity(guesses.len() * 3),
            upper: Vec::with_capacity(guesses.len() * 3),
        };
        for g in guesses {
            let cf_lo = g[0] - 2.0 * CF_BOUND * g[2];
            let cf_hi = g[0] + 2.0 * CF_BOUND * g[2];
            bounds
                .lower
                .extend([if cf_lo > f_lo { cf_lo } else { f_lo }, 0.0, std_lo]);
            bounds
                .upper
                .extend([if cf_hi < f_hi { cf_hi } else { f_hi }, f64::INFINITY, std_hi]);
        }

        let p0: Vec<f64> = guesses.iter().flatten().copied().collect();
        let fitted = levenberg_marquardt(gaussian_sum, freqs, flat, &p0, &bounds, self.lm_options)?;

        let mut peaks: Vec<[f64; 3]> = fitted
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        peaks.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Some(peaks.into_iter().flatten().collect())
    }
}

/// Drop guesses whose center is within `BW_STD_EDGE` stds of either range edge.
fn drop_edge_peaks(freqs: &[f64], guesses: Vec<[f64; 3]>) -> Vec<[f64; 3]> {
    let (f_lo, f_hi) = (freqs[0], freqs[freqs.len() - 1]);
    guesses
        .into_iter()
        .filter(|g| {
            let edge = g[2] * BW_STD_EDGE;
            (g[0] - f_lo).abs() > edge && (g[0] - f_hi).abs() > edge
        })
        .collect()
}

/// Of two neighbouring guesses whose `cf ± 0.75·std` spans overlap, drop the lower one.
fn drop_overlapping_peaks(mut guesses: Vec<[f64; 3]>) -> Vec<[f64; 3]> {
    guesses.sort_by(|a, b| a[0].total_cmp(&b[0]));

    let spans: Vec<(f64, f64)> = guesses
        .iter()
        .map(|g| {
            (
                g[0] - g[2] * GAUSS_OVERLAP_THRESH,
                g[0] + g[2] * GAUSS_OVERLAP_THRESH,
            )
        })
        .collect();

    let mut dropped = vec![false; guesses.len()];
    for i in 0..guesses.len().saturating_sub(1) {
        if spans[i].1 > spans[i + 1].0 {
            let lower = if guesses[i][1] <= guesses[i + 1][1] {
                i
            } else {
                i + 1
            };
            dropped[lower] = true;
        }
    }

    guesses
        .into_iter()
        .zip(dropped)
        .filter(|(_, d)| !d)
        .map(|(g, _)| g)
        .collect()
}
