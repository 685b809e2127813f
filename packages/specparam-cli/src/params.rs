use crate::cli::{self, ModelArgs, WelchArgs};
use specparam_rs::reader::ReaderFactory;
use specparam_rs::{AperiodicMode, AvgType, FitSettings, FrequencyRange, ModelSettings, WelchSettings};
use std::path::Path;

/// Validate a recording path: existence and supported extension.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(format!("Input file not found: {}", file_path));
    }
    if !ReaderFactory::is_supported(path) {
        return Err(format!(
            "Unsupported file '{}'. Supported extensions: {}",
            file_path,
            ReaderFactory::supported_extensions().join(", ")
        ));
    }
    Ok(())
}

pub fn validate_dir(dir: &str, what: &str) -> Result<(), String> {
    if !Path::new(dir).is_dir() {
        return Err(format!("{} not found: {}", what, dir));
    }
    Ok(())
}

pub fn build_welch_settings(args: &WelchArgs) -> Result<WelchSettings, String> {
    let avg_type = args.average.parse::<AvgType>()?;

    if let Some(nperseg) = args.nperseg {
        if nperseg == 0 {
            return Err("--nperseg must be greater than 0".to_string());
        }
        if let Some(noverlap) = args.noverlap {
            if noverlap >= nperseg {
                return Err(format!(
                    "--noverlap ({}) must be less than --nperseg ({})",
                    noverlap, nperseg
                ));
            }
        }
    }

    if let Some(percent) = args.outlier_percent {
        if !(0.0..100.0).contains(&percent) {
            return Err(format!(
                "--outlier-percent must be in [0, 100), got {}",
                percent
            ));
        }
    }

    Ok(WelchSettings {
        nperseg: args.nperseg,
        noverlap: args.noverlap,
        avg_type,
        outlier_percent: args.outlier_percent,
    })
}

pub fn build_frequency_range(f_low: f64, f_high: f64) -> Result<FrequencyRange, String> {
    if !(f_low >= 0.0 && f_high.is_finite() && f_low < f_high) {
        return Err(format!(
            "Invalid frequency range [{}, {}]: need 0 <= f-low < f-high",
            f_low, f_high
        ));
    }
    Ok(FrequencyRange::new(f_low, f_high))
}

pub fn build_model_settings(args: &ModelArgs) -> Result<ModelSettings, String> {
    let settings = ModelSettings {
        peak_width_limits: cli::parse_range(&args.peak_width_limits)?,
        max_n_peaks: args.max_n_peaks,
        min_peak_height: args.min_peak_height,
        peak_threshold: args.peak_threshold,
        aperiodic_mode: args.aperiodic_mode.parse::<AperiodicMode>()?,
    };
    settings.validate().map_err(|e| e.to_string())?;
    Ok(settings)
}

pub fn build_fit_settings(welch: &WelchArgs, model: &ModelArgs) -> Result<FitSettings, String> {
    Ok(FitSettings {
        f_range: build_frequency_range(model.f_low, model.f_high)?,
        welch: build_welch_settings(welch)?,
        model: build_model_settings(model)?,
    })
}
