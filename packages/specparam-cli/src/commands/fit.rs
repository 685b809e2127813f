use crate::cli::FitArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use rayon::prelude::*;
use serde::Serialize;
use specparam_rs::model::GaussianParams;
use specparam_rs::pipeline::fit_channel;
use specparam_rs::reader::load_recording;
use specparam_rs::{FitSettings, PeakParams, SpectralModel};
use std::path::Path;

#[derive(Serialize)]
struct ChannelFit {
    channel: String,
    success: bool,
    aperiodic_offset: f64,
    aperiodic_knee: Option<f64>,
    aperiodic_exponent: f64,
    n_peaks: usize,
    peaks: Vec<PeakParams>,
    gaussians: Vec<GaussianParams>,
    r_squared: f64,
    error: f64,
    message: Option<String>,
}

impl ChannelFit {
    fn failed(channel: &str, message: String) -> Self {
        Self {
            channel: channel.to_string(),
            success: false,
            aperiodic_offset: f64::NAN,
            aperiodic_knee: None,
            aperiodic_exponent: f64::NAN,
            n_peaks: 0,
            peaks: Vec::new(),
            gaussians: Vec::new(),
            r_squared: f64::NAN,
            error: f64::NAN,
            message: Some(message),
        }
    }
}

#[derive(Serialize)]
struct FitOutput<'a> {
    file: String,
    sample_rate: f64,
    duration_seconds: f64,
    settings: &'a FitSettings,
    channels: Vec<ChannelFit>,
}

pub fn execute(args: FitArgs) -> i32 {
    if let Err(msg) = params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let settings = match params::build_fit_settings(&args.welch, &args.model) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let model = match SpectralModel::new(settings.model.clone()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let recording = match load_recording(Path::new(&args.file), args.channels.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !args.quiet {
        eprintln!("Fitting {}...", args.file);
        eprintln!(
            "  Channels: {} @ {} Hz, {:.1}s",
            recording.channel_names().len(),
            recording.sample_rate(),
            recording.metadata.duration()
        );
        eprintln!(
            "  Range: {}-{} Hz, mode: {:?}",
            settings.f_range.low, settings.f_range.high, settings.model.aperiodic_mode
        );
    }

    let sample_rate = recording.sample_rate();
    let channels: Vec<(&str, &[f64])> = recording.channels().collect();
    let fits: Vec<ChannelFit> = channels
        .par_iter()
        .map(|(name, samples)| match fit_channel(&model, samples, sample_rate, &settings) {
            Ok(fit) if fit.success => ChannelFit {
                channel: name.to_string(),
                success: true,
                aperiodic_offset: fit.aperiodic.offset,
                aperiodic_knee: fit.aperiodic.knee,
                aperiodic_exponent: fit.aperiodic.exponent,
                n_peaks: fit.n_peaks(),
                peaks: fit.peaks.clone(),
                gaussians: fit.gaussians.clone(),
                r_squared: fit.r_squared,
                error: fit.error,
                message: None,
            },
            Ok(_) => ChannelFit::failed(name, "model fit did not converge".to_string()),
            Err(e) => ChannelFit::failed(name, e.to_string()),
        })
        .collect();

    let failed = fits.iter().filter(|f| !f.success).count();
    if !args.quiet && failed > 0 {
        eprintln!("  {} of {} channel fits failed", failed, fits.len());
    }

    let result = FitOutput {
        file: args.file.clone(),
        sample_rate,
        duration_seconds: recording.metadata.duration(),
        settings: &settings,
        channels: fits,
    };

    if let Err(e) = output::emit_json(&result, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if !args.quiet {
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }

    exit_codes::SUCCESS
}
