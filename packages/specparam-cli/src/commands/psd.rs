use crate::cli::PsdArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use specparam_rs::pipeline::channel_spectrum;
use specparam_rs::reader::load_recording;
use std::path::Path;

#[derive(Serialize)]
struct PsdOutput {
    file: String,
    channel: String,
    sample_rate: f64,
    frequency_resolution: f64,
    /// Bins replaced during sanitation
    replaced: usize,
    frequencies: Vec<f64>,
    power: Vec<f64>,
}

pub fn execute(args: PsdArgs) -> i32 {
    if let Err(msg) = params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let welch = match params::build_welch_settings(&args.welch) {
        Ok(w) => w,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let selection = [args.channel.clone()];
    let recording = match load_recording(Path::new(&args.file), Some(selection.as_slice())) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let Some(samples) = recording.data.first() else {
        eprintln!("Error: Channel '{}' has no data", args.channel);
        return exit_codes::INPUT_ERROR;
    };

    let (spectrum, replaced) = match channel_spectrum(samples, recording.sample_rate(), &welch) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let f_low = args.f_low.unwrap_or(f64::NEG_INFINITY);
    let f_high = args.f_high.unwrap_or(f64::INFINITY);
    let (frequencies, power): (Vec<f64>, Vec<f64>) = spectrum
        .frequencies
        .iter()
        .zip(&spectrum.power)
        .filter(|(f, _)| **f >= f_low && **f <= f_high)
        .map(|(f, p)| (*f, *p))
        .unzip();

    let result = PsdOutput {
        file: args.file.clone(),
        channel: args.channel.clone(),
        sample_rate: recording.sample_rate(),
        frequency_resolution: spectrum.frequencies.get(1).copied().unwrap_or(0.0),
        replaced,
        frequencies,
        power,
    };

    if let Err(e) = output::emit_json(&result, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    exit_codes::SUCCESS
}
