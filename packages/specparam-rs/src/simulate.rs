//! Synthetic resting-state EEG
//!
//! Generates 1/f^χ noise with an optional alpha oscillation and lays it out
//! as a small BIDS dataset of EEGLAB recordings, so the whole pipeline can be
//! exercised without real data.

use crate::error::Result;
use crate::participants::{
    Participant, NS_FIRST, PARTICIPANT_ID_COLUMN, SESSION_ORDER_COLUMN,
};
use crate::types::Condition;
use crate::writer::write_eeglab;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

/// Generative parameters of one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSpec {
    /// Aperiodic exponent χ of the 1/f^χ power law
    pub exponent: f64,
    /// Standard deviation of the aperiodic part, in microvolts
    pub scale: f64,
    pub alpha_frequency: Option<f64>,
    /// Alpha sinusoid amplitude, in units of `scale`
    pub alpha_amplitude: f64,
}

impl Default for SignalSpec {
    fn default() -> Self {
        Self {
            exponent: 1.5,
            scale: 10.0,
            alpha_frequency: Some(10.0),
            alpha_amplitude: 1.0,
        }
    }
}

/// Zero-mean, unit-variance noise with power falling as 1/f^exponent.
fn power_law_noise(n: usize, fs: f64, exponent: f64, rng: &mut StdRng) -> Vec<f64> {
    if n < 2 {
        return vec![0.0; n];
    }

    let mut spectrum = vec![Complex::new(0.0, 0.0); n];
    for k in 1..=n / 2 {
        let freq = k as f64 * fs / n as f64;
        let amplitude = freq.powf(-exponent / 2.0);
        let value = Complex::new(
            rng.sample::<f64, _>(StandardNormal) * amplitude,
            rng.sample::<f64, _>(StandardNormal) * amplitude,
        );
        spectrum[k] = value;
        spectrum[n - k] = value.conj();
    }
    if n % 2 == 0 {
        // Nyquist bin must be real
        spectrum[n / 2] = Complex::new(spectrum[n / 2].re, 0.0);
    }

    let ifft = FftPlanner::<f64>::new().plan_fft_inverse(n);
    ifft.process(&mut spectrum);

    let signal: Vec<f64> = spectrum.iter().map(|c| c.re).collect();
    let mean = signal.iter().sum::<f64>() / n as f64;
    let std = (signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    if std > 0.0 {
        signal.iter().map(|x| (x - mean) / std).collect()
    } else {
        signal
    }
}

/// One channel of `duration` seconds at `fs` Hz, reproducible from `seed`.
pub fn simulate_signal(spec: &SignalSpec, fs: f64, duration: f64, seed: u64) -> Vec<f64> {
    let n = (fs * duration).round().max(0.0) as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut signal = power_law_noise(n, fs, spec.exponent, &mut rng);

    if let Some(alpha) = spec.alpha_frequency {
        let phase = rng.random::<f64>() * 2.0 * PI;
        for (i, x) in signal.iter_mut().enumerate() {
            *x += spec.alpha_amplitude * (2.0 * PI * alpha * i as f64 / fs + phase).sin();
        }
    }

    for x in &mut signal {
        *x *= spec.scale;
    }
    signal
}

/// Shape of a simulated dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub n_subjects: usize,
    pub channels: Vec<String>,
    pub sample_rate: f64,
    /// Seconds per recording
    pub duration: f64,
    pub ns_exponent: f64,
    /// Exponent change under sleep deprivation
    pub sd_exponent_shift: f64,
    pub alpha_frequency: f64,
    pub alpha_amplitude: f64,
    pub seed: u64,
}

impl Default for DatasetSpec {
    fn default() -> Self {
        Self {
            n_subjects: 2,
            channels: ["Fz", "Cz", "Pz", "Oz"].iter().map(|c| c.to_string()).collect(),
            sample_rate: 250.0,
            duration: 60.0,
            ns_exponent: 1.6,
            sd_exponent_shift: -0.3,
            alpha_frequency: 10.0,
            alpha_amplitude: 1.5,
            seed: 42,
        }
    }
}

/// A recording written by [`simulate_dataset`]
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedRecording {
    pub subject: String,
    pub session: String,
    pub condition: Condition,
    pub exponent: f64,
    pub path: PathBuf,
}

fn write_sidecars(eeg_dir: &Path, base: &str, spec: &DatasetSpec) -> Result<()> {
    let json = serde_json::json!({
        "TaskName": "eyesopen",
        "SamplingFrequency": spec.sample_rate,
        "EEGReference": "average",
        "PowerLineFrequency": 50,
        "RecordingDuration": spec.duration,
    });
    let json = serde_json::to_string_pretty(&json)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(eeg_dir.join(format!("{}_eeg.json", base)), json)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(eeg_dir.join(format!("{}_channels.tsv", base)))?;
    writer.write_record(["name", "type", "units"])?;
    for channel in &spec.channels {
        writer.write_record([channel.as_str(), "EEG", "uV"])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a BIDS tree under `root`: `participants.tsv` plus one eyes-open
/// recording per subject and session. Session order alternates between
/// subjects, starting with `NS->SD`.
pub fn simulate_dataset(root: &Path, spec: &DatasetSpec) -> Result<Vec<SimulatedRecording>> {
    fs::create_dir_all(root)?;

    let mut participants = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(root.join("participants.tsv"))?;
    participants.write_record([PARTICIPANT_ID_COLUMN, SESSION_ORDER_COLUMN])?;

    let mut written = Vec::new();
    for s in 0..spec.n_subjects {
        let subject = format!("sub-{:02}", s + 1);
        let order = if s % 2 == 0 { NS_FIRST } else { "SD->NS" };
        participants.write_record([subject.as_str(), order])?;

        let participant = Participant {
            participant_id: subject.clone(),
            session_order: order.to_string(),
        };
        for (session, condition) in participant.sessions() {
            let exponent = match condition {
                Condition::NS => spec.ns_exponent,
                Condition::SD => spec.ns_exponent + spec.sd_exponent_shift,
            };
            let signal_spec = SignalSpec {
                exponent,
                alpha_frequency: Some(spec.alpha_frequency),
                alpha_amplitude: spec.alpha_amplitude,
                ..Default::default()
            };

            let seed_base = spec.seed.wrapping_add((written.len() as u64) << 16);
            let data: Vec<Vec<f64>> = (0..spec.channels.len())
                .map(|c| {
                    simulate_signal(&signal_spec, spec.sample_rate, spec.duration, seed_base.wrapping_add(c as u64))
                })
                .collect();

            let eeg_dir = root.join(&subject).join(session).join("eeg");
            fs::create_dir_all(&eeg_dir)?;
            let base = format!("{}_{}_task-eyesopen_desc-clean", subject, session);
            let set_path = eeg_dir.join(format!("{}_eeg.set", base));
            write_eeglab(&set_path, spec.sample_rate, &data)?;
            write_sidecars(&eeg_dir, &base, spec)?;

            log::debug!("Simulated {} {} ({}) → {}", subject, session, condition, set_path.display());
            written.push(SimulatedRecording {
                subject: subject.clone(),
                session: session.to_string(),
                condition,
                exponent,
                path: set_path,
            });
        }
    }
    participants.flush()?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::find_eyes_open_recording;
    use crate::model::{ModelSettings, SpectralModel};
    use crate::pipeline::{fit_channel, FitSettings};
    use crate::reader::load_recording;

    #[test]
    fn test_signal_is_reproducible() {
        let spec = SignalSpec::default();
        let a = simulate_signal(&spec, 100.0, 5.0, 3);
        let b = simulate_signal(&spec, 100.0, 5.0, 3);
        let c = simulate_signal(&spec, 100.0, 5.0, 4);
        assert_eq!(a.len(), 500);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_exponent_recovered_from_simulated_signal() {
        let spec = SignalSpec {
            exponent: 1.0,
            alpha_frequency: None,
            ..Default::default()
        };
        let signal = simulate_signal(&spec, 250.0, 120.0, 11);
        let settings = FitSettings::default();
        let model = SpectralModel::new(ModelSettings::default()).unwrap();
        let fit = fit_channel(&model, &signal, 250.0, &settings).unwrap();
        assert!((fit.aperiodic.exponent - 1.0).abs() < 0.15, "{:?}", fit.aperiodic);
    }

    #[test]
    fn test_alpha_peak_detected() {
        let spec = SignalSpec {
            exponent: 1.0,
            alpha_frequency: Some(10.0),
            alpha_amplitude: 3.0,
            ..Default::default()
        };
        let signal = simulate_signal(&spec, 250.0, 60.0, 5);
        let model = SpectralModel::new(ModelSettings::default()).unwrap();
        let fit = fit_channel(&model, &signal, 250.0, &FitSettings::default()).unwrap();
        assert!(
            fit.peaks
                .iter()
                .any(|p| (p.center_frequency - 10.0).abs() < 1.0),
            "{:?}",
            fit.peaks
        );
    }

    #[test]
    fn test_dataset_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DatasetSpec {
            n_subjects: 2,
            duration: 4.0,
            ..Default::default()
        };
        let written = simulate_dataset(tmp.path(), &spec).unwrap();
        assert_eq!(written.len(), 4);

        let participants = fs::read_to_string(tmp.path().join("participants.tsv")).unwrap();
        assert_eq!(
            participants,
            "participant_id\tSessionOrder\nsub-01\tNS->SD\nsub-02\tSD->NS\n"
        );

        assert_eq!(written[0].condition, Condition::NS);
        assert_eq!(written[2].condition, Condition::SD);

        let eeg_dir = tmp.path().join("sub-02").join("ses-2").join("eeg");
        let found = find_eyes_open_recording(&eeg_dir).unwrap();
        let recording = load_recording(&found, None).unwrap();
        assert_eq!(recording.sample_rate(), 250.0);
        assert_eq!(recording.channel_names(), &["Fz", "Cz", "Pz", "Oz"]);
        assert_eq!(recording.data[0].len(), 1000);
    }
}
