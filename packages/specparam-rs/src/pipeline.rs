//! Dataset-level orchestration
//!
//! participants table → session jobs → recordings → per-channel
//! spectrum/fit → NS and SD result tables.

use crate::discovery::{plan_sessions, SessionJob};
use crate::error::{Result, SpecParamError};
use crate::model::{AperiodicMode, ModelSettings, SpectralFit, SpectralModel};
use crate::participants::read_participants;
use crate::reader::{load_recording, Recording};
use crate::sanitize::sanitize_spectrum;
use crate::spectral::{compute_spectrum_welch, WelchSettings};
use crate::types::{ChannelResult, Condition, FrequencyRange, PowerSpectrum};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PARTICIPANTS_FILE: &str = "participants.tsv";

/// Everything that shapes a single channel's result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitSettings {
    pub f_range: FrequencyRange,
    pub welch: WelchSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// BIDS dataset root holding `sub-*/ses-*/eeg`
    pub data_root: PathBuf,
    /// Defaults to `<data_root>/participants.tsv`
    pub participants_path: Option<PathBuf>,
    pub settings: FitSettings,
    /// Restrict to these channel names
    pub channels: Option<Vec<String>>,
}

impl PipelineConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            participants_path: None,
            settings: FitSettings::default(),
            channels: None,
        }
    }

    pub fn participants_path(&self) -> PathBuf {
        self.participants_path
            .clone()
            .unwrap_or_else(|| self.data_root.join(PARTICIPANTS_FILE))
    }
}

/// Sanitized Welch spectrum of one channel, plus the number of replaced bins.
pub fn channel_spectrum(
    samples: &[f64],
    sample_rate: f64,
    welch: &WelchSettings,
) -> Result<(PowerSpectrum, usize)> {
    let mut spectrum = compute_spectrum_welch(samples, sample_rate, welch)?;
    let replaced = sanitize_spectrum(&mut spectrum.power);
    Ok((spectrum, replaced))
}

pub fn fit_channel(
    model: &SpectralModel,
    samples: &[f64],
    sample_rate: f64,
    settings: &FitSettings,
) -> Result<SpectralFit> {
    let (spectrum, replaced) = channel_spectrum(samples, sample_rate, &settings.welch)?;
    if replaced > 0 {
        log::debug!("Replaced {} non-positive spectral values", replaced);
    }
    model.fit(&spectrum.frequencies, &spectrum.power, settings.f_range)
}

fn channel_result(
    subject: &str,
    session: &str,
    condition: Condition,
    channel: &str,
    fit: Option<&SpectralFit>,
    mode: AperiodicMode,
) -> ChannelResult {
    let mut result = ChannelResult {
        subject: subject.to_string(),
        session: session.to_string(),
        condition,
        channel: channel.to_string(),
        aperiodic_exponent: f64::NAN,
        aperiodic_offset: f64::NAN,
        aperiodic_knee: (mode == AperiodicMode::Knee).then_some(f64::NAN),
        n_peaks: 0,
        r_squared: f64::NAN,
        error: f64::NAN,
        peaks: Vec::new(),
    };
    if let Some(fit) = fit {
        result.aperiodic_exponent = fit.aperiodic.exponent;
        result.aperiodic_offset = fit.aperiodic.offset;
        result.aperiodic_knee = fit.aperiodic.knee;
        result.n_peaks = fit.n_peaks();
        result.r_squared = fit.r_squared;
        result.error = fit.error;
        result.peaks = fit.peaks.clone();
    }
    result
}

/// Fit every channel of a loaded recording, in channel order.
///
/// A channel whose fit fails still yields a row, with NaN parameters.
pub fn analyze_recording(
    recording: &Recording,
    subject: &str,
    session: &str,
    condition: Condition,
    settings: &FitSettings,
) -> Result<Vec<ChannelResult>> {
    let model = SpectralModel::new(settings.model.clone())?;
    let sample_rate = recording.sample_rate();
    let mode = settings.model.aperiodic_mode;

    let channels: Vec<(&str, &[f64])> = recording.channels().collect();
    let results = channels
        .par_iter()
        .map(|(name, samples)| {
            match fit_channel(&model, samples, sample_rate, settings) {
                Ok(fit) if fit.success => {
                    channel_result(subject, session, condition, name, Some(&fit), mode)
                }
                Ok(_) => {
                    log::warn!(
                        "Fit failed for {} {} {}: no convergence",
                        subject,
                        session,
                        name
                    );
                    channel_result(subject, session, condition, name, None, mode)
                }
                Err(e) => {
                    log::warn!("Fit failed for {} {} {}: {}", subject, session, name, e);
                    channel_result(subject, session, condition, name, None, mode)
                }
            }
        })
        .collect();
    Ok(results)
}

/// What happened to one session job
#[derive(Debug)]
pub enum JobOutcome {
    Processed(Vec<ChannelResult>),
    Missing,
    Failed(SpecParamError),
}

pub fn process_job(
    job: &SessionJob,
    settings: &FitSettings,
    channels: Option<&[String]>,
) -> JobOutcome {
    let Some(path) = job.recording.as_deref() else {
        log::warn!("No eyes-open file found for {} {}", job.subject, job.session);
        return JobOutcome::Missing;
    };

    let recording = match load_recording(path, channels) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("Could not load {}: {}", path.display(), e);
            return JobOutcome::Failed(e.into());
        }
    };

    match analyze_recording(&recording, &job.subject, &job.session, job.condition, settings) {
        Ok(results) => JobOutcome::Processed(results),
        Err(e) => JobOutcome::Failed(e),
    }
}

/// Per-condition result tables and bookkeeping for a pipeline run
#[derive(Debug, Default, Serialize)]
pub struct PipelineReport {
    pub ns: Vec<ChannelResult>,
    pub sd: Vec<ChannelResult>,
    pub processed: usize,
    pub missing: usize,
    pub failed: usize,
}

impl PipelineReport {
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Processed(results) => {
                self.processed += 1;
                for result in results {
                    match result.condition {
                        Condition::NS => self.ns.push(result),
                        Condition::SD => self.sd.push(result),
                    }
                }
            }
            JobOutcome::Missing => self.missing += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn table(&self, condition: Condition) -> &[ChannelResult] {
        match condition {
            Condition::NS => &self.ns,
            Condition::SD => &self.sd,
        }
    }
}

/// Read participants and plan one job per subject and session.
pub fn plan(config: &PipelineConfig) -> Result<Vec<SessionJob>> {
    let participants_path = config.participants_path();
    let participants = read_participants(&participants_path)?;
    log::debug!(
        "{} participants in {}",
        participants.len(),
        participants_path.display()
    );
    Ok(plan_sessions(&config.data_root, &participants))
}

/// Position of a job within a run, passed to the progress hook
#[derive(Debug, Clone, Copy)]
pub struct JobProgress<'a> {
    /// Zero-based
    pub index: usize,
    pub total: usize,
    pub job: &'a SessionJob,
}

/// Process planned jobs in order, calling `on_job` before each one.
pub fn run_jobs<F>(
    jobs: &[SessionJob],
    settings: &FitSettings,
    channels: Option<&[String]>,
    mut on_job: F,
) -> PipelineReport
where
    F: FnMut(JobProgress<'_>),
{
    let total = jobs.len();
    let mut report = PipelineReport::default();
    for (index, job) in jobs.iter().enumerate() {
        on_job(JobProgress { index, total, job });
        report.record(process_job(job, settings, channels));
    }

    log::info!(
        "{} recordings processed, {} missing, {} failed",
        report.processed,
        report.missing,
        report.failed
    );
    report
}

/// Run the whole dataset sequentially over sessions.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport> {
    validate_data_root(&config.data_root)?;
    config.settings.model.validate()?;
    let jobs = plan(config)?;

    Ok(run_jobs(
        &jobs,
        &config.settings,
        config.channels.as_deref(),
        |progress| {
            if let Some(path) = &progress.job.recording {
                log::info!(
                    "Loading {} {} ({}) → {}",
                    progress.job.subject,
                    progress.job.session,
                    progress.job.condition,
                    path.display()
                );
            }
        },
    ))
}

/// Check that the dataset root looks usable before planning.
pub fn validate_data_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(SpecParamError::InvalidParameter(format!(
            "data root is not a directory: {}",
            root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{simulate_signal, SignalSpec};
    use crate::writer::write_eeglab;
    use std::fs;

    fn write_session(root: &Path, subject: &str, session: &str, file: &str, data: &[Vec<f64>]) {
        let eeg = root.join(subject).join(session).join("eeg");
        fs::create_dir_all(&eeg).unwrap();
        write_eeglab(&eeg.join(file), 250.0, data).unwrap();
    }

    fn two_channel_data(seed: u64) -> Vec<Vec<f64>> {
        let spec = SignalSpec {
            exponent: 1.5,
            alpha_frequency: Some(10.0),
            alpha_amplitude: 2.0,
            ..Default::default()
        };
        vec![
            simulate_signal(&spec, 250.0, 30.0, seed),
            simulate_signal(&spec, 250.0, 30.0, seed + 1),
        ]
    }

    #[test]
    fn test_pipeline_partitions_conditions() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(
            root.join(PARTICIPANTS_FILE),
            "participant_id\tSessionOrder\nsub-01\tNS->SD\nsub-02\tSD->NS\n",
        )
        .unwrap();

        let data = two_channel_data(7);
        write_session(root, "sub-01", "ses-1", "sub-01_ses-1_task-eyesopen_clean.set", &data);
        write_session(root, "sub-01", "ses-2", "sub-01_ses-2_task-eyesopen_clean.set", &data);
        write_session(root, "sub-02", "ses-1", "sub-02_ses-1_task-eyesopen_clean.set", &data);
        // sub-02 ses-2 has no eyes-open recording
        write_session(root, "sub-02", "ses-2", "sub-02_ses-2_task-eyesclosed_clean.set", &data);

        let report = run_pipeline(&PipelineConfig::new(root)).unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.ns.len(), 2);
        assert_eq!(report.sd.len(), 4);

        assert_eq!(report.ns[0].subject, "sub-01");
        assert_eq!(report.ns[0].session, "ses-1");
        assert_eq!(report.ns[0].channel, "Ch1");
        assert_eq!(report.ns[1].channel, "Ch2");
        assert!(report.sd.iter().all(|r| r.condition == Condition::SD));
        assert_eq!(report.sd[2].subject, "sub-02");
        assert_eq!(report.sd[2].session, "ses-1");

        for row in report.ns.iter().chain(&report.sd) {
            assert!(row.aperiodic_exponent.is_finite());
            assert!(row.aperiodic_offset.is_finite());
        }
    }

    #[test]
    fn test_broken_recording_counts_as_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(
            root.join(PARTICIPANTS_FILE),
            "participant_id\tSessionOrder\nsub-01\tNS->SD\n",
        )
        .unwrap();
        let eeg = root.join("sub-01").join("ses-1").join("eeg");
        fs::create_dir_all(&eeg).unwrap();
        fs::write(eeg.join("open_clean.set"), b"not a mat file").unwrap();

        let report = run_pipeline(&PipelineConfig::new(root)).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.missing, 1);
        assert!(report.ns.is_empty() && report.sd.is_empty());
    }

    #[test]
    fn test_missing_participants_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(run_pipeline(&PipelineConfig::new(tmp.path())).is_err());
    }

    #[test]
    fn test_short_channel_yields_nan_row() {
        let recording = Recording {
            metadata: crate::reader::RecordingMetadata {
                file_path: PathBuf::from("short.set"),
                sample_rate: 4.0,
                num_channels: 1,
                num_samples: 8,
                channels: vec!["Fz".to_string()],
                format: "EEGLAB".to_string(),
            },
            data: vec![vec![0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0]],
        };
        let rows = analyze_recording(
            &recording,
            "sub-01",
            "ses-1",
            Condition::NS,
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "Fz");
        assert!(rows[0].aperiodic_exponent.is_nan());
        assert!(rows[0].aperiodic_offset.is_nan());
        assert_eq!(rows[0].n_peaks, 0);
    }

    #[test]
    fn test_channel_spectrum_is_positive() {
        let samples = vec![0.0; 500];
        let (spectrum, replaced) =
            channel_spectrum(&samples, 100.0, &WelchSettings::default()).unwrap();
        assert_eq!(replaced, spectrum.power.len());
        assert!(spectrum.power.iter().all(|p| *p > 0.0));
    }

    #[test]
    fn test_loaded_offset_is_in_volts() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("sub-01_ses-1_task-eyesopen_clean.set");
        let spec = SignalSpec {
            exponent: 1.5,
            scale: 20.0,
            alpha_frequency: None,
            ..Default::default()
        };
        // Stored as float32 microvolts
        let microvolts: Vec<f64> = simulate_signal(&spec, 250.0, 60.0, 3)
            .iter()
            .map(|v| *v as f32 as f64)
            .collect();
        write_eeglab(&set, 250.0, &[microvolts.clone()]).unwrap();

        let recording = load_recording(&set, None).unwrap();
        let model = SpectralModel::new(ModelSettings::default()).unwrap();
        let settings = FitSettings::default();
        let loaded = fit_channel(&model, &recording.data[0], 250.0, &settings).unwrap();
        let raw = fit_channel(&model, &microvolts, 250.0, &settings).unwrap();

        // Power scales by (1e-6)^2
        let shift = raw.aperiodic.offset - loaded.aperiodic.offset;
        assert!((shift - 12.0).abs() < 1e-3, "offset shift {}", shift);
        assert!((raw.aperiodic.exponent - loaded.aperiodic.exponent).abs() < 1e-3);
        assert!(loaded.aperiodic.offset < -9.0, "{:?}", loaded.aperiodic);
    }

    #[test]
    fn test_run_jobs_reports_progress_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(
            root.join(PARTICIPANTS_FILE),
            "participant_id\tSessionOrder\nsub-01\tSD->NS\n",
        )
        .unwrap();
        write_session(
            root,
            "sub-01",
            "ses-2",
            "sub-01_ses-2_task-eyesopen_clean.set",
            &two_channel_data(21),
        );

        let config = PipelineConfig::new(root);
        let jobs = plan(&config).unwrap();
        let mut seen = Vec::new();
        let report = run_jobs(&jobs, &config.settings, None, |p| {
            seen.push((p.index, p.total, p.job.session.clone(), p.job.recording.is_some()))
        });

        assert_eq!(
            seen,
            vec![
                (0, 2, "ses-1".to_string(), false),
                (1, 2, "ses-2".to_string(), true),
            ]
        );
        assert_eq!(report.missing, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(report.ns.len(), 2);
    }
}
