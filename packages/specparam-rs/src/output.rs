//! Per-condition result tables
//!
//! One comma-separated file per condition, one row per subject, session and
//! channel. Missing values are written as empty fields.

use crate::error::Result;
use crate::pipeline::PipelineReport;
use crate::types::{ChannelResult, Condition};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const RESULT_COLUMNS: [&str; 7] = [
    "subject",
    "session",
    "condition",
    "channel",
    "aperiodic_exponent",
    "aperiodic_offset",
    "n_peaks",
];
pub const METRIC_COLUMNS: [&str; 3] = ["aperiodic_knee", "r_squared", "error"];
pub const PEAK_COLUMNS: [&str; 7] = [
    "subject",
    "session",
    "condition",
    "channel",
    "center_frequency",
    "power",
    "bandwidth",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Append knee, r² and error columns
    pub include_metrics: bool,
    /// Also write one row per detected peak
    pub write_peaks: bool,
}

/// Files written by [`save_report`]
#[derive(Debug, Clone, Serialize)]
pub struct SavedTables {
    pub ns: PathBuf,
    pub sd: PathBuf,
    pub ns_peaks: Option<PathBuf>,
    pub sd_peaks: Option<PathBuf>,
}

pub fn results_path(dir: &Path, condition: Condition) -> PathBuf {
    dir.join(format!("channel_specparam_{}.csv", condition))
}

pub fn peaks_path(dir: &Path, condition: Condition) -> PathBuf {
    dir.join(format!("channel_peaks_{}.csv", condition))
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

pub fn write_results(path: &Path, rows: &[ChannelResult], include_metrics: bool) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = RESULT_COLUMNS.to_vec();
    if include_metrics {
        header.extend(METRIC_COLUMNS);
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.subject.clone(),
            row.session.clone(),
            row.condition.to_string(),
            row.channel.clone(),
            format_value(row.aperiodic_exponent),
            format_value(row.aperiodic_offset),
            row.n_peaks.to_string(),
        ];
        if include_metrics {
            record.push(row.aperiodic_knee.map(format_value).unwrap_or_default());
            record.push(format_value(row.r_squared));
            record.push(format_value(row.error));
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_peaks(path: &Path, rows: &[ChannelResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(PEAK_COLUMNS)?;

    for row in rows {
        for peak in &row.peaks {
            writer.write_record([
                row.subject.clone(),
                row.session.clone(),
                row.condition.to_string(),
                row.channel.clone(),
                format_value(peak.center_frequency),
                format_value(peak.power),
                format_value(peak.bandwidth),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write both condition tables (and optionally the peak tables) into `dir`.
pub fn save_report(dir: &Path, report: &PipelineReport, options: OutputOptions) -> Result<SavedTables> {
    std::fs::create_dir_all(dir)?;

    let ns = results_path(dir, Condition::NS);
    let sd = results_path(dir, Condition::SD);
    write_results(&ns, report.table(Condition::NS), options.include_metrics)?;
    write_results(&sd, report.table(Condition::SD), options.include_metrics)?;

    let (ns_peaks, sd_peaks) = if options.write_peaks {
        let ns_peaks = peaks_path(dir, Condition::NS);
        let sd_peaks = peaks_path(dir, Condition::SD);
        write_peaks(&ns_peaks, report.table(Condition::NS))?;
        write_peaks(&sd_peaks, report.table(Condition::SD))?;
        (Some(ns_peaks), Some(sd_peaks))
    } else {
        (None, None)
    };

    log::info!("Saved results → {} & {}", ns.display(), sd.display());
    Ok(SavedTables {
        ns,
        sd,
        ns_peaks,
        sd_peaks,
    })
}
