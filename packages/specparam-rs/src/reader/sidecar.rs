//! BIDS sidecar metadata (`*_eeg.json`, `*_channels.tsv`)
//!
//! Used to fill in what an EEGLAB `.set` file does not expose as plain
//! numeric variables, most often the sampling rate and channel labels.

use super::{ReaderError, ReaderResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct EegSidecarJson {
    #[serde(rename = "SamplingFrequency")]
    sampling_frequency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChannelRow {
    name: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SidecarMetadata {
    pub sampling_frequency: Option<f64>,
    pub channels: Vec<String>,
}

/// Recording name with the trailing `_eeg` suffix removed.
fn bids_base(recording: &Path) -> Option<String> {
    let stem = recording.file_stem()?.to_str()?;
    Some(stem.strip_suffix("_eeg").unwrap_or(stem).to_string())
}

/// Exact sidecar first, else the only file in the directory with this suffix.
fn locate(recording: &Path, exact: &[PathBuf], suffix: &str) -> Option<PathBuf> {
    if let Some(found) = exact.iter().find(|p| p.is_file()) {
        return Some(found.clone());
    }

    let dir = recording.parent()?;
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(suffix))
                .unwrap_or(false)
        })
        .collect();

    if matches.len() == 1 {
        matches.pop()
    } else {
        None
    }
}

pub fn find_eeg_json(recording: &Path) -> Option<PathBuf> {
    let base = bids_base(recording)?;
    let exact = [
        recording.with_extension("json"),
        recording.with_file_name(format!("{}_eeg.json", base)),
    ];
    locate(recording, &exact, "_eeg.json")
}

pub fn find_channels_tsv(recording: &Path) -> Option<PathBuf> {
    let base = bids_base(recording)?;
    let exact = [recording.with_file_name(format!("{}_channels.tsv", base))];
    locate(recording, &exact, "_channels.tsv")
}

pub fn read_sampling_frequency(json_path: &Path) -> ReaderResult<Option<f64>> {
    let text = std::fs::read_to_string(json_path)?;
    let sidecar: EegSidecarJson = serde_json::from_str(&text).map_err(|e| {
        ReaderError::ParseError(format!("{}: {}", json_path.display(), e))
    })?;
    Ok(sidecar.sampling_frequency.filter(|fs| *fs > 0.0))
}

pub fn read_channel_names(tsv_path: &Path) -> ReaderResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(tsv_path)
        .map_err(|e| ReaderError::ParseError(format!("{}: {}", tsv_path.display(), e)))?;

    reader
        .deserialize::<ChannelRow>()
        .map(|row| {
            row.map(|r| r.name).map_err(|e| {
                ReaderError::ParseError(format!("{}: {}", tsv_path.display(), e))
            })
        })
        .collect()
}

/// Collect whatever sidecar metadata exists next to a recording.
pub fn read_sidecars(recording: &Path) -> ReaderResult<SidecarMetadata> {
    let mut meta = SidecarMetadata::default();

    if let Some(json_path) = find_eeg_json(recording) {
        log::debug!("Using EEG sidecar {}", json_path.display());
        meta.sampling_frequency = read_sampling_frequency(&json_path)?;
    }
    if let Some(tsv_path) = find_channels_tsv(recording) {
        log::debug!("Using channels sidecar {}", tsv_path.display());
        meta.channels = read_channel_names(&tsv_path)?;
    }

    Ok(meta)
}
