/// EEGLAB Reader
///
/// Reads EEGLAB datasets stored as a MATLAB level-5 `.set` file, either as a
/// `.set` + `.fdt` pair (samples as float32 in the `.fdt`) or as a single
/// `.set` holding a numeric `data` matrix.
///
/// Metadata comes from the top-level `srate`, `nbchan`, `pnts` and `trials`
/// variables. Whatever the `.set` does not expose is taken from the BIDS
/// sidecars next to it. The sampling rate is never guessed.
///
/// Samples are stored in microvolts and returned in volts.
/// Epoched datasets (`trials > 1`) are rejected.
///
/// Samples are only read from disk in `read()`, not at open time.
use super::sidecar::{self, SidecarMetadata};
use super::{
    resolve_channel_indices, ReaderError, ReaderResult, Recording, RecordingMetadata,
    RecordingReader,
};
use matfile::{MatFile, NumericData};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const HDF5_MAGIC: [u8; 8] = [0x89, 0x48, 0x44, 0x46, 0x0d, 0x0a, 0x1a, 0x0a];
const FDT_BYTES_PER_VALUE: usize = 4;
const MICROVOLTS_TO_VOLTS: f64 = 1e-6;

enum DataSource {
    /// Matrix embedded in the `.set` file
    InMemory(Vec<Vec<f64>>),
    /// Sibling `.fdt` file, read on demand
    Fdt {
        fdt_path: PathBuf,
        num_channels: usize,
        num_samples: usize,
    },
}

pub struct EEGLABReader {
    data_source: DataSource,
    metadata: RecordingMetadata,
}

#[derive(Debug, Default)]
struct SetMetadata {
    srate: Option<f64>,
    nbchan: Option<usize>,
    pnts: Option<usize>,
    trials: usize,
}

impl EEGLABReader {
    pub fn open(path: &Path) -> ReaderResult<Self> {
        if Self::is_hdf5_file(path)? {
            return Err(ReaderError::UnsupportedFormat(format!(
                "{} uses MATLAB v7.3 (HDF5). Re-save it in EEGLAB with \
                 pop_saveset(EEG, 'savemode', 'twofiles', 'version', '6.5')",
                path.display()
            )));
        }

        let fdt_path = path.with_extension("fdt");
        let mat_file = match File::open(path).map(BufReader::new).map(MatFile::parse) {
            Ok(Ok(mat)) => Some(mat),
            Ok(Err(e)) if fdt_path.is_file() => {
                log::warn!(
                    "Could not parse {} ({:?}); relying on sidecars and {}",
                    path.display(),
                    e,
                    fdt_path.display()
                );
                None
            }
            Ok(Err(e)) => {
                return Err(ReaderError::ParseError(format!(
                    "Failed to parse {}: {:?}",
                    path.display(),
                    e
                )))
            }
            Err(e) => return Err(ReaderError::IoError(e)),
        };

        let set_meta = mat_file
            .as_ref()
            .map(Self::extract_metadata)
            .unwrap_or_else(|| SetMetadata {
                trials: 1,
                ..Default::default()
            });
        if set_meta.trials > 1 {
            return Err(ReaderError::UnsupportedFormat(format!(
                "{} is epoched ({} trials); only continuous data can be read",
                path.display(),
                set_meta.trials
            )));
        }
        let sidecars = sidecar::read_sidecars(path)?;

        let sample_rate = set_meta
            .srate
            .or(sidecars.sampling_frequency)
            .ok_or_else(|| {
                ReaderError::MissingMetadata(format!(
                    "no sampling rate in {} or its BIDS sidecar",
                    path.display()
                ))
            })?;

        let (data_source, num_channels, num_samples) =
            Self::determine_data_source(&fdt_path, mat_file.as_ref(), &set_meta, &sidecars)?;

        let channels = if sidecars.channels.len() == num_channels {
            sidecars.channels
        } else {
            if !sidecars.channels.is_empty() {
                log::warn!(
                    "channels.tsv lists {} channels but {} has {}; using generic labels",
                    sidecars.channels.len(),
                    path.display(),
                    num_channels
                );
            }
            (0..num_channels).map(|i| format!("Ch{}", i + 1)).collect()
        };

        let metadata = RecordingMetadata {
            file_path: path.to_path_buf(),
            sample_rate,
            num_channels,
            num_samples,
            channels,
            format: "EEGLAB".to_string(),
        };

        Ok(Self {
            data_source,
            metadata,
        })
    }

    fn is_hdf5_file(path: &Path) -> ReaderResult<bool> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 8];
        if file.read_exact(&mut magic).is_ok() {
            return Ok(magic == HDF5_MAGIC);
        }
        Ok(false)
    }

    fn extract_metadata(mat_file: &MatFile) -> SetMetadata {
        let scalar = |name: &str| {
            mat_file
                .find_by_name(name)
                .and_then(|arr| Self::extract_scalar(arr.data()))
        };
        let count = |name: &str| {
            scalar(name)
                .filter(|v| *v > 0.0 && v.is_finite())
                .map(|v| v as usize)
        };

        SetMetadata {
            srate: scalar("srate").filter(|v| *v > 0.0 && v.is_finite()),
            nbchan: count("nbchan"),
            pnts: count("pnts"),
            trials: count("trials").unwrap_or(1),
        }
    }

    fn extract_scalar(data: &NumericData) -> Option<f64> {
        match data {
            NumericData::Double { real, .. } => real.first().copied(),
            NumericData::Single { real, .. } => real.first().map(|&v| v as f64),
            NumericData::Int8 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::Int16 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::Int32 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::Int64 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::UInt8 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::UInt16 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::UInt32 { real, .. } => real.first().map(|&v| v as f64),
            NumericData::UInt64 { real, .. } => real.first().map(|&v| v as f64),
        }
    }

    fn to_f64_vec(data: &NumericData) -> Vec<f64> {
        match data {
            NumericData::Double { real, .. } => real.clone(),
            NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int8 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::Int64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt8 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
            NumericData::UInt64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        }
    }

    /// Returns (DataSource, num_channels, num_samples)
    fn determine_data_source(
        fdt_path: &Path,
        mat_file: Option<&MatFile>,
        meta: &SetMetadata,
        sidecars: &SidecarMetadata,
    ) -> ReaderResult<(DataSource, usize, usize)> {
        if fdt_path.is_file() {
            let num_channels = meta
                .nbchan
                .or_else(|| Some(sidecars.channels.len()).filter(|n| *n > 0))
                .ok_or_else(|| {
                    ReaderError::MissingMetadata(format!(
                        "channel count for {} (no nbchan, no channels.tsv)",
                        fdt_path.display()
                    ))
                })?;

            let file_size = usize::try_from(std::fs::metadata(fdt_path)?.len()).map_err(|_| {
                ReaderError::InvalidData(format!("{} is too large", fdt_path.display()))
            })?;
            let frame_bytes = checked_product(&[num_channels, FDT_BYTES_PER_VALUE])?;
            let num_samples = meta.pnts.unwrap_or(file_size / frame_bytes);
            Self::validate_fdt_file(fdt_path, file_size, num_channels, num_samples)?;

            return Ok((
                DataSource::Fdt {
                    fdt_path: fdt_path.to_path_buf(),
                    num_channels,
                    num_samples,
                },
                num_channels,
                num_samples,
            ));
        }

        let Some(mat_file) = mat_file else {
            return Err(ReaderError::MissingMetadata(format!(
                "no readable .set contents and no {}",
                fdt_path.display()
            )));
        };

        if let Some(data_arr) = mat_file.find_by_name("data") {
            let size = data_arr.size();
            if size.len() >= 2 {
                let cols = checked_product(&size[1..])?;
                let data = Self::extract_matrix_data(data_arr.data(), size[0], cols)?;
                let num_samples = data.first().map(|c| c.len()).unwrap_or(0);
                return Ok((DataSource::InMemory(data), size[0], num_samples));
            }
        }

        // Any channels x samples shaped matrix
        for arr in mat_file.arrays() {
            let size = arr.size();
            if size.len() == 2 && size[0] > 1 && size[1] > 100 {
                if let Ok(data) = Self::extract_matrix_data(arr.data(), size[0], size[1]) {
                    log::debug!("Using MAT variable '{}' as sample matrix", arr.name());
                    return Ok((DataSource::InMemory(data), size[0], size[1]));
                }
            }
        }

        Err(ReaderError::UnsupportedFormat(
            "no EEG samples found in this .set file. Save it from EEGLAB with \
             pop_saveset(EEG, 'savemode', 'twofiles') to create a .set + .fdt pair"
                .to_string(),
        ))
    }

    fn validate_fdt_file(
        fdt_path: &Path,
        file_size: usize,
        num_channels: usize,
        num_samples: usize,
    ) -> ReaderResult<()> {
        let expected_size = checked_product(&[num_channels, num_samples, FDT_BYTES_PER_VALUE])?;
        if num_samples == 0 {
            return Err(ReaderError::InvalidData(format!(
                "{} holds no complete sample frame for {} channels",
                fdt_path.display(),
                num_channels
            )));
        }
        if file_size < expected_size {
            return Err(ReaderError::InvalidData(format!(
                ".fdt file size ({} bytes) is smaller than expected ({} bytes) for {} channels × {} samples",
                file_size, expected_size, num_channels, num_samples
            )));
        }
        Ok(())
    }

    /// Read the `.fdt` file: float32 little-endian, one frame of all
    /// channels per time point.
    fn read_fdt(
        fdt_path: &Path,
        num_channels: usize,
        num_samples: usize,
        channel_indices: &[usize],
    ) -> ReaderResult<Vec<Vec<f64>>> {
        let mut reader = BufReader::new(File::open(fdt_path)?);
        let byte_len = checked_product(&[num_samples, num_channels, FDT_BYTES_PER_VALUE])?;
        let mut bytes = vec![0u8; byte_len];
        reader.read_exact(&mut bytes)?;

        let raw_data: Vec<f32> = bytes
            .chunks_exact(FDT_BYTES_PER_VALUE)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let channels = channel_indices
            .par_iter()
            .map(|&ch_idx| {
                (0..num_samples)
                    .map(|sample_idx| {
                        raw_data[sample_idx * num_channels + ch_idx] as f64 * MICROVOLTS_TO_VOLTS
                    })
                    .collect()
            })
            .collect();

        Ok(channels)
    }

    /// Transpose a column-major MATLAB matrix into per-row vectors.
    fn extract_matrix_data(
        data: &NumericData,
        rows: usize,
        cols: usize,
    ) -> ReaderResult<Vec<Vec<f64>>> {
        let flat_data = Self::to_f64_vec(data);

        let expected = checked_product(&[rows, cols])?;
        if flat_data.len() < expected {
            return Err(ReaderError::InvalidData(format!(
                "Data size mismatch: expected {} elements, got {}",
                expected,
                flat_data.len()
            )));
        }

        let channels = (0..rows)
            .into_par_iter()
            .map(|row| {
                (0..cols)
                    .map(|col| flat_data[col * rows + row] * MICROVOLTS_TO_VOLTS)
                    .collect()
            })
            .collect();

        Ok(channels)
    }
}

/// Multiply dimensions read from the file, failing on overflow.
fn checked_product(dims: &[usize]) -> ReaderResult<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| ReaderError::InvalidData(format!("dimensions {:?} overflow", dims)))
}

impl RecordingReader for EEGLABReader {
    fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    fn read(&self, channels: Option<&[String]>) -> ReaderResult<Recording> {
        let indices = resolve_channel_indices(&self.metadata.channels, channels)?;

        let data = match &self.data_source {
            DataSource::InMemory(all) => indices.iter().map(|&i| all[i].clone()).collect(),
            DataSource::Fdt {
                fdt_path,
                num_channels,
                num_samples,
            } => Self::read_fdt(fdt_path, *num_channels, *num_samples, &indices)?,
        };

        let mut metadata = self.metadata.clone();
        metadata.channels = indices
            .iter()
            .map(|&i| self.metadata.channels[i].clone())
            .collect();
        metadata.num_channels = metadata.channels.len();

        Ok(Recording { metadata, data })
    }

    fn format_name(&self) -> &str {
        "EEGLAB"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{write_fdt, write_mat_file, MatVar};
    use std::fs;

    fn volts(microvolts: &[f64]) -> Vec<f64> {
        microvolts.iter().map(|v| v * MICROVOLTS_TO_VOLTS).collect()
    }

    #[test]
    fn test_set_fdt_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        write_mat_file(
            &set,
            &[
                MatVar::scalar("srate", 250.0),
                MatVar::scalar("nbchan", 2.0),
                MatVar::scalar("pnts", 3.0),
                MatVar::scalar("trials", 1.0),
            ],
        ).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]]).unwrap();

        let reader = EEGLABReader::open(&set).unwrap();
        assert_eq!(reader.metadata().sample_rate, 250.0);
        assert_eq!(reader.metadata().num_channels, 2);
        assert_eq!(reader.metadata().num_samples, 3);
        assert_eq!(reader.metadata().channels, vec!["Ch1", "Ch2"]);

        let rec = reader.read(None).unwrap();
        assert_eq!(rec.data[0], volts(&[1.0, 2.0, 3.0]));
        assert_eq!(rec.data[1], volts(&[-1.0, -2.0, -3.0]));

        let only_second = reader.read(Some(&["Ch2".to_string()])).unwrap();
        assert_eq!(only_second.data.len(), 1);
        assert_eq!(only_second.metadata.channels, vec!["Ch2"]);
        assert_eq!(only_second.data[0], volts(&[-1.0, -2.0, -3.0]));
    }

    #[test]
    fn test_embedded_data_matrix() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        // 2 channels x 3 samples, column-major
        write_mat_file(
            &set,
            &[
                MatVar::scalar("srate", 100.0),
                MatVar::matrix("data", 2, 3, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]),
            ],
        ).unwrap();

        let rec = EEGLABReader::open(&set).unwrap().read(None).unwrap();
        assert_eq!(rec.sample_rate(), 100.0);
        assert_eq!(rec.data, vec![volts(&[1.0, 2.0, 3.0]), volts(&[10.0, 20.0, 30.0])]);
    }

    #[test]
    fn test_sidecar_fills_rate_and_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("sub-01_task-open_clean_eeg.set");
        write_mat_file(&set, &[MatVar::scalar("nbchan", 2.0), MatVar::scalar("pnts", 2.0)]).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![0.5, 0.25], vec![4.0, 8.0]]).unwrap();
        fs::write(
            tmp.path().join("sub-01_task-open_clean_eeg.json"),
            r#"{"SamplingFrequency": 512}"#,
        )
        .unwrap();
        fs::write(
            tmp.path().join("sub-01_task-open_clean_channels.tsv"),
            "name\ttype\nFz\tEEG\nCz\tEEG\n",
        )
        .unwrap();

        let rec = EEGLABReader::open(&set).unwrap().read(None).unwrap();
        assert_eq!(rec.sample_rate(), 512.0);
        assert_eq!(rec.channel_names(), &["Fz".to_string(), "Cz".to_string()]);
        assert_eq!(rec.data[1], volts(&[4.0, 8.0]));
    }

    #[test]
    fn test_missing_sampling_rate_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        write_mat_file(&set, &[MatVar::scalar("nbchan", 1.0), MatVar::scalar("pnts", 2.0)]).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![1.0, 2.0]]).unwrap();

        let result = EEGLABReader::open(&set);
        assert!(matches!(result, Err(ReaderError::MissingMetadata(_))));
    }

    #[test]
    fn test_truncated_fdt_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        write_mat_file(
            &set,
            &[
                MatVar::scalar("srate", 250.0),
                MatVar::scalar("nbchan", 2.0),
                MatVar::scalar("pnts", 100.0),
            ],
        ).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();

        let result = EEGLABReader::open(&set);
        assert!(matches!(result, Err(ReaderError::InvalidData(_))));
    }

    #[test]
    fn test_hdf5_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        let mut bytes = HDF5_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&set, bytes).unwrap();

        let result = EEGLABReader::open(&set);
        assert!(matches!(result, Err(ReaderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_samples_converted_to_volts() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        write_mat_file(
            &set,
            &[
                MatVar::scalar("srate", 100.0),
                MatVar::scalar("nbchan", 1.0),
                MatVar::scalar("pnts", 2.0),
            ],
        ).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![50.0, -25.0]]).unwrap();

        let rec = EEGLABReader::open(&set).unwrap().read(None).unwrap();
        assert!((rec.data[0][0] - 50e-6).abs() < 1e-18);
        assert!((rec.data[0][1] + 25e-6).abs() < 1e-18);
    }

    #[test]
    fn test_epoched_dataset_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        write_mat_file(
            &set,
            &[
                MatVar::scalar("srate", 250.0),
                MatVar::scalar("nbchan", 1.0),
                MatVar::scalar("pnts", 2.0),
                MatVar::scalar("trials", 3.0),
            ],
        ).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![1.0; 6]]).unwrap();

        let result = EEGLABReader::open(&set);
        assert!(matches!(result, Err(ReaderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_overflowing_dimensions_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let set = tmp.path().join("open_clean.set");
        write_mat_file(
            &set,
            &[
                MatVar::scalar("srate", 250.0),
                MatVar::scalar("nbchan", 4.0),
                MatVar::scalar("pnts", 1e300),
            ],
        ).unwrap();
        write_fdt(&set.with_extension("fdt"), &[vec![1.0; 4]]).unwrap();

        let result = EEGLABReader::open(&set);
        assert!(matches!(result, Err(ReaderError::InvalidData(_))));
    }

    #[test]
    fn test_checked_product() {
        assert_eq!(checked_product(&[2, 3, 4]).unwrap(), 24);
        assert_eq!(checked_product(&[]).unwrap(), 1);
        assert!(checked_product(&[usize::MAX, 2]).is_err());
    }
}
