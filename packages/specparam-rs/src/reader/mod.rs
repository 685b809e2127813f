/// Recording Readers
///
/// Loads continuous EEG recordings into per-channel sample vectors. Every
/// format implements `RecordingReader`; `ReaderFactory` picks the reader from
/// the file extension.
use std::path::{Path, PathBuf};

pub mod eeglab;
pub mod sidecar;

pub use eeglab::EEGLABReader;

/// Metadata common to all recording formats
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    pub file_path: PathBuf,
    pub sample_rate: f64,
    pub num_channels: usize,
    pub num_samples: usize,
    pub channels: Vec<String>,
    pub format: String,
}

impl RecordingMetadata {
    pub fn duration(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.num_samples as f64 / self.sample_rate
        } else {
            0.0
        }
    }
}

/// A fully loaded recording: `data[channel][sample]`
#[derive(Debug, Clone)]
pub struct Recording {
    pub metadata: RecordingMetadata,
    pub data: Vec<Vec<f64>>,
}

impl Recording {
    pub fn sample_rate(&self) -> f64 {
        self.metadata.sample_rate
    }

    pub fn channel_names(&self) -> &[String] {
        &self.metadata.channels
    }

    /// Iterate over `(channel name, samples)` pairs in file order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.metadata
            .channels
            .iter()
            .map(|s| s.as_str())
            .zip(self.data.iter().map(|d| d.as_slice()))
    }
}

pub type ReaderResult<T> = Result<T, ReaderError>;

#[derive(Debug)]
pub enum ReaderError {
    IoError(std::io::Error),
    ParseError(String),
    UnsupportedFormat(String),
    InvalidData(String),
    MissingMetadata(String),
    ChannelNotFound(String),
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::IoError(e) => write!(f, "IO error: {}", e),
            ReaderError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ReaderError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            ReaderError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            ReaderError::MissingMetadata(msg) => write!(f, "Missing metadata: {}", msg),
            ReaderError::ChannelNotFound(name) => write!(f, "Channel not found: {}", name),
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::IoError(err)
    }
}

/// Trait that all recording readers implement
pub trait RecordingReader: Send + Sync {
    /// Metadata parsed at open time, before samples are loaded
    fn metadata(&self) -> &RecordingMetadata;

    /// Load samples for the selected channels (None = all, in file order)
    fn read(&self, channels: Option<&[String]>) -> ReaderResult<Recording>;

    fn format_name(&self) -> &str;
}

/// Resolve channel names to indices, preserving the requested order.
pub fn resolve_channel_indices(
    all_channels: &[String],
    selected: Option<&[String]>,
) -> ReaderResult<Vec<usize>> {
    match selected {
        None => Ok((0..all_channels.len()).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                all_channels
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| ReaderError::ChannelNotFound(name.clone()))
            })
            .collect(),
    }
}

pub struct ReaderFactory;

impl ReaderFactory {
    pub fn create_reader(path: &Path) -> ReaderResult<Box<dyn RecordingReader>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "set" => Ok(Box::new(EEGLABReader::open(path)?)),
            _ => Err(ReaderError::UnsupportedFormat(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    pub fn supported_extensions() -> Vec<&'static str> {
        vec!["set"]
    }

    pub fn is_supported(path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            Self::supported_extensions().contains(&ext.to_lowercase().as_str())
        } else {
            false
        }
    }
}

/// Open and fully load a recording.
pub fn load_recording(path: &Path, channels: Option<&[String]>) -> ReaderResult<Recording> {
    let reader = ReaderFactory::create_reader(path)?;
    log::debug!(
        "Opened {} recording {} ({} channels, {} samples @ {} Hz)",
        reader.format_name(),
        path.display(),
        reader.metadata().num_channels,
        reader.metadata().num_samples,
        reader.metadata().sample_rate
    );
    reader.read(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(ReaderFactory::is_supported(Path::new("a_open_clean.set")));
        assert!(ReaderFactory::is_supported(Path::new("A_OPEN_CLEAN.SET")));
        assert!(!ReaderFactory::is_supported(Path::new("a.edf")));
        assert!(!ReaderFactory::is_supported(Path::new("noext")));
    }

    #[test]
    fn test_create_reader_unsupported() {
        let result = ReaderFactory::create_reader(Path::new("/tmp/recording.edf"));
        assert!(matches!(result, Err(ReaderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_resolve_channel_indices() {
        let all: Vec<String> = ["Fz", "Cz", "Pz"].iter().map(|s| s.to_string()).collect();
        assert_eq!(resolve_channel_indices(&all, None).unwrap(), vec![0, 1, 2]);

        let pick = vec!["Pz".to_string(), "Fz".to_string()];
        assert_eq!(resolve_channel_indices(&all, Some(&pick)).unwrap(), vec![2, 0]);

        let bad = vec!["Oz".to_string()];
        assert!(matches!(
            resolve_channel_indices(&all, Some(&bad)),
            Err(ReaderError::ChannelNotFound(_))
        ));
    }
}
