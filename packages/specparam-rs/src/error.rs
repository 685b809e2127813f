use thiserror::Error;

use crate::reader::ReaderError;

#[derive(Error, Debug)]
pub enum SpecParamError {
    #[error("Participants table not found: {0}")]
    ParticipantsNotFound(String),

    #[error("Invalid participants table: {0}")]
    InvalidParticipants(String),

    #[error("Failed to read recording: {0}")]
    Reader(#[from] ReaderError),

    #[error("Spectral estimation failed: {0}")]
    Spectrum(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpecParamError>;
