pub mod discovery;
pub mod error;
pub mod model;
pub mod output;
pub mod participants;
pub mod pipeline;
pub mod reader;
pub mod sanitize;
pub mod simulate;
pub mod spectral;
pub mod types;
pub mod writer;

pub use error::{Result, SpecParamError};
pub use model::{AperiodicMode, ModelSettings, SpectralFit, SpectralModel};
pub use pipeline::{run_pipeline, FitSettings, PipelineConfig, PipelineReport};
pub use spectral::{compute_spectrum_welch, AvgType, WelchSettings};
pub use types::*;
