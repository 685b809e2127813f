use serde::{Deserialize, Serialize};
use std::fmt;

/// Experimental condition of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Normal sleep
    NS,
    /// Sleep deprivation
    SD,
}

impl Condition {
    pub fn label(&self) -> &'static str {
        match self {
            Condition::NS => "NS",
            Condition::SD => "SD",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Frequency band in Hz, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub low: f64,
    pub high: f64,
}

impl FrequencyRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low && freq <= self.high
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self { low: 1.0, high: 40.0 }
    }
}

/// Parameters of one detected oscillatory peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    /// Center frequency in Hz
    pub center_frequency: f64,
    /// Height above the aperiodic fit, in log10 power
    pub power: f64,
    /// Full bandwidth in Hz (two standard deviations of the fitted Gaussian)
    pub bandwidth: f64,
}

/// Model parameters extracted for a single channel of a single session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResult {
    pub subject: String,
    pub session: String,
    pub condition: Condition,
    pub channel: String,
    pub aperiodic_exponent: f64,
    pub aperiodic_offset: f64,
    pub aperiodic_knee: Option<f64>,
    pub n_peaks: usize,
    pub r_squared: f64,
    pub error: f64,
    pub peaks: Vec<PeakParams>,
}

/// Power spectrum of one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSpectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}
