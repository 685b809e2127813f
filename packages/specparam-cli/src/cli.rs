use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "specparam",
    version,
    about = "Per-channel spectral parameterization of resting-state EEG",
    long_about = "Fit aperiodic (1/f) and periodic (peak) components to the power spectrum of\n\
                  every channel of eyes-open EEGLAB recordings in a BIDS dataset, and write\n\
                  one results table per condition (NS: normal sleep, SD: sleep deprivation)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parameterize every participant and session and write the NS/SD tables
    Run(RunArgs),
    /// List the recordings the pipeline would process
    Discover(DiscoverArgs),
    /// Parameterize every channel of a single recording
    Fit(FitArgs),
    /// Compute the sanitized power spectrum of one channel
    Psd(PsdArgs),
    /// Write a synthetic BIDS dataset
    Simulate(SimulateArgs),
}

/// Welch spectrum options
#[derive(Args, Clone)]
pub struct WelchArgs {
    /// Segment length in samples (default: one second)
    #[arg(long)]
    pub nperseg: Option<usize>,

    /// Segment overlap in samples (default: nperseg / 8)
    #[arg(long)]
    pub noverlap: Option<usize>,

    /// Segment averaging: mean or median
    #[arg(long, default_value = "mean")]
    pub average: String,

    /// Discard this percentage of highest-power segments
    #[arg(long)]
    pub outlier_percent: Option<f64>,
}

/// Spectral model options
#[derive(Args, Clone)]
pub struct ModelArgs {
    /// Lower edge of the fitted frequency range in Hz
    #[arg(long, default_value_t = 1.0)]
    pub f_low: f64,

    /// Upper edge of the fitted frequency range in Hz
    #[arg(long, default_value_t = 40.0)]
    pub f_high: f64,

    /// Peak width limits in Hz as "min,max"
    #[arg(long, default_value = "1,12")]
    pub peak_width_limits: String,

    /// Maximum number of peaks per spectrum
    #[arg(long)]
    pub max_n_peaks: Option<usize>,

    /// Absolute minimum peak height (log10 power)
    #[arg(long, default_value_t = 0.0)]
    pub min_peak_height: f64,

    /// Relative peak threshold in standard deviations
    #[arg(long, default_value_t = 2.0)]
    pub peak_threshold: f64,

    /// Aperiodic mode: fixed or knee
    #[arg(long, default_value = "fixed")]
    pub aperiodic_mode: String,
}

#[derive(Args)]
pub struct RunArgs {
    /// BIDS dataset root
    #[arg(long, env = "SPECPARAM_DATA_ROOT")]
    pub data_root: String,

    /// Participants table (default: <data-root>/participants.tsv)
    #[arg(long)]
    pub participants: Option<String>,

    /// Directory for the result tables
    #[arg(long, env = "SPECPARAM_OUTPUT_DIR", default_value = ".")]
    pub output_dir: String,

    /// Restrict to these channel names
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub channels: Option<Vec<String>>,

    #[command(flatten)]
    pub welch: WelchArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Add aperiodic_knee, r_squared and error columns
    #[arg(long, default_value_t = false)]
    pub metrics: bool,

    /// Also write per-peak tables
    #[arg(long, default_value_t = false)]
    pub peaks: bool,

    /// Print a JSON run summary on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct DiscoverArgs {
    /// BIDS dataset root
    #[arg(long, env = "SPECPARAM_DATA_ROOT")]
    pub data_root: String,

    /// Participants table (default: <data-root>/participants.tsv)
    #[arg(long)]
    pub participants: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct FitArgs {
    /// EEGLAB .set file
    #[arg(long)]
    pub file: String,

    /// Restrict to these channel names
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub channels: Option<Vec<String>>,

    #[command(flatten)]
    pub welch: WelchArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct PsdArgs {
    /// EEGLAB .set file
    #[arg(long)]
    pub file: String,

    /// Channel name
    #[arg(long)]
    pub channel: String,

    #[command(flatten)]
    pub welch: WelchArgs,

    /// Only report frequencies at or above this value (Hz)
    #[arg(long)]
    pub f_low: Option<f64>,

    /// Only report frequencies at or below this value (Hz)
    #[arg(long)]
    pub f_high: Option<f64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Dataset root to create
    #[arg(long)]
    pub out_dir: String,

    /// Number of subjects
    #[arg(long, default_value_t = 2)]
    pub subjects: usize,

    /// Channel names
    #[arg(
        long,
        num_args = 1..,
        value_delimiter = ',',
        default_values_t = vec!["Fz".to_string(), "Cz".to_string(), "Pz".to_string(), "Oz".to_string()]
    )]
    pub channels: Vec<String>,

    /// Sampling rate in Hz
    #[arg(long, default_value_t = 250.0)]
    pub sample_rate: f64,

    /// Recording length in seconds
    #[arg(long, default_value_t = 60.0)]
    pub duration: f64,

    /// Aperiodic exponent of the NS sessions
    #[arg(long, default_value_t = 1.6)]
    pub ns_exponent: f64,

    /// Exponent change in the SD sessions
    #[arg(long, default_value_t = -0.3, allow_hyphen_values = true)]
    pub sd_shift: f64,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Parse a "min,max" pair of floats.
pub fn parse_range(s: &str) -> Result<[f64; 2], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid range '{}': expected 'min,max' (e.g. '1,12')",
            s
        ));
    }
    let lo = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid range '{}': '{}' is not a number", s, parts[0]))?;
    let hi = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid range '{}': '{}' is not a number", s, parts[1]))?;
    Ok([lo, hi])
}
