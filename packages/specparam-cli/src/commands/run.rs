use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use specparam_rs::output::{save_report, OutputOptions, SavedTables};
use specparam_rs::pipeline::{self, PipelineConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Serialize)]
struct RunSummary<'a> {
    processed: usize,
    missing: usize,
    failed: usize,
    ns_rows: usize,
    sd_rows: usize,
    elapsed_seconds: f64,
    tables: &'a SavedTables,
}

pub fn execute(args: RunArgs) -> i32 {
    if let Err(msg) = params::validate_dir(&args.data_root, "Data root") {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let settings = match params::build_fit_settings(&args.welch, &args.model) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let config = PipelineConfig {
        data_root: PathBuf::from(&args.data_root),
        participants_path: args.participants.as_ref().map(PathBuf::from),
        settings,
        channels: args.channels.clone(),
    };

    let jobs = match pipeline::plan(&config) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let start_time = Instant::now();
    let report = pipeline::run_jobs(
        &jobs,
        &config.settings,
        config.channels.as_deref(),
        |progress| {
            // Missing and failed recordings are reported by the pipeline's own warnings
            if let Some(path) = &progress.job.recording {
                output::progress(
                    args.quiet,
                    format!(
                        "[{}/{}] Loading {} {} ({}) → {}",
                        progress.index + 1,
                        progress.total,
                        progress.job.subject,
                        progress.job.session,
                        progress.job.condition,
                        path.display()
                    ),
                );
            }
        },
    );

    let options = OutputOptions {
        include_metrics: args.metrics,
        write_peaks: args.peaks,
    };
    let tables = match save_report(Path::new(&args.output_dir), &report, options) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: Failed to write results to '{}': {}", args.output_dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let elapsed = start_time.elapsed();
    output::progress(
        args.quiet,
        format!(
            "Saved results → {} & {}",
            tables.ns.display(),
            tables.sd.display()
        ),
    );
    output::progress(
        args.quiet,
        format!(
            "Run complete: {} processed, {} missing, {} failed, {:.1}s",
            report.processed,
            report.missing,
            report.failed,
            elapsed.as_secs_f64()
        ),
    );

    if args.json {
        let summary = RunSummary {
            processed: report.processed,
            missing: report.missing,
            failed: report.failed,
            ns_rows: report.ns.len(),
            sd_rows: report.sd.len(),
            elapsed_seconds: elapsed.as_secs_f64(),
            tables: &tables,
        };
        if let Err(e) = output::emit_json(&summary, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    if report.failed == 0 {
        exit_codes::SUCCESS
    } else if report.processed > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}
