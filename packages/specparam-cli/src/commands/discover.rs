use crate::cli::DiscoverArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use specparam_rs::pipeline::{self, PipelineConfig};
use std::path::PathBuf;

pub fn execute(args: DiscoverArgs) -> i32 {
    if let Err(msg) = params::validate_dir(&args.data_root, "Data root") {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let mut config = PipelineConfig::new(&args.data_root);
    config.participants_path = args.participants.as_ref().map(PathBuf::from);

    let jobs = match pipeline::plan(&config) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if args.json {
        if let Err(e) = output::emit_json(&jobs, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        return exit_codes::SUCCESS;
    }

    println!("{:<12} {:<8} {:<4} RECORDING", "SUBJECT", "SESSION", "COND");
    for job in &jobs {
        let recording = job
            .recording
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<8} {:<4} {}",
            job.subject,
            job.session,
            job.condition.label(),
            recording
        );
    }

    let found = jobs.iter().filter(|j| j.recording.is_some()).count();
    eprintln!(
        "{} session(s), {} with an eyes-open recording, {} missing",
        jobs.len(),
        found,
        jobs.len() - found
    );

    exit_codes::SUCCESS
}
