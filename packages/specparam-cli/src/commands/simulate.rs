use crate::cli::SimulateArgs;
use crate::exit_codes;
use crate::output;
use specparam_rs::simulate::{simulate_dataset, DatasetSpec};
use std::path::Path;

pub fn execute(args: SimulateArgs) -> i32 {
    if args.subjects == 0 {
        eprintln!("Error: --subjects must be at least 1");
        return exit_codes::INPUT_ERROR;
    }
    if args.channels.is_empty() {
        eprintln!("Error: At least one channel must be specified");
        return exit_codes::INPUT_ERROR;
    }
    if !(args.sample_rate > 0.0 && args.duration > 0.0) {
        eprintln!("Error: --sample-rate and --duration must be positive");
        return exit_codes::INPUT_ERROR;
    }

    let spec = DatasetSpec {
        n_subjects: args.subjects,
        channels: args.channels.clone(),
        sample_rate: args.sample_rate,
        duration: args.duration,
        ns_exponent: args.ns_exponent,
        sd_exponent_shift: args.sd_shift,
        seed: args.seed,
        ..Default::default()
    };

    let written = match simulate_dataset(Path::new(&args.out_dir), &spec) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if args.json {
        if let Err(e) = output::emit_json(&written, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        for rec in &written {
            println!(
                "{} {} {} exponent={:.2} {}",
                rec.subject,
                rec.session,
                rec.condition,
                rec.exponent,
                rec.path.display()
            );
        }
        eprintln!("Wrote {} recording(s) under {}", written.len(), args.out_dir);
    }

    exit_codes::SUCCESS
}
