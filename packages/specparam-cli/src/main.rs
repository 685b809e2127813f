use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;
mod params;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Run(args) => commands::run::execute(args),
        cli::Command::Discover(args) => commands::discover::execute(args),
        cli::Command::Fit(args) => commands::fit::execute(args),
        cli::Command::Psd(args) => commands::psd::execute(args),
        cli::Command::Simulate(args) => commands::simulate::execute(args),
    };

    std::process::exit(exit_code);
}
