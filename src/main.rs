mod aggregate;
mod bin_counts;
mod bivariate;
mod chrom_list;
mod cli;
mod consensus;
mod decode;
mod filenames;
mod globals;
mod hmm;
mod hotspot;
mod int_range;
mod logger;
mod os_utils;
mod prob_utils;
mod run_stats;
mod sample_output;
mod sce_refine;
mod segment;
#[cfg(test)]
mod sim_counts;

use std::{error, process};

use hhmmss::Hhmmss;
use log::info;

use crate::aggregate::run_aggregate;
use crate::cli::Commands;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;
use crate::segment::run_segment;

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Segment(x) => {
            run_segment(&settings.shared, x);
        }
        Commands::Aggregate(x) => {
            run_aggregate(&settings.shared, x);
        }
    }

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the output directory for the log file:
    setup_output_dir_and_logger(
        settings.get_output_dir(),
        settings.shared.clobber,
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        eprintln!("{err}");
        process::exit(2);
    }
}
