mod aggregate;
mod defaults;
mod segment;
mod shared;

use camino::Utf8Path;
use chrono::Datelike;
use clap::{Parser, Subcommand};
use simple_error::{SimpleResult, bail};

use self::aggregate::validate_and_fix_aggregate_settings;
pub use self::aggregate::{AggregateSettings, write_aggregate_settings};
use self::segment::validate_and_fix_segment_settings;
pub use self::segment::{SegmentSettings, write_segment_settings};
use self::shared::validate_and_fix_shared_settings;
pub use self::shared::SharedSettings;

#[derive(Subcommand)]
pub enum Commands {
    /// Fit and decode the copy number model for one to many samples
    Segment(SegmentSettings),

    /// Pool SCE events and segments across samples, given the segment command results from each
    Aggregate(AggregateSettings),
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    after_help = format!("Copyright (C) {}     Karyoseg developers
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()),
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

impl Settings {
    pub fn get_output_dir(&self) -> &Utf8Path {
        match &self.command {
            Commands::Segment(x) => &x.output_dir,
            Commands::Aggregate(x) => &x.output_dir,
        }
    }
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{label} already exists: \"{dirname}\"");
    }
    Ok(())
}

/// Validate settings and update parameters that can't be processed by clap
///
/// Parts of this process assume logging is already setup
///
pub fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::Segment(x) => {
            let x = validate_and_fix_segment_settings(x)?;
            Commands::Segment(x)
        }
        Commands::Aggregate(x) => {
            let x = validate_and_fix_aggregate_settings(x)?;
            Commands::Aggregate(x)
        }
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
