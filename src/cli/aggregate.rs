use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use crate::filenames::SETTINGS_FILENAME;

#[derive(Args, Deserialize, Serialize)]
pub struct AggregateSettings {
    /// Directory for all aggregate command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_aggregate_output"))]
    pub output_dir: Utf8PathBuf,

    /// Per-sample output directory from the segment command. Repeat for each sample.
    #[arg(long = "sample", value_name = "DIR", required = true)]
    pub sample_dirs: Vec<Utf8PathBuf>,

    /// Gaussian kernel bandwidth in bases for hotspot density estimation
    #[arg(long, value_name = "BASES", default_value_t = 1e6)]
    pub bandwidth: f64,

    /// P-value threshold for calling hotspot regions against the permutation null
    #[arg(long, default_value_t = 0.05)]
    pub pvalue: f64,

    /// Skip the sample clustering step, the consensus template is still built
    #[arg(long)]
    pub disable_clustering: bool,
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_aggregate_settings(
    settings: AggregateSettings,
) -> SimpleResult<AggregateSettings> {
    if settings.sample_dirs.is_empty() {
        bail!("Must specify at least one sample directory");
    }
    for sample_dir in settings.sample_dirs.iter() {
        if !sample_dir.is_dir() {
            bail!("Can't find specified sample directory: '{sample_dir}'");
        }
    }

    if settings.bandwidth <= 0.0 {
        bail!("--bandwidth argument must be greater than 0");
    }
    if settings.pvalue <= 0.0 || settings.pvalue >= 1.0 {
        bail!("--pvalue argument must be between 0 and 1");
    }

    Ok(settings)
}

/// Write aggregate settings out in json format
pub fn write_aggregate_settings(output_dir: &Utf8Path, settings: &AggregateSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing aggregate settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create aggregate settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}
