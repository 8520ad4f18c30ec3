use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::defaults::{
    DEFAULT_MOST_FREQUENT_STATE, DEFAULT_RESOLUTION_LEVELS, DEFAULT_STATE_SET,
};
use crate::filenames::SETTINGS_FILENAME;
use crate::hmm::{CopyNumberState, FitBudget, parse_state_set};

#[derive(Args, Deserialize, Serialize)]
pub struct SegmentSettings {
    /// Directory for all segment command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_segment_output"))]
    pub output_dir: Utf8PathBuf,

    /// Binned count file for one sample, in messagepack format. Repeat for a multi-sample batch.
    #[arg(long = "counts", value_name = "FILE", required = true)]
    pub count_filenames: Vec<String>,

    /// Ordered copy number state set to fit, as a comma-separated label list
    #[arg(long, value_name = "STATES", default_value = DEFAULT_STATE_SET)]
    pub states: String,

    /// State assumed to cover the largest fraction of the genome
    ///
    /// Used to anchor the baseline mean initialization of each EM trial.
    ///
    #[arg(long, value_name = "STATE", default_value = DEFAULT_MOST_FREQUENT_STATE)]
    pub most_frequent_state: String,

    /// Treat input as strand-seq data: fit each strand separately and call
    /// sister chromatid exchange events from the joint strand path
    #[arg(long)]
    pub strandseq: bool,

    /// Log-likelihood improvement below which an EM trial stops as converged
    #[arg(hide = true, long, default_value_t = 0.1)]
    pub eps: f64,

    /// Maximum EM iterations per trial
    #[arg(hide = true, long, default_value_t = 1000)]
    pub max_iter: usize,

    /// Wall-clock budget in seconds for each model fit
    #[arg(long, value_name = "SECONDS")]
    pub max_time: Option<f64>,

    /// Number of random-restart EM trials per fit
    #[arg(long, default_value_t = 10)]
    pub num_trials: usize,

    /// Seed for the random restart initializations
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// SCE breakpoint refinement scan resolutions in bases, coarse to fine
    #[arg(hide = true, long, value_name = "BASES", default_value = DEFAULT_RESOLUTION_LEVELS)]
    pub resolution: String,

    /// Minimum width in bins for the segments flanking an SCE candidate
    #[arg(hide = true, long, default_value_t = 2)]
    pub min_segwidth: u32,

    /// Minimum strand-consistent read support per side for SCE breakpoint refinement
    #[arg(hide = true, long, default_value_t = 50)]
    pub min_reads: usize,
}

impl SegmentSettings {
    pub fn get_fit_budget(&self) -> FitBudget {
        FitBudget {
            eps: self.eps,
            max_iter: self.max_iter,
            max_time: self.max_time,
        }
    }

    /// State set in declared order, assumed already validated
    pub fn get_states(&self) -> Vec<CopyNumberState> {
        parse_state_set(&self.states).unwrap()
    }

    pub fn get_most_frequent_state(&self) -> CopyNumberState {
        self.most_frequent_state.parse().unwrap()
    }

    /// Refinement resolutions in bases, assumed already validated
    pub fn get_resolution_levels(&self) -> Vec<u32> {
        parse_resolution_levels(&self.resolution).unwrap()
    }
}

fn parse_resolution_levels(resolution: &str) -> SimpleResult<Vec<u32>> {
    let mut levels = Vec::new();
    for token in resolution.split(',') {
        let level = match token.trim().parse::<u32>() {
            Ok(x) if x > 0 => x,
            _ => {
                bail!("Invalid resolution level: '{token}'");
            }
        };
        levels.push(level);
    }
    for pair in levels.windows(2) {
        if pair[1] >= pair[0] {
            bail!("Resolution levels must strictly decrease: '{resolution}'");
        }
    }
    Ok(levels)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_segment_settings(
    settings: SegmentSettings,
) -> SimpleResult<SegmentSettings> {
    if settings.count_filenames.is_empty() {
        bail!("Must specify at least one binned count file");
    }
    for filename in settings.count_filenames.iter() {
        if !std::path::Path::new(&filename).exists() {
            bail!("Can't find specified binned count file: '{filename}'");
        }
    }

    let states = parse_state_set(&settings.states)?;
    let most_frequent_state = match settings.most_frequent_state.parse::<CopyNumberState>() {
        Ok(x) => x,
        Err(_) => {
            bail!(
                "Unknown --most-frequent-state label: '{}'",
                settings.most_frequent_state
            );
        }
    };
    if !states.contains(&most_frequent_state) {
        bail!(
            "--most-frequent-state '{}' is not in the fitted state set",
            settings.most_frequent_state
        );
    }

    if settings.eps <= 0.0 {
        bail!("--eps argument must be greater than 0");
    }
    if settings.max_iter == 0 {
        bail!("--max-iter argument must be greater than 0");
    }
    if let Some(max_time) = settings.max_time {
        if max_time <= 0.0 {
            bail!("--max-time argument must be greater than 0");
        }
    }
    if settings.num_trials == 0 {
        bail!("--num-trials argument must be greater than 0");
    }
    if settings.min_segwidth == 0 {
        bail!("--min-segwidth argument must be greater than 0");
    }

    parse_resolution_levels(&settings.resolution)?;

    Ok(settings)
}

/// Write segment settings out in json format
pub fn write_segment_settings(output_dir: &Utf8Path, settings: &SegmentSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing segment settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create segment settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution_levels() {
        assert_eq!(parse_resolution_levels("10000,1000").unwrap(), vec![10000, 1000]);
        assert_eq!(parse_resolution_levels("500").unwrap(), vec![500]);

        assert!(parse_resolution_levels("1000,10000").is_err());
        assert!(parse_resolution_levels("1000,1000").is_err());
        assert!(parse_resolution_levels("1000,0").is_err());
        assert!(parse_resolution_levels("").is_err());
    }
}
