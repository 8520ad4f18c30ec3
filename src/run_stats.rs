//! Track stats for the whole karyoseg run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::decode::Segment;
use crate::filenames::RUN_STATS_FILENAME;
use crate::hmm::Model;

/// Genome-wide copy number summary for one fitted sample
#[derive(Default, Deserialize, Serialize)]
pub struct KaryotypeSummary {
    /// Bin-weighted mean integer copy number over all decoded segments
    pub mean_copy_number: f64,

    /// Fraction of bins assigned to each state, keyed on state label
    pub state_bin_fractions: Vec<(String, f64)>,
}

impl KaryotypeSummary {
    pub fn new(segments: &[Vec<Segment>]) -> Self {
        let mut state_bins = std::collections::BTreeMap::new();
        let mut copy_number_sum = 0.0;
        let mut total_bins = 0usize;

        for chrom_segments in segments.iter() {
            for segment in chrom_segments.iter() {
                let bin_count = segment.bin_count();
                *state_bins.entry(segment.state.to_string()).or_insert(0usize) += bin_count;
                copy_number_sum += segment.state.multiplier() * bin_count as f64;
                total_bins += bin_count;
            }
        }

        if total_bins == 0 {
            return Self::default();
        }

        Self {
            mean_copy_number: copy_number_sum / total_bins as f64,
            state_bin_fractions: state_bins
                .into_iter()
                .map(|(label, bins)| (label, bins as f64 / total_bins as f64))
                .collect(),
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
pub struct SampleFitStats {
    pub sample_id: String,
    pub converged: bool,
    pub log_likelihood: f64,
    pub karyotype: KaryotypeSummary,
    pub sce_event_count: usize,
}

impl SampleFitStats {
    pub fn new(model: &Model, segments: &[Vec<Segment>], sce_event_count: usize) -> Self {
        Self {
            sample_id: model.sample_id.clone(),
            converged: model.converged,
            log_likelihood: model.log_likelihood,
            karyotype: KaryotypeSummary::new(segments),
            sce_event_count,
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
pub struct SegmentRunStats {
    pub run_time_secs: f64,
    pub sample_count: usize,

    /// Input count files whose processing failed, in input order
    pub failed_samples: Vec<String>,

    pub samples: Vec<SampleFitStats>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct AggregateRunStats {
    pub run_time_secs: f64,
    pub sample_count: usize,
    pub pooled_sce_event_count: usize,
    pub hotspot_count: usize,
}

/// Write run_stats structure out in json format
pub fn write_run_stats<T: Serialize>(output_dir: &Utf8Path, run_stats: &T) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}
