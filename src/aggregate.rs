//! Cross-sample aggregation runner
//!
//! Loads the per-sample artifacts written by the segment command, pools SCE
//! events into hotspot detection, and clusters samples into a consensus
//! copy number template.

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::{error, info};
use unwrap::unwrap;

use crate::bivariate::SceEvent;
use crate::chrom_list::ChromList;
use crate::cli::{AggregateSettings, SharedSettings, write_aggregate_settings};
use crate::consensus::{ConsensusResult, get_consensus};
use crate::decode::SampleSegments;
use crate::filenames::{
    CONSENSUS_JSON_FILENAME, HOTSPOT_BED_FILENAME, SCE_EVENTS_MESSAGEPACK_FILENAME,
};
use crate::hmm::CopyNumberState;
use crate::hotspot::{Hotspot, detect_hotspots};
use crate::run_stats::{AggregateRunStats, write_run_stats};
use crate::sample_output::{
    deserialize_sample_segments, deserialize_sce_events, read_model_json,
};

struct AggregateSampleData {
    sample_segments: Vec<SampleSegments>,

    /// Pooled over all samples
    sce_events: Vec<SceEvent>,
}

/// Load all per-sample artifacts and check that they can be aggregated
///
/// All samples must share one state set and one chromosome list. Samples from
/// non-strand-seq segment runs have no SCE event file and contribute no events.
///
fn read_sample_data(sample_dirs: &[camino::Utf8PathBuf]) -> AggregateSampleData {
    let mut sample_segments: Vec<SampleSegments> = Vec::new();
    let mut sce_events = Vec::new();
    let mut first_states: Option<Vec<CopyNumberState>> = None;

    for sample_dir in sample_dirs {
        info!("Reading segment command results from directory: '{sample_dir}'");

        let model = read_model_json(sample_dir);
        match &first_states {
            Some(states) => {
                if *states != model.states {
                    error!(
                        "Sample '{}' was fitted with a different copy number state set than the first sample",
                        model.sample_id
                    );
                    std::process::exit(exitcode::DATAERR);
                }
            }
            None => {
                first_states = Some(model.states.clone());
            }
        }

        let segments = deserialize_sample_segments(sample_dir);
        if let Some(first) = sample_segments.first() {
            let labels_match = first.chrom_list.data.len() == segments.chrom_list.data.len()
                && first
                    .chrom_list
                    .data
                    .iter()
                    .zip(segments.chrom_list.data.iter())
                    .all(|(a, b)| a.label == b.label && a.length == b.length);
            if !labels_match {
                error!(
                    "Sample '{}' was segmented over a different chromosome list than the first sample",
                    segments.sample_id
                );
                std::process::exit(exitcode::DATAERR);
            }
        }

        if sample_dir.join(SCE_EVENTS_MESSAGEPACK_FILENAME).exists() {
            sce_events.extend(deserialize_sce_events(sample_dir));
        }
        sample_segments.push(segments);
    }

    AggregateSampleData {
        sample_segments,
        sce_events,
    }
}

/// Write hotspot regions out as a bed track
///
/// The name column carries the pooled event count, the score column the
/// empirical p-value.
///
fn write_hotspot_bed_file(output_dir: &Utf8Path, chrom_list: &ChromList, hotspots: &[Hotspot]) {
    let filename = output_dir.join(HOTSPOT_BED_FILENAME);

    info!("Writing SCE hotspot track to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create SCE hotspot track file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    for hotspot in hotspots.iter() {
        let chrom_label = &chrom_list.data[hotspot.chrom_index].label;
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{:.4}",
            chrom_label,
            hotspot.range.start,
            hotspot.range.end,
            hotspot.event_count,
            hotspot.pvalue,
        )
        .unwrap();
    }
}

/// Write the consensus template and clustering out in json format
fn write_consensus_json(output_dir: &Utf8Path, consensus: &ConsensusResult) {
    let filename = output_dir.join(CONSENSUS_JSON_FILENAME);

    info!("Writing consensus clustering to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create consensus clustering json file: '{filename}'"
    );
    serde_json::to_writer_pretty(&f, &consensus).unwrap();
}

/// Run the aggregate command over all sample directories
pub fn run_aggregate(_shared_settings: &SharedSettings, settings: &AggregateSettings) {
    let start = std::time::Instant::now();

    write_aggregate_settings(&settings.output_dir, settings);

    let sample_data = read_sample_data(&settings.sample_dirs);
    let chrom_list = &sample_data.sample_segments[0].chrom_list;

    info!(
        "Detecting SCE hotspots from {} pooled event(s) over {} sample(s)",
        sample_data.sce_events.len(),
        sample_data.sample_segments.len()
    );

    let hotspots = detect_hotspots(
        &sample_data.sce_events,
        chrom_list,
        settings.bandwidth,
        settings.pvalue,
    );
    write_hotspot_bed_file(&settings.output_dir, chrom_list, &hotspots);

    let consensus = get_consensus(
        &sample_data.sample_segments,
        !settings.disable_clustering,
    );
    write_consensus_json(&settings.output_dir, &consensus);

    let run_stats = AggregateRunStats {
        run_time_secs: start.elapsed().as_secs_f64(),
        sample_count: sample_data.sample_segments.len(),
        pooled_sce_event_count: sample_data.sce_events.len(),
        hotspot_count: hotspots.len(),
    };
    write_run_stats(&settings.output_dir, &run_stats);
}
