//! Per-sample segmentation runner
//!
//! Each input count file is processed as an independent task on the worker
//! pool: fit the copy number model, decode it into segments, and in strand-seq
//! mode call SCE events from the per-strand fits. One failing sample is logged
//! and skipped without stopping the rest of the batch.

use std::sync::mpsc::channel;

use camino::Utf8PathBuf;
use log::{error, info};
use simple_error::SimpleResult;

use crate::bin_counts::{GenomeBinCounts, deserialize_genome_bin_counts};
use crate::bivariate::{SceEvent, find_sce_candidates, get_chrom_joint_path};
use crate::cli::{SegmentSettings, SharedSettings, write_segment_settings};
use crate::decode::{SampleSegments, decode};
use crate::hmm::fitter::fit;
use crate::os_utils::create_dir_all;
use crate::run_stats::{SampleFitStats, SegmentRunStats, write_run_stats};
use crate::sample_output::{
    serialize_sample_segments, serialize_sce_events, write_model_json,
    write_sce_events_bed_file, write_segment_bedgraph_file,
};
use crate::sce_refine::refine_sce_candidate;

/// Fit both strand models and translate joint-path dominance flips into SCE events
///
/// No read-level fragment data flows through the binned count input, so events
/// keep their bin-level breakpoint intervals here.
///
fn get_sample_sce_events(
    settings: &SegmentSettings,
    counts: &GenomeBinCounts,
) -> SimpleResult<Vec<SceEvent>> {
    let states = settings.get_states();
    let most_frequent_state = settings.get_most_frequent_state();
    let budget = settings.get_fit_budget();
    let resolution_levels = settings.get_resolution_levels();

    let chrom_count = counts.chrom_list.data.len();
    let watson_series = (0..chrom_count)
        .map(|chrom_index| counts.strand_series(chrom_index, true))
        .collect::<Vec<_>>();
    let crick_series = (0..chrom_count)
        .map(|chrom_index| counts.strand_series(chrom_index, false))
        .collect::<Vec<_>>();

    let watson_model = fit(
        &counts.sample_id,
        &watson_series,
        &states,
        most_frequent_state,
        &budget,
        settings.num_trials,
        settings.seed,
    )?;
    let crick_model = fit(
        &counts.sample_id,
        &crick_series,
        &states,
        most_frequent_state,
        &budget,
        settings.num_trials,
        settings.seed,
    )?;

    let mut sce_events = Vec::new();
    for chrom_index in 0..chrom_count {
        let joint_path = get_chrom_joint_path(
            &watson_model,
            &crick_model,
            &watson_series[chrom_index],
            &crick_series[chrom_index],
        );
        for candidate in find_sce_candidates(chrom_index, &joint_path) {
            if let Some(event) = refine_sce_candidate(
                &candidate,
                counts.bin_size,
                &resolution_levels,
                settings.min_segwidth,
                None,
                settings.min_reads,
            ) {
                sce_events.push(event);
            }
        }
    }
    Ok(sce_events)
}

/// Run the full segmentation workflow for one input count file
///
/// Writes all per-sample artifacts into a sample directory under the command
/// output directory, and returns the sample's run stats entry.
///
fn process_sample(
    settings: &SegmentSettings,
    count_filename: &str,
) -> SimpleResult<SampleFitStats> {
    let counts = deserialize_genome_bin_counts(&Utf8PathBuf::from(count_filename))?;

    info!(
        "Fitting copy number model for sample '{}' over {} bins",
        counts.sample_id,
        counts.total_bin_count()
    );

    let chrom_count = counts.chrom_list.data.len();
    let series = (0..chrom_count)
        .map(|chrom_index| counts.univariate_series(chrom_index))
        .collect::<Vec<_>>();

    let model = fit(
        &counts.sample_id,
        &series,
        &settings.get_states(),
        settings.get_most_frequent_state(),
        &settings.get_fit_budget(),
        settings.num_trials,
        settings.seed,
    )?;
    let segments = decode(&model, &series);

    let sample_segments = SampleSegments {
        sample_id: counts.sample_id.clone(),
        bin_size: counts.bin_size,
        chrom_list: counts.chrom_list.clone(),
        segments,
    };

    let sample_dir = settings.output_dir.join(&counts.sample_id);
    create_dir_all(&sample_dir, "sample output");

    write_model_json(&sample_dir, &model);
    serialize_sample_segments(&sample_dir, &sample_segments);
    write_segment_bedgraph_file(&sample_dir, &sample_segments);

    let sce_events = if settings.strandseq {
        let sce_events = get_sample_sce_events(settings, &counts)?;
        serialize_sce_events(&sample_dir, &sce_events);
        write_sce_events_bed_file(
            &sample_dir,
            &counts.chrom_list,
            &counts.sample_id,
            &sce_events,
        );
        sce_events
    } else {
        Vec::new()
    };

    Ok(SampleFitStats::new(
        &model,
        &sample_segments.segments,
        sce_events.len(),
    ))
}

/// Run the segment command over all input count files
pub fn run_segment(shared_settings: &SharedSettings, settings: &SegmentSettings) {
    let start = std::time::Instant::now();
    let sample_count = settings.count_filenames.len();

    write_segment_settings(&settings.output_dir, settings);

    info!("Processing {sample_count} sample count file(s)");

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shared_settings.thread_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();
    worker_pool.scope(move |scope| {
        for (sample_index, count_filename) in settings.count_filenames.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = process_sample(settings, count_filename);
                tx.send((sample_index, result)).unwrap();
            });
        }
    });

    let mut results: Vec<Option<SimpleResult<SampleFitStats>>> =
        (0..sample_count).map(|_| None).collect();
    for (sample_index, result) in rx {
        results[sample_index] = Some(result);
    }

    let mut samples = Vec::new();
    let mut failed_samples = Vec::new();
    for (count_filename, result) in settings.count_filenames.iter().zip(results) {
        match result.unwrap() {
            Ok(sample_stats) => {
                samples.push(sample_stats);
            }
            Err(msg) => {
                error!("Failed to process sample count file '{count_filename}': {msg}");
                failed_samples.push(count_filename.clone());
            }
        }
    }

    let run_stats = SegmentRunStats {
        run_time_secs: start.elapsed().as_secs_f64(),
        sample_count,
        failed_samples,
        samples,
    };
    write_run_stats(&settings.output_dir, &run_stats);
}
