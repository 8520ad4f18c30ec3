//! Readers and writers for the per-sample segmentation artifacts
//!

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use camino::Utf8Path;
use log::info;
use serde::Serialize;
use unwrap::unwrap;

use crate::bivariate::SceEvent;
use crate::chrom_list::ChromList;
use crate::decode::SampleSegments;
use crate::filenames::{
    MODEL_JSON_FILENAME, SCE_EVENTS_BED_FILENAME, SCE_EVENTS_MESSAGEPACK_FILENAME,
    SEGMENT_BEDGRAPH_FILENAME, SEGMENT_MESSAGEPACK_FILENAME,
};
use crate::hmm::Model;

/// Write the fitted model out in json format
pub fn write_model_json(sample_dir: &Utf8Path, model: &Model) {
    let filename = sample_dir.join(MODEL_JSON_FILENAME);

    info!("Writing fitted model to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create model json file: '{filename}'"
    );
    serde_json::to_writer_pretty(&f, &model).unwrap();
}

pub fn read_model_json(sample_dir: &Utf8Path) -> Model {
    let filename = sample_dir.join(MODEL_JSON_FILENAME);
    let file = unwrap!(
        File::open(&filename),
        "Unable to open model json file: '{filename}'"
    );
    let reader = BufReader::new(file);
    unwrap!(
        serde_json::from_reader(reader),
        "Unable to parse model from json file: '{filename}'"
    )
}

pub fn serialize_sample_segments(sample_dir: &Utf8Path, sample_segments: &SampleSegments) {
    let filename = sample_dir.join(SEGMENT_MESSAGEPACK_FILENAME);

    info!("Writing copy number segments to binary file: '{filename}'");

    let mut buf = Vec::new();
    sample_segments
        .serialize(&mut rmp_serde::Serializer::new(&mut buf))
        .unwrap();

    unwrap!(
        std::fs::write(&filename, buf.as_slice()),
        "Unable to write copy number segments to binary file: '{filename}'"
    );
}

pub fn deserialize_sample_segments(sample_dir: &Utf8Path) -> SampleSegments {
    let filename = sample_dir.join(SEGMENT_MESSAGEPACK_FILENAME);
    let buf = unwrap!(
        std::fs::read(&filename),
        "Unable to read copy number segment file: '{filename}'"
    );
    let mut sample_segments: SampleSegments = unwrap!(
        rmp_serde::from_slice(&buf),
        "Unable to parse copy number segment file: '{filename}'"
    );
    sample_segments.chrom_list.rebuild_index();
    sample_segments
}

pub fn serialize_sce_events(sample_dir: &Utf8Path, sce_events: &[SceEvent]) {
    let filename = sample_dir.join(SCE_EVENTS_MESSAGEPACK_FILENAME);

    info!("Writing SCE events to binary file: '{filename}'");

    let mut buf = Vec::new();
    sce_events
        .serialize(&mut rmp_serde::Serializer::new(&mut buf))
        .unwrap();

    unwrap!(
        std::fs::write(&filename, buf.as_slice()),
        "Unable to write SCE events to binary file: '{filename}'"
    );
}

pub fn deserialize_sce_events(sample_dir: &Utf8Path) -> Vec<SceEvent> {
    let filename = sample_dir.join(SCE_EVENTS_MESSAGEPACK_FILENAME);
    let buf = unwrap!(
        std::fs::read(&filename),
        "Unable to read SCE event file: '{filename}'"
    );
    unwrap!(
        rmp_serde::from_slice(&buf),
        "Unable to parse SCE event file: '{filename}'"
    )
}

/// Write out a bedgraph track for copy number segments
///
/// Track values are the integer copy number of each decoded segment.
///
pub fn write_segment_bedgraph_file(sample_dir: &Utf8Path, sample_segments: &SampleSegments) {
    let filename = sample_dir.join(SEGMENT_BEDGRAPH_FILENAME);

    info!("Writing bedgraph copy number track to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create bedgraph copy number track file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    let chrom_list = &sample_segments.chrom_list;
    for (chrom_index, chrom_segments) in sample_segments.segments.iter().enumerate() {
        let chrom_label = &chrom_list.data[chrom_index].label;
        for s in chrom_segments.iter() {
            writeln!(
                f,
                "{}\t{}\t{}\t{}",
                chrom_label,
                s.begin_pos(sample_segments.bin_size),
                s.end_pos(sample_segments.bin_size),
                s.state.multiplier() as u32,
            )
            .unwrap();
        }
    }
}

/// Write SCE events out as a bed track
///
/// The name column carries the sample id, the score column the supporting read
/// count from refinement.
///
pub fn write_sce_events_bed_file(
    sample_dir: &Utf8Path,
    chrom_list: &ChromList,
    sample_id: &str,
    sce_events: &[SceEvent],
) {
    let filename = sample_dir.join(SCE_EVENTS_BED_FILENAME);

    info!("Writing SCE event track to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create SCE event track file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    for event in sce_events.iter() {
        let chrom_label = &chrom_list.data[event.chrom_index].label;
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            chrom_label, event.range.start, event.range.end, sample_id, event.supporting_reads,
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Segment;
    use crate::hmm::CopyNumberState;
    use crate::int_range::IntRange;

    fn test_chrom_list() -> ChromList {
        let mut chrom_list = ChromList::default();
        chrom_list.add_chrom("chr1", 100_000);
        chrom_list
    }

    #[test]
    fn test_sample_segments_round_trip() {
        use CopyNumberState::*;
        let sample_segments = SampleSegments {
            sample_id: "s1".to_string(),
            bin_size: 1000,
            chrom_list: test_chrom_list(),
            segments: vec![vec![
                Segment {
                    begin_bin: 0,
                    end_bin: 60,
                    state: Disomy,
                    mean_count: 49.5,
                },
                Segment {
                    begin_bin: 60,
                    end_bin: 100,
                    state: Trisomy,
                    mean_count: 75.25,
                },
            ]],
        };

        let dir = tempfile::tempdir().unwrap();
        let dir_path = Utf8Path::from_path(dir.path()).unwrap();

        serialize_sample_segments(dir_path, &sample_segments);
        let recovered = deserialize_sample_segments(dir_path);

        assert_eq!(recovered.sample_id, "s1");
        assert_eq!(recovered.chrom_list.label_to_index["chr1"], 0);
        assert_eq!(recovered.segments[0].len(), 2);
        assert_eq!(recovered.segments[0][1].state, Trisomy);
        approx::assert_ulps_eq!(recovered.segments[0][0].mean_count, 49.5);
    }

    #[test]
    fn test_sce_events_round_trip() {
        let events = vec![SceEvent {
            chrom_index: 0,
            range: IntRange::from_pair(40_000, 42_000),
            bin_range: IntRange::from_pair(40, 42),
            resolution: 2000,
            supporting_reads: 61,
        }];

        let dir = tempfile::tempdir().unwrap();
        let dir_path = Utf8Path::from_path(dir.path()).unwrap();

        serialize_sce_events(dir_path, &events);
        let recovered = deserialize_sce_events(dir_path);

        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].range, events[0].range);
        assert_eq!(recovered[0].supporting_reads, 61);
    }
}
