//! Viterbi decoding of a fitted model into copy number segments
//!

use serde::{Deserialize, Serialize};

use crate::chrom_list::ChromList;
use crate::hmm::emission::ln_density;
use crate::hmm::{CopyNumberState, Model};
use crate::int_range::IntRange;

/// A maximal run of consecutive bins sharing one decoded state
///
/// Interval defined by begin_bin,end_bin is zero-indexed, half-closed
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Segment {
    pub begin_bin: usize,
    pub end_bin: usize,
    pub state: CopyNumberState,

    /// Mean observed count over the segment's bins
    pub mean_count: f64,
}

impl Segment {
    pub fn bin_count(&self) -> usize {
        self.end_bin - self.begin_bin
    }

    pub fn begin_pos(&self, bin_size: u32) -> i64 {
        (self.begin_bin * bin_size as usize) as i64
    }

    pub fn end_pos(&self, bin_size: u32) -> i64 {
        (self.end_bin * bin_size as usize) as i64
    }

    pub fn to_range(&self, bin_size: u32) -> IntRange {
        IntRange::from_pair(self.begin_pos(bin_size), self.end_pos(bin_size))
    }
}

/// Genome copy-number segments for one sample
#[derive(Clone, Deserialize, Serialize)]
pub struct SampleSegments {
    pub sample_id: String,
    pub bin_size: u32,
    pub chrom_list: ChromList,

    /// Segments indexed on chromosome, then listed in order for each chromosome
    pub segments: Vec<Vec<Segment>>,
}

fn max_index<T: std::cmp::PartialOrd>(x: &[T]) -> usize {
    assert!(!x.is_empty());
    let mut mi = 0;
    for i in 1..x.len() {
        if x[i] > x[mi] {
            mi = i;
        }
    }
    mi
}

/// Backtrace to get viterbi parse
fn get_backtrace(last_row: &[f64], back_pointer: &[Vec<u8>]) -> Vec<u8> {
    let mut max_state = max_index(last_row);

    let obs_count = back_pointer.len();
    let mut max_path: Vec<u8> = vec![0; obs_count];
    for obs_index in (0..obs_count).rev() {
        max_path[obs_index] = max_state as u8;
        max_state = back_pointer[obs_index][max_state] as usize;
    }
    max_path
}

/// A Viterbi parse for the states of a single chromosome
///
/// All prob values are tracked in log space. Arg-max ties anywhere in the parse
/// resolve to the lowest state index in the model's declared state order, so
/// repeated decodes of the same fit are reproducible.
///
/// Returns the most probable per-bin state path
///
#[allow(clippy::needless_range_loop)]
pub fn viterbi_state_path(model: &Model, observations: &[u32]) -> Vec<u8> {
    let obs_count = observations.len();
    if obs_count == 0 {
        return Vec::new();
    }

    let state_count = model.state_count();
    let transition_lnprob = model
        .transition_matrix
        .iter()
        .map(|row| row.iter().map(|x| x.ln()).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let emit_lnprob = |state_index: usize, obs: u32| {
        ln_density(
            model.states[state_index],
            &model.emission_params[state_index],
            obs,
        )
    };

    // Instead of having a full SxO DP matrix, just ping-pong on two rows
    let mut max_pr_row1 = vec![0.0; state_count];
    let mut max_pr_row2 = vec![0.0; state_count];

    let mut back_pointer = vec![vec![0u8; state_count]; obs_count];

    for state_index in 0..state_count {
        max_pr_row1[state_index] =
            model.init_probs[state_index].ln() + emit_lnprob(state_index, observations[0]);
    }

    let this_row = &mut max_pr_row1;
    let last_row = &mut max_pr_row2;
    for obs_index in 1..obs_count {
        std::mem::swap(this_row, last_row);
        for (to_state_index, row_value) in this_row.iter_mut().enumerate() {
            let emit = emit_lnprob(to_state_index, observations[obs_index]);

            let mut max_from = 0;
            let mut max_lnprob = 0.0;
            for from_state_index in 0..state_count {
                let lnprob = last_row[from_state_index]
                    + transition_lnprob[from_state_index][to_state_index]
                    + emit;
                if (from_state_index == 0) || (lnprob > max_lnprob) {
                    max_from = from_state_index;
                    max_lnprob = lnprob;
                }
            }

            *row_value = max_lnprob;
            back_pointer[obs_index][to_state_index] = max_from as u8;
        }
    }

    get_backtrace(this_row, &back_pointer)
}

/// Translate the most likely state path into segments for one chromosome
///
fn get_chrom_segments(
    model: &Model,
    observations: &[u32],
    max_state_path: &[u8],
) -> Vec<Segment> {
    let mut chrom_segments: Vec<Segment> = Vec::new();

    if max_state_path.is_empty() {
        return chrom_segments;
    }

    let mut begin_bin: usize = 0;
    let chrom_segments_ref = &mut chrom_segments;

    let mut add_segment = |last_state_index: u8, end_bin: usize| {
        assert!(end_bin > begin_bin);
        let count_total: u64 = observations[begin_bin..end_bin]
            .iter()
            .map(|&x| x as u64)
            .sum();
        chrom_segments_ref.push(Segment {
            begin_bin,
            end_bin,
            state: model.states[last_state_index as usize],
            mean_count: count_total as f64 / (end_bin - begin_bin) as f64,
        });
        begin_bin = end_bin;
    };

    let mut last_state_index = 0u8;
    for (bin_index, &bin_value) in max_state_path.iter().enumerate() {
        if (bin_index > 0) && (bin_value != last_state_index) {
            add_segment(last_state_index, bin_index);
        }
        last_state_index = bin_value;
    }

    let bin_count = max_state_path.len();
    add_segment(last_state_index, bin_count);

    chrom_segments
}

/// Decode a fitted model into segments over all chromosomes
///
/// An empty observation sequence yields an empty segment sequence.
///
pub fn decode(model: &Model, series: &[Vec<u32>]) -> Vec<Vec<Segment>> {
    series
        .iter()
        .map(|chrom_observations| {
            let max_state_path = viterbi_state_path(model, chrom_observations);
            get_chrom_segments(model, chrom_observations, &max_state_path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::fitter::fit;
    use crate::hmm::{CopyNumberState, FitBudget};
    use crate::sim_counts::{simulate_nb_series, true_state_path};

    fn test_model(series: &[Vec<u32>]) -> Model {
        use CopyNumberState::*;
        fit(
            "s1",
            series,
            &[ZeroInflation, Monosomy, Disomy, Trisomy, Tetrasomy, Multisomy],
            Disomy,
            &FitBudget {
                eps: 0.1,
                max_iter: 300,
                max_time: None,
            },
            3,
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_decode_empty_observations() {
        use CopyNumberState::*;
        let spec = &[(Disomy, 300), (Trisomy, 100), (Disomy, 300)];
        let series = simulate_nb_series(spec, 50.0, 20.0, 3);
        let model = test_model(&series);

        let segments = decode(&model, &[Vec::new()]);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_empty());
    }

    #[test]
    fn test_segments_tile_chromosome() {
        use CopyNumberState::*;
        let spec = &[
            (Disomy, 500),
            (Trisomy, 120),
            (Disomy, 400),
            (Monosomy, 100),
            (Disomy, 300),
        ];
        let series = simulate_nb_series(spec, 50.0, 20.0, 3);
        let model = test_model(&series);
        let segments = decode(&model, &series);

        let chrom_segments = &segments[0];
        assert!(!chrom_segments.is_empty());
        assert_eq!(chrom_segments[0].begin_bin, 0);
        assert_eq!(chrom_segments.last().unwrap().end_bin, series[0].len());
        for pair in chrom_segments.windows(2) {
            assert_eq!(pair[0].end_bin, pair[1].begin_bin);
            assert_ne!(pair[0].state, pair[1].state);
        }
    }

    #[test]
    fn test_decode_recovers_simulated_path() {
        use CopyNumberState::*;
        let spec = &[
            (Disomy, 500),
            (Trisomy, 150),
            (Disomy, 400),
            (Monosomy, 120),
            (Disomy, 300),
        ];
        let series = simulate_nb_series(spec, 50.0, 20.0, 3);
        let model = test_model(&series);

        let path = viterbi_state_path(&model, &series[0]);
        let truth = true_state_path(spec);

        let mismatches = path
            .iter()
            .zip(truth.iter())
            .filter(|&(&decoded, &expected)| model.states[decoded as usize] != expected)
            .count();

        // Boundary bins may wobble, the bulk of the path must match
        assert!(
            (mismatches as f64) < 0.01 * truth.len() as f64,
            "{mismatches} mismatched bins"
        );
    }

    #[test]
    fn test_segment_mean_count() {
        use CopyNumberState::*;
        let spec = &[(Disomy, 400)];
        let series = simulate_nb_series(spec, 50.0, 20.0, 9);
        let model = test_model(&series);
        let segments = decode(&model, &series);

        let expected: f64 = series[0].iter().map(|&x| x as f64).sum::<f64>() / 400.0;
        let total_bins: usize = segments[0].iter().map(|s| s.bin_count()).sum();
        assert_eq!(total_bins, 400);

        let weighted: f64 = segments[0]
            .iter()
            .map(|s| s.mean_count * s.bin_count() as f64)
            .sum::<f64>()
            / 400.0;
        approx::assert_relative_eq!(weighted, expected, max_relative = 1e-9);
    }
}
