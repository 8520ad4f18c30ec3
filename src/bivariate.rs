//! Joint strand-state path construction for strand-seq samples
//!
//! The watson and crick count series are fitted as two independent univariate
//! models over the same state set; their decoded paths are combined into a
//! joint state alphabet that is the Cartesian product of the per-strand
//! states. Candidate sister chromatid exchanges appear wherever the joint
//! state change flips the sign of strand dominance.

use serde::{Deserialize, Serialize};

use crate::decode::viterbi_state_path;
use crate::hmm::{CopyNumberState, Model};
use crate::int_range::IntRange;

/// Per-bin state over the product alphabet of the two strand models
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JointState {
    pub watson: CopyNumberState,
    pub crick: CopyNumberState,
}

impl JointState {
    /// Sign of the count balance between the two strands
    ///
    /// Positive when the watson strand dominates, negative for crick, zero when
    /// the strands carry equal copy number.
    ///
    pub fn dominance(&self) -> i8 {
        let delta = self.watson.multiplier() - self.crick.multiplier();
        if delta > 0.0 {
            1
        } else if delta < 0.0 {
            -1
        } else {
            0
        }
    }
}

/// A bin-resolution SCE breakpoint candidate
///
/// `bin_index` is the first bin after the dominance flip. Flank widths record
/// the run of stable joint state on each side, for the refiner's
/// minimum-segment-width check.
///
#[derive(Clone, Debug)]
pub struct SceCandidate {
    pub chrom_index: usize,
    pub bin_index: usize,

    /// True when dominance flips from watson to crick
    pub watson_to_crick: bool,

    pub left_flank_bins: usize,
    pub right_flank_bins: usize,
}

/// A detected sister chromatid exchange for one sample
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SceEvent {
    pub chrom_index: usize,

    /// Breakpoint interval in genome coordinates, after any refinement
    pub range: IntRange,

    /// Bins supporting the event call
    pub bin_range: IntRange,

    /// Width of the localized breakpoint interval in bases
    pub resolution: u32,

    /// Read support from the refinement scan, zero if the event was never refined
    pub supporting_reads: usize,
}

/// Decode both strand models into the joint per-bin state path of one chromosome
pub fn get_chrom_joint_path(
    watson_model: &Model,
    crick_model: &Model,
    watson_observations: &[u32],
    crick_observations: &[u32],
) -> Vec<JointState> {
    assert_eq!(watson_observations.len(), crick_observations.len());

    let watson_path = viterbi_state_path(watson_model, watson_observations);
    let crick_path = viterbi_state_path(crick_model, crick_observations);

    watson_path
        .iter()
        .zip(crick_path.iter())
        .map(|(&w, &c)| JointState {
            watson: watson_model.states[w as usize],
            crick: crick_model.states[c as usize],
        })
        .collect()
}

/// Scan one chromosome's joint path for strand-dominance flips
///
/// Only strict sign flips qualify; a change into or out of balanced dominance
/// is a copy number event on one strand, not an exchange.
///
pub fn find_sce_candidates(chrom_index: usize, joint_path: &[JointState]) -> Vec<SceCandidate> {
    let mut candidates = Vec::new();

    let mut flip_bins = Vec::new();
    for bin_index in 1..joint_path.len() {
        let prev = joint_path[bin_index - 1].dominance();
        let curr = joint_path[bin_index].dominance();
        if prev * curr == -1 {
            flip_bins.push(bin_index);
        }
    }

    for (flip_index, &bin_index) in flip_bins.iter().enumerate() {
        let left_boundary = if flip_index == 0 {
            0
        } else {
            flip_bins[flip_index - 1]
        };
        let right_boundary = if flip_index + 1 < flip_bins.len() {
            flip_bins[flip_index + 1]
        } else {
            joint_path.len()
        };

        candidates.push(SceCandidate {
            chrom_index,
            bin_index,
            watson_to_crick: joint_path[bin_index - 1].dominance() > 0,
            left_flank_bins: bin_index - left_boundary,
            right_flank_bins: right_boundary - bin_index,
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use CopyNumberState::*;

    fn joint(watson: CopyNumberState, crick: CopyNumberState) -> JointState {
        JointState { watson, crick }
    }

    #[test]
    fn test_dominance() {
        assert_eq!(joint(Disomy, ZeroInflation).dominance(), 1);
        assert_eq!(joint(ZeroInflation, Disomy).dominance(), -1);
        assert_eq!(joint(Monosomy, Monosomy).dominance(), 0);
        assert_eq!(joint(ZeroInflation, Nullsomy).dominance(), 0);
    }

    #[test]
    fn test_find_sce_candidates() {
        // Watson-dominant for 4 bins, crick-dominant for 3, watson again for 3
        let mut path = Vec::new();
        path.extend(std::iter::repeat_n(joint(Disomy, ZeroInflation), 4));
        path.extend(std::iter::repeat_n(joint(ZeroInflation, Disomy), 3));
        path.extend(std::iter::repeat_n(joint(Disomy, ZeroInflation), 3));

        let candidates = find_sce_candidates(0, &path);
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].bin_index, 4);
        assert!(candidates[0].watson_to_crick);
        assert_eq!(candidates[0].left_flank_bins, 4);
        assert_eq!(candidates[0].right_flank_bins, 3);

        assert_eq!(candidates[1].bin_index, 7);
        assert!(!candidates[1].watson_to_crick);
        assert_eq!(candidates[1].left_flank_bins, 3);
        assert_eq!(candidates[1].right_flank_bins, 3);
    }

    #[test]
    fn test_balanced_transitions_are_not_exchanges() {
        // Dominance goes +1 -> 0 -> -1 with no strict flip anywhere
        let mut path = Vec::new();
        path.extend(std::iter::repeat_n(joint(Disomy, Monosomy), 3));
        path.extend(std::iter::repeat_n(joint(Disomy, Disomy), 3));
        path.extend(std::iter::repeat_n(joint(Monosomy, Disomy), 3));

        let candidates = find_sce_candidates(0, &path);
        assert!(candidates.is_empty());
    }
}
