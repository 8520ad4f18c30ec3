//! Breakpoint sharpening for candidate sister chromatid exchanges
//!
//! Candidates come out of the joint strand path at bin resolution. When
//! read-level fragment data is available the breakpoint is relocalized by
//! scanning split positions at successively finer resolution levels, keeping
//! the split that best separates the local reads into two strand-consistent
//! groups.

use serde::{Deserialize, Serialize};

use crate::bivariate::{SceCandidate, SceEvent};
use crate::int_range::IntRange;

/// One read-level observation near a candidate breakpoint
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Fragment {
    pub pos: i64,
    pub is_watson: bool,
}

/// The bin-resolution breakpoint interval of a candidate
///
/// The exchange sits between bin_index-1 and bin_index, so the supporting
/// interval covers those two bins.
///
fn get_candidate_range(candidate: &SceCandidate, bin_size: u32) -> IntRange {
    let boundary = candidate.bin_index as i64 * bin_size as i64;
    IntRange::from_pair(boundary - bin_size as i64, boundary + bin_size as i64)
}

/// Count strand-consistent read support on each side of a split position
///
/// Returns (left_support, right_support) where each side counts only reads
/// matching the strand expected to dominate that side.
///
fn get_split_support(
    fragments: &[Fragment],
    split_pos: i64,
    watson_to_crick: bool,
) -> (usize, usize) {
    let mut left_support = 0;
    let mut right_support = 0;
    for fragment in fragments.iter() {
        let is_left = fragment.pos < split_pos;
        let matches = if is_left == watson_to_crick {
            fragment.is_watson
        } else {
            !fragment.is_watson
        };
        if matches {
            if is_left {
                left_support += 1;
            } else {
                right_support += 1;
            }
        }
    }
    (left_support, right_support)
}

/// Relocalize the breakpoint inside `window` by successive-resolution scanning
///
/// Returns the chosen split position and its per-side support, or None when no
/// level leaves `min_reads` of strand-consistent support on each side.
///
fn scan_resolution_levels(
    fragments: &[Fragment],
    window: &IntRange,
    resolution_levels: &[u32],
    min_reads: usize,
    watson_to_crick: bool,
) -> Option<(i64, usize)> {
    let mut scan_range = window.clone();
    let mut best: Option<(i64, usize)> = None;

    for &level in resolution_levels {
        let step = (level as i64).max(1);

        let mut level_best: Option<(i64, usize, usize)> = None;
        let mut split_pos = scan_range.start;
        while split_pos <= scan_range.end {
            let (left_support, right_support) =
                get_split_support(fragments, split_pos, watson_to_crick);
            let score = left_support + right_support;
            // Strict comparison keeps the lowest position on score ties
            let is_better = match &level_best {
                Some((_, best_score, _)) => score > *best_score,
                None => true,
            };
            if is_better {
                level_best = Some((
                    split_pos,
                    score,
                    std::cmp::min(left_support, right_support),
                ));
            }
            split_pos += step;
        }

        let (best_pos, _, support) = level_best?;
        if support < min_reads {
            return None;
        }

        scan_range = IntRange::from_pair(
            std::cmp::max(best_pos - step, window.start),
            std::cmp::min(best_pos + step, window.end),
        );
        best = Some((best_pos, support));
    }

    best
}

/// Sharpen one SCE candidate into an event, or reject it
///
/// A candidate whose flanking joint-state segments are both narrower than
/// `min_segwidth` bins is dropped silently, such cases are indistinguishable
/// from noise. With no fragment data (or insufficient read support) the
/// original bin-level interval is kept.
///
pub fn refine_sce_candidate(
    candidate: &SceCandidate,
    bin_size: u32,
    resolution_levels: &[u32],
    min_segwidth: u32,
    fragments: Option<&[Fragment]>,
    min_reads: usize,
) -> Option<SceEvent> {
    if candidate.left_flank_bins < min_segwidth as usize
        && candidate.right_flank_bins < min_segwidth as usize
    {
        return None;
    }

    let bin_range = IntRange::from_pair(
        candidate.bin_index as i64 - 1,
        candidate.bin_index as i64 + 1,
    );
    let coarse_range = get_candidate_range(candidate, bin_size);

    let refined = fragments.and_then(|fragments| {
        let local_fragments = fragments
            .iter()
            .filter(|x| coarse_range.intersect_pos(x.pos))
            .copied()
            .collect::<Vec<_>>();
        scan_resolution_levels(
            &local_fragments,
            &coarse_range,
            resolution_levels,
            min_reads,
            candidate.watson_to_crick,
        )
    });

    let event = match refined {
        Some((split_pos, support)) => {
            let finest = *resolution_levels.last().unwrap() as i64;
            let half = (finest / 2).max(1);
            let range = IntRange::from_pair(
                std::cmp::max(split_pos - half, coarse_range.start),
                std::cmp::min(split_pos + half, coarse_range.end),
            );
            SceEvent {
                chrom_index: candidate.chrom_index,
                resolution: range.size() as u32,
                range,
                bin_range,
                supporting_reads: support,
            }
        }
        None => SceEvent {
            chrom_index: candidate.chrom_index,
            resolution: coarse_range.size() as u32,
            range: coarse_range,
            bin_range,
            supporting_reads: 0,
        },
    };

    Some(event)
}
