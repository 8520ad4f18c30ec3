//! Recurrent breakpoint hotspot detection over pooled SCE events
//!
//! Event midpoints from all samples are smoothed into a per-chromosome density
//! with a Gaussian kernel, then compared against a permutation null built by
//! re-placing the same number of events uniformly across the genome. Runs of
//! grid points above the null quantile threshold become hotspot regions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bivariate::SceEvent;
use crate::chrom_list::ChromList;
use crate::int_range::IntRange;

/// Seed for the permutation null, fixed so repeated runs give identical calls
const HOTSPOT_NULL_SEED: u64 = 0x5ce;

const NULL_PERMUTATION_COUNT: usize = 499;

/// Grid spacing as a fraction of the kernel bandwidth
const GRID_STEP_FRACTION: f64 = 0.25;

/// A region where breakpoints recur across samples more often than chance
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Hotspot {
    pub chrom_index: usize,
    pub range: IntRange,

    /// Pooled events whose midpoint falls in the region
    pub event_count: usize,

    /// Empirical p-value of the region's peak density under the null
    pub pvalue: f64,
}

/// Per-chromosome kernel density evaluated at grid positions step/2, 3*step/2, ..
fn get_kernel_density(
    midpoints: &[Vec<i64>],
    chrom_list: &ChromList,
    bandwidth: f64,
    step: i64,
) -> Vec<Vec<f64>> {
    let norm = 1.0 / (bandwidth * (2.0 * std::f64::consts::PI).sqrt());

    chrom_list
        .data
        .iter()
        .enumerate()
        .map(|(chrom_index, chrom_info)| {
            let grid_size = chrom_info.length.div_ceil(step as u64) as usize;
            let chrom_midpoints = &midpoints[chrom_index];
            (0..grid_size)
                .map(|grid_index| {
                    let grid_pos = (grid_index as i64 * step + step / 2) as f64;
                    chrom_midpoints
                        .iter()
                        .map(|&midpoint| {
                            let z = (grid_pos - midpoint as f64) / bandwidth;
                            norm * (-0.5 * z * z).exp()
                        })
                        .sum()
                })
                .collect()
        })
        .collect()
}

/// Group observed event midpoints per chromosome
fn get_event_midpoints(events: &[SceEvent], chrom_count: usize) -> Vec<Vec<i64>> {
    let mut midpoints = vec![Vec::new(); chrom_count];
    for event in events {
        assert!(event.chrom_index < chrom_count);
        midpoints[event.chrom_index].push(event.range.center());
    }
    midpoints
}

/// Draw one null placement of `event_count` midpoints, uniform over the genome
///
/// Chromosomes are weighted by length so the null matches the observed event
/// density per base.
///
fn get_null_midpoints(
    event_count: usize,
    chrom_list: &ChromList,
    rng: &mut StdRng,
) -> Vec<Vec<i64>> {
    let genome_size: u64 = chrom_list.data.iter().map(|x| x.length).sum();
    let mut midpoints = vec![Vec::new(); chrom_list.data.len()];

    for _ in 0..event_count {
        let mut genome_pos = rng.gen_range(0..genome_size);
        for (chrom_index, chrom_info) in chrom_list.data.iter().enumerate() {
            if genome_pos < chrom_info.length {
                midpoints[chrom_index].push(genome_pos as i64);
                break;
            }
            genome_pos -= chrom_info.length;
        }
    }
    midpoints
}

/// Density value at the `quantile` rank of the pooled null grid values
fn get_null_threshold(
    event_count: usize,
    chrom_list: &ChromList,
    bandwidth: f64,
    step: i64,
    quantile: f64,
) -> (f64, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(HOTSPOT_NULL_SEED);
    let mut null_values = Vec::new();

    for _ in 0..NULL_PERMUTATION_COUNT {
        let midpoints = get_null_midpoints(event_count, chrom_list, &mut rng);
        let grid = get_kernel_density(&midpoints, chrom_list, bandwidth, step);
        for chrom_values in grid {
            null_values.extend(chrom_values);
        }
    }

    null_values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = ((null_values.len() as f64 * quantile) as usize).min(null_values.len() - 1);
    (null_values[rank], null_values)
}

/// Empirical p-value of a peak density against the pooled null values
///
/// `sorted_null` must be in ascending order.
///
fn get_peak_pvalue(peak_density: f64, sorted_null: &[f64]) -> f64 {
    let below = sorted_null.partition_point(|&x| x < peak_density);
    let at_or_above = sorted_null.len() - below;
    (1 + at_or_above) as f64 / (1 + sorted_null.len()) as f64
}

/// Call breakpoint hotspots from the pooled SCE events of all samples
///
/// `pvalue_threshold` sets the null density quantile above which grid points
/// count as hot. Returns hotspots ordered by chromosome, then position.
///
pub fn detect_hotspots(
    events: &[SceEvent],
    chrom_list: &ChromList,
    bandwidth: f64,
    pvalue_threshold: f64,
) -> Vec<Hotspot> {
    if events.is_empty() {
        return Vec::new();
    }

    let step = ((bandwidth * GRID_STEP_FRACTION) as i64).max(1);
    let midpoints = get_event_midpoints(events, chrom_list.data.len());
    let observed = get_kernel_density(&midpoints, chrom_list, bandwidth, step);

    let (threshold, sorted_null) = get_null_threshold(
        events.len(),
        chrom_list,
        bandwidth,
        step,
        1.0 - pvalue_threshold,
    );

    let mut hotspots = Vec::new();
    for (chrom_index, chrom_values) in observed.iter().enumerate() {
        let chrom_length = chrom_list.data[chrom_index].length as i64;
        let mut run_start: Option<usize> = None;

        for grid_index in 0..=chrom_values.len() {
            let is_hot =
                grid_index < chrom_values.len() && chrom_values[grid_index] > threshold;
            match (run_start, is_hot) {
                (None, true) => {
                    run_start = Some(grid_index);
                }
                (Some(start), false) => {
                    let range = IntRange::from_pair(
                        start as i64 * step,
                        std::cmp::min(grid_index as i64 * step, chrom_length),
                    );
                    let event_count = events
                        .iter()
                        .filter(|x| {
                            x.chrom_index == chrom_index && range.intersect_range(&x.range)
                        })
                        .count();
                    let peak_density = chrom_values[start..grid_index]
                        .iter()
                        .cloned()
                        .fold(f64::MIN, f64::max);
                    hotspots.push(Hotspot {
                        chrom_index,
                        range,
                        event_count,
                        pvalue: get_peak_pvalue(peak_density, &sorted_null),
                    });
                    run_start = None;
                }
                _ => {}
            }
        }
    }

    hotspots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_chrom_list() -> ChromList {
        let mut chrom_list = ChromList::default();
        chrom_list.add_chrom("chr1", 10_000_000);
        chrom_list.add_chrom("chr2", 6_000_000);
        chrom_list
    }

    fn test_event(chrom_index: usize, pos: i64) -> SceEvent {
        SceEvent {
            chrom_index,
            range: IntRange::from_pair(pos - 500, pos + 500),
            bin_range: IntRange::from_pair(0, 2),
            resolution: 1000,
            supporting_reads: 0,
        }
    }

    #[test]
    fn test_no_events_no_hotspots() {
        let hotspots = detect_hotspots(&[], &test_chrom_list(), 1e6, 0.05);
        assert!(hotspots.is_empty());
    }

    #[test]
    fn test_coincident_events_give_one_hotspot() {
        // 40 events stacked at one position against a 16Mb genome
        let events = (0..40).map(|_| test_event(0, 3_000_000)).collect::<Vec<_>>();

        let hotspots = detect_hotspots(&events, &test_chrom_list(), 1e5, 0.05);
        assert_eq!(hotspots.len(), 1);

        let hotspot = &hotspots[0];
        assert_eq!(hotspot.chrom_index, 0);
        assert!(hotspot.range.intersect_pos(3_000_000));
        assert_eq!(hotspot.event_count, 40);
        assert!(hotspot.pvalue < 0.05);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let mut events = Vec::new();
        for sample_shift in 0..5 {
            events.push(test_event(0, 2_000_000 + sample_shift * 10_000));
            events.push(test_event(1, 4_500_000 + sample_shift * 20_000));
        }

        let first = detect_hotspots(&events, &test_chrom_list(), 1e6, 0.05);
        let second = detect_hotspots(&events, &test_chrom_list(), 1e6, 0.05);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chrom_index, b.chrom_index);
            assert_eq!(a.range, b.range);
            assert_eq!(a.event_count, b.event_count);
            approx::assert_ulps_eq!(a.pvalue, b.pvalue);
        }
    }
}
