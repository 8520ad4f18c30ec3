//! Cross-sample consensus template and copy-number clustering
//!
//! All samples' segment boundaries are unioned into one disjoint genome
//! partition, each sample is re-expressed as a state vector over that
//! partition, and samples are grouped by average-linkage hierarchical
//! clustering on a width-weighted correlation distance.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::decode::SampleSegments;
use crate::int_range::IntRange;

/// One cell of the disjoint genome partition shared by all samples
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TemplateInterval {
    pub chrom_index: usize,
    pub range: IntRange,
}

/// The shared partition plus each sample's state vector over it
#[derive(Debug, Deserialize, Serialize)]
pub struct ConsensusTemplate {
    pub intervals: Vec<TemplateInterval>,

    /// Per sample (input order), per interval: copy number state index, or
    /// None where the sample has no segment covering the interval
    pub state_matrix: Vec<Vec<Option<u8>>>,

    /// Mean state index over the samples with data, per interval
    pub mean_state: Vec<f64>,
}

/// One merge step of the cluster dendrogram
///
/// Cluster ids 0..sample_count are leaves; each merge creates the next id.
///
#[derive(Debug, Deserialize, Serialize)]
pub struct ClusterMerge {
    pub first: usize,
    pub second: usize,
    pub distance: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ConsensusResult {
    pub template: ConsensusTemplate,

    /// All sample ids in input order, aligned with the template state matrix
    pub sample_ids: Vec<String>,

    /// Pairwise distances between clustered samples, indexed in input order
    /// restricted to samples with at least one segment; empty when clustering
    /// is disabled
    pub distance_matrix: Vec<Vec<f64>>,

    pub merges: Vec<ClusterMerge>,

    /// Sample ids in dendrogram leaf order, with samples with no segments
    /// following at the end in input order; plain input order when clustering
    /// is disabled
    pub ordered_sample_ids: Vec<String>,
}

/// Union all samples' segment boundaries into a disjoint partition
fn get_template_intervals(samples: &[SampleSegments]) -> Vec<TemplateInterval> {
    let chrom_count = samples
        .iter()
        .map(|x| x.segments.len())
        .max()
        .unwrap_or(0);

    let mut intervals = Vec::new();
    for chrom_index in 0..chrom_count {
        let boundaries = samples
            .iter()
            .filter(|sample| chrom_index < sample.segments.len())
            .flat_map(|sample| {
                sample.segments[chrom_index]
                    .iter()
                    .flat_map(|segment| {
                        [
                            segment.begin_pos(sample.bin_size),
                            segment.end_pos(sample.bin_size),
                        ]
                    })
            })
            .sorted()
            .dedup()
            .collect::<Vec<_>>();

        for pair in boundaries.windows(2) {
            intervals.push(TemplateInterval {
                chrom_index,
                range: IntRange::from_pair(pair[0], pair[1]),
            });
        }
    }
    intervals
}

/// Express one sample as a state-index vector over the template partition
fn get_sample_state_vector(
    sample: &SampleSegments,
    intervals: &[TemplateInterval],
) -> Vec<Option<u8>> {
    intervals
        .iter()
        .map(|interval| {
            if interval.chrom_index >= sample.segments.len() {
                return None;
            }
            sample.segments[interval.chrom_index]
                .iter()
                .find(|segment| {
                    segment
                        .to_range(sample.bin_size)
                        .intersect_pos(interval.range.start)
                })
                .map(|segment| segment.state as u8)
        })
        .collect()
}

/// Width-weighted Pearson correlation distance between two state vectors
///
/// Only intervals where both samples have a state contribute. Constant vectors
/// have no defined correlation; identical constants give distance 0, anything
/// else distance 1.
///
pub fn get_state_vector_distance(
    x: &[Option<u8>],
    y: &[Option<u8>],
    widths: &[f64],
) -> f64 {
    let mut weight_sum = 0.0;
    let mut x_sum = 0.0;
    let mut y_sum = 0.0;
    for index in 0..x.len() {
        if let (Some(xs), Some(ys)) = (x[index], y[index]) {
            weight_sum += widths[index];
            x_sum += widths[index] * xs as f64;
            y_sum += widths[index] * ys as f64;
        }
    }
    if weight_sum <= 0.0 {
        return 1.0;
    }

    let x_mean = x_sum / weight_sum;
    let y_mean = y_sum / weight_sum;

    let mut covar = 0.0;
    let mut x_var = 0.0;
    let mut y_var = 0.0;
    for index in 0..x.len() {
        if let (Some(xs), Some(ys)) = (x[index], y[index]) {
            let dx = xs as f64 - x_mean;
            let dy = ys as f64 - y_mean;
            covar += widths[index] * dx * dy;
            x_var += widths[index] * dx * dx;
            y_var += widths[index] * dy * dy;
        }
    }

    if x_var <= 0.0 || y_var <= 0.0 {
        let x_matches_y = (0..x.len()).all(|i| x[i] == y[i]);
        return if x_matches_y { 0.0 } else { 1.0 };
    }

    1.0 - covar / (x_var.sqrt() * y_var.sqrt())
}

/// Average-linkage agglomeration over a precomputed distance matrix
///
/// Ties on the minimum distance resolve to the lowest cluster id pair, so the
/// dendrogram is reproducible for any input order.
///
fn get_cluster_merges(distance_matrix: &[Vec<f64>]) -> Vec<ClusterMerge> {
    let leaf_count = distance_matrix.len();

    // Active cluster id -> (member leaves, id)
    let mut clusters: Vec<(Vec<usize>, usize)> =
        (0..leaf_count).map(|i| (vec![i], i)).collect();
    let mut next_id = leaf_count;
    let mut merges = Vec::new();

    let cluster_distance = |a: &[usize], b: &[usize]| -> f64 {
        let mut total = 0.0;
        for &i in a {
            for &j in b {
                total += distance_matrix[i][j];
            }
        }
        total / (a.len() * b.len()) as f64
    };

    while clusters.len() > 1 {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let distance = cluster_distance(&clusters[a].0, &clusters[b].0);
                let is_better = match best {
                    Some((_, _, best_distance)) => distance < best_distance,
                    None => true,
                };
                if is_better {
                    best = Some((a, b, distance));
                }
            }
        }

        let (a, b, distance) = best.unwrap();
        merges.push(ClusterMerge {
            first: clusters[a].1,
            second: clusters[b].1,
            distance,
        });

        let (mut members, _) = clusters.remove(b);
        members.append(&mut clusters[a].0);
        members.sort();
        clusters[a] = (members, next_id);
        next_id += 1;
    }

    merges
}

/// Expand the dendrogram into its leaf visiting order
fn get_leaf_order(merges: &[ClusterMerge], leaf_count: usize) -> Vec<usize> {
    if leaf_count == 0 {
        return Vec::new();
    }
    if merges.is_empty() {
        return (0..leaf_count).collect();
    }

    fn expand(id: usize, leaf_count: usize, merges: &[ClusterMerge], out: &mut Vec<usize>) {
        if id < leaf_count {
            out.push(id);
        } else {
            let merge = &merges[id - leaf_count];
            expand(merge.first, leaf_count, merges, out);
            expand(merge.second, leaf_count, merges, out);
        }
    }

    let mut order = Vec::new();
    let root_id = leaf_count + merges.len() - 1;
    expand(root_id, leaf_count, merges, &mut order);
    order
}

/// Build the consensus template and cluster the samples over it
///
/// The template partition and state matrix are always built. When `cluster` is
/// false the distance matrix and dendrogram are skipped and samples keep their
/// input order. Samples with no segments at all are left out of the distance
/// matrix and the dendrogram, but still appear in the template state matrix
/// and at the end of the ordered id list.
///
pub fn get_consensus(samples: &[SampleSegments], cluster: bool) -> ConsensusResult {
    let intervals = get_template_intervals(samples);
    let widths = intervals
        .iter()
        .map(|x| x.range.size() as f64)
        .collect::<Vec<_>>();

    let state_matrix = samples
        .iter()
        .map(|sample| get_sample_state_vector(sample, &intervals))
        .collect::<Vec<_>>();

    let mean_state = (0..intervals.len())
        .map(|interval_index| {
            let states = state_matrix
                .iter()
                .filter_map(|row| row[interval_index])
                .collect::<Vec<_>>();
            if states.is_empty() {
                f64::NAN
            } else {
                states.iter().map(|&x| x as f64).sum::<f64>() / states.len() as f64
            }
        })
        .collect();

    let sample_ids = samples
        .iter()
        .map(|x| x.sample_id.clone())
        .collect::<Vec<_>>();

    if !cluster {
        return ConsensusResult {
            template: ConsensusTemplate {
                intervals,
                state_matrix,
                mean_state,
            },
            ordered_sample_ids: sample_ids.clone(),
            sample_ids,
            distance_matrix: Vec::new(),
            merges: Vec::new(),
        };
    }

    let clustered_samples = (0..samples.len())
        .filter(|&i| samples[i].segments.iter().any(|x| !x.is_empty()))
        .collect::<Vec<_>>();

    let distance_matrix = clustered_samples
        .iter()
        .map(|&i| {
            clustered_samples
                .iter()
                .map(|&j| {
                    get_state_vector_distance(&state_matrix[i], &state_matrix[j], &widths)
                })
                .collect()
        })
        .collect::<Vec<Vec<f64>>>();

    let merges = get_cluster_merges(&distance_matrix);
    let leaf_order = get_leaf_order(&merges, clustered_samples.len());

    let mut ordered_sample_ids = leaf_order
        .iter()
        .map(|&leaf| samples[clustered_samples[leaf]].sample_id.clone())
        .collect::<Vec<_>>();
    for (sample_index, sample) in samples.iter().enumerate() {
        if !clustered_samples.contains(&sample_index) {
            ordered_sample_ids.push(sample.sample_id.clone());
        }
    }

    ConsensusResult {
        template: ConsensusTemplate {
            intervals,
            state_matrix,
            mean_state,
        },
        sample_ids,
        distance_matrix,
        merges,
        ordered_sample_ids,
    }
}
