//! Simulated bin count series for tests
//!

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::hmm::CopyNumberState;
use crate::hmm::emission::MIN_COPY_FRACTION;

/// Inverse-CDF draw from a negative binomial parameterized by mean and dispersion
///
/// Plenty fast for the count magnitudes used in tests.
///
fn sample_nb(mean: f64, dispersion: f64, rng: &mut StdRng) -> u32 {
    use statrs::distribution::{Discrete, NegativeBinomial};

    let p = dispersion / (dispersion + mean);
    let nb = NegativeBinomial::new(dispersion, p).unwrap();

    let target: f64 = rng.r#gen();
    let mut cumulative = 0.0;
    let mut k = 0u64;
    loop {
        cumulative += nb.pmf(k);
        if cumulative >= target || k > 100_000 {
            return k as u32;
        }
        k += 1;
    }
}

/// Generate one chromosome's worth of counts from a known state path
///
/// `segment_spec` lists (true state, bin run length) pairs. Counts for copy
/// number states are drawn from the same tied negative binomial family the
/// fitter assumes; zero-inflation stretches are mostly exact zeros.
///
pub fn simulate_nb_series(
    segment_spec: &[(CopyNumberState, usize)],
    baseline_mean: f64,
    dispersion: f64,
    seed: u64,
) -> Vec<Vec<u32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = Vec::new();

    for &(state, run_length) in segment_spec {
        for _ in 0..run_length {
            let count = if state.is_zero_inflation() {
                if rng.r#gen::<f64>() < 0.95 {
                    0
                } else {
                    sample_nb(baseline_mean * MIN_COPY_FRACTION, dispersion, &mut rng)
                }
            } else {
                let mean = baseline_mean * state.multiplier().max(MIN_COPY_FRACTION);
                sample_nb(mean, dispersion, &mut rng)
            };
            counts.push(count);
        }
    }

    vec![counts]
}

/// Expand a (state, run length) spec into its per-bin true state path
pub fn true_state_path(segment_spec: &[(CopyNumberState, usize)]) -> Vec<CopyNumberState> {
    segment_spec
        .iter()
        .flat_map(|&(state, run_length)| std::iter::repeat_n(state, run_length))
        .collect()
}
