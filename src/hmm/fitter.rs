//! Multi-restart Baum-Welch fitter for the copy number HMM
//!
//! Each trial starts from randomized initial parameters and alternates scaled
//! forward-backward posterior computation with closed-form (or
//! method-of-moments) parameter re-estimation, until the log-likelihood
//! improvement drops below eps or an iteration/time budget runs out. The best
//! trial by log-likelihood is returned; ties go to the lowest trial index.

use std::time::{Duration, Instant};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simple_error::{SimpleResult, bail};

use super::emission::SharedEmission;
use super::{CopyNumberState, FitBudget, Model};

/// Dispersion is clamped into this range; the upper bound degrades gracefully
/// to Poisson-like behavior.
const MIN_DISPERSION: f64 = 0.1;
const MAX_DISPERSION: f64 = 1e6;

const MIN_ZERO_MASS: f64 = 1e-4;
const MAX_ZERO_MASS: f64 = 1.0 - 1e-4;

/// Model parameters updated across EM iterations of one trial
#[derive(Clone)]
struct TrialParams {
    transition_matrix: Vec<Vec<f64>>,
    init_probs: Vec<f64>,
    shared: SharedEmission,
}

/// Expected sufficient statistics accumulated over all chromosomes in one E-step
struct SufficientStats {
    loglik: f64,
    gamma_sum: Vec<f64>,
    gamma_obs_sum: Vec<f64>,
    gamma_obs2_sum: Vec<f64>,
    gamma_zero_sum: Vec<f64>,
    xi_sum: Vec<Vec<f64>>,
    init_gamma: Vec<f64>,
}

impl SufficientStats {
    fn new(state_count: usize) -> Self {
        Self {
            loglik: 0.0,
            gamma_sum: vec![0.0; state_count],
            gamma_obs_sum: vec![0.0; state_count],
            gamma_obs2_sum: vec![0.0; state_count],
            gamma_zero_sum: vec![0.0; state_count],
            xi_sum: vec![vec![0.0; state_count]; state_count],
            init_gamma: vec![0.0; state_count],
        }
    }
}

pub(crate) struct TrialFit {
    params: TrialParams,
    mixture_weights: Vec<f64>,
    pub log_likelihood: f64,
    pub converged: bool,

    /// Log-likelihood after each EM iteration, used by tests to check monotonicity
    pub loglik_history: Vec<f64>,
}

/// Scaled forward-backward over one chromosome's observation sequence
///
/// Emission probs are computed in log space, then shifted by the per-bin max
/// before exponentiation; the shift and the per-bin scale factors are folded
/// back into the log-likelihood. Expected statistics are added into `stats`.
///
#[allow(clippy::needless_range_loop)]
fn accumulate_chrom_stats(
    observations: &[u32],
    states: &[CopyNumberState],
    params: &TrialParams,
    stats: &mut SufficientStats,
) {
    let obs_count = observations.len();
    let state_count = states.len();
    if obs_count == 0 {
        return;
    }

    // Shifted linear-space emission probs plus the per-bin ln shift
    let mut emit = vec![vec![0.0; state_count]; obs_count];
    let mut ln_shift = vec![0.0; obs_count];
    for (obs_index, &obs) in observations.iter().enumerate() {
        let mut max_ln = f64::NEG_INFINITY;
        let ln_row = states
            .iter()
            .map(|&state| {
                let v = params.shared.ln_density(state, obs);
                max_ln = max_ln.max(v);
                v
            })
            .collect::<Vec<_>>();
        assert!(max_ln.is_finite());
        for state_index in 0..state_count {
            emit[obs_index][state_index] = (ln_row[state_index] - max_ln).exp();
        }
        ln_shift[obs_index] = max_ln;
    }

    let trans = &params.transition_matrix;

    // Forward pass with per-bin normalization
    let mut alpha = vec![vec![0.0; state_count]; obs_count];
    let mut scale = vec![0.0; obs_count];
    for state_index in 0..state_count {
        alpha[0][state_index] = params.init_probs[state_index] * emit[0][state_index];
    }
    for obs_index in 0..obs_count {
        if obs_index > 0 {
            for to_index in 0..state_count {
                let mut sum = 0.0;
                for from_index in 0..state_count {
                    sum += alpha[obs_index - 1][from_index] * trans[from_index][to_index];
                }
                alpha[obs_index][to_index] = sum * emit[obs_index][to_index];
            }
        }
        let c: f64 = alpha[obs_index].iter().sum();
        assert!(c > 0.0, "Forward probability underflow at bin {obs_index}");
        for state_index in 0..state_count {
            alpha[obs_index][state_index] /= c;
        }
        scale[obs_index] = c;
        stats.loglik += c.ln() + ln_shift[obs_index];
    }

    // Backward pass reusing the forward scale factors
    let mut beta_next = vec![1.0; state_count];
    let mut beta = vec![0.0; state_count];
    let mut gamma = vec![0.0; state_count];

    // The last bin's gamma is just the normalized alpha row
    for state_index in 0..state_count {
        accumulate_gamma(
            stats,
            state_index,
            alpha[obs_count - 1][state_index],
            observations[obs_count - 1],
        );
    }

    for obs_index in (0..obs_count - 1).rev() {
        let next = obs_index + 1;
        for from_index in 0..state_count {
            let mut sum = 0.0;
            for to_index in 0..state_count {
                let term =
                    trans[from_index][to_index] * emit[next][to_index] * beta_next[to_index];
                sum += term;
                stats.xi_sum[from_index][to_index] +=
                    alpha[obs_index][from_index] * term / scale[next];
            }
            beta[from_index] = sum / scale[next];
        }

        for state_index in 0..state_count {
            gamma[state_index] = alpha[obs_index][state_index] * beta[state_index];
        }
        let gamma_total: f64 = gamma.iter().sum();
        assert!(gamma_total > 0.0);
        for state_index in 0..state_count {
            let g = gamma[state_index] / gamma_total;
            accumulate_gamma(stats, state_index, g, observations[obs_index]);
            if obs_index == 0 {
                stats.init_gamma[state_index] += g;
            }
        }

        std::mem::swap(&mut beta_next, &mut beta);
    }

    if obs_count == 1 {
        for state_index in 0..state_count {
            stats.init_gamma[state_index] += alpha[0][state_index];
        }
    }
}

fn accumulate_gamma(stats: &mut SufficientStats, state_index: usize, gamma: f64, obs: u32) {
    let x = obs as f64;
    stats.gamma_sum[state_index] += gamma;
    stats.gamma_obs_sum[state_index] += gamma * x;
    stats.gamma_obs2_sum[state_index] += gamma * x * x;
    if obs == 0 {
        stats.gamma_zero_sum[state_index] += gamma;
    }
}

/// Re-estimate all trial parameters from the accumulated expected statistics
///
/// States with (near) zero posterior mass keep their previous values, they are
/// not an error.
///
fn reestimate_params(
    states: &[CopyNumberState],
    stats: &SufficientStats,
    params: &mut TrialParams,
) {
    let state_count = states.len();

    for from_index in 0..state_count {
        let row_sum: f64 = stats.xi_sum[from_index].iter().sum();
        if row_sum > 0.0 {
            for to_index in 0..state_count {
                params.transition_matrix[from_index][to_index] =
                    stats.xi_sum[from_index][to_index] / row_sum;
            }
        }
    }

    let init_sum: f64 = stats.init_gamma.iter().sum();
    if init_sum > 0.0 {
        for state_index in 0..state_count {
            params.init_probs[state_index] = stats.init_gamma[state_index] / init_sum;
        }
    }

    // Baseline mean: constrained MLE over all states with a nonzero multiplier
    let mut obs_total = 0.0;
    let mut mass_total = 0.0;
    for (state_index, state) in states.iter().enumerate() {
        let multiplier = state.multiplier();
        if multiplier > 0.0 {
            obs_total += stats.gamma_obs_sum[state_index];
            mass_total += stats.gamma_sum[state_index] * multiplier;
        }
    }
    if mass_total > 0.0 && obs_total > 0.0 {
        params.shared.baseline_mean = obs_total / mass_total;
    }

    // Shared dispersion by posterior-weighted method of moments:
    // solve sum_i w_i * (var_i - mean_i) = sum_i w_i * mean_i^2 / r
    let mut mean2_total = 0.0;
    let mut excess_total = 0.0;
    for (state_index, state) in states.iter().enumerate() {
        let multiplier = state.multiplier();
        if multiplier <= 0.0 {
            continue;
        }
        let mass = stats.gamma_sum[state_index];
        if mass <= 0.0 {
            continue;
        }
        let mean = params.shared.baseline_mean * multiplier;
        let sq_resid = stats.gamma_obs2_sum[state_index]
            - 2.0 * mean * stats.gamma_obs_sum[state_index]
            + mean * mean * mass;
        mean2_total += mass * mean * mean;
        excess_total += sq_resid - mass * mean;
    }
    if mean2_total > 0.0 {
        let dispersion = if excess_total > 0.0 {
            mean2_total / excess_total
        } else {
            MAX_DISPERSION
        };
        params.shared.dispersion = dispersion.clamp(MIN_DISPERSION, MAX_DISPERSION);
    }

    if let Some(zero_index) = states.iter().position(|x| x.is_zero_inflation()) {
        let mass = stats.gamma_sum[zero_index];
        if mass > 0.0 {
            params.shared.zero_mass =
                (stats.gamma_zero_sum[zero_index] / mass).clamp(MIN_ZERO_MASS, MAX_ZERO_MASS);
        }
    }
}

/// Randomized trial initialization
///
/// The initial baseline is seeded so that the most-frequent state's mean
/// approximates the empirical observation mean.
///
fn get_random_init(
    states: &[CopyNumberState],
    most_frequent_state: CopyNumberState,
    empirical_mean: f64,
    rng: &mut StdRng,
) -> TrialParams {
    let state_count = states.len();

    let anchor_multiplier = most_frequent_state.multiplier().max(1.0);
    let baseline_mean =
        (empirical_mean / anchor_multiplier).max(0.1) * rng.gen_range(0.9..1.1);
    let shared = SharedEmission {
        baseline_mean,
        dispersion: rng.gen_range(1.0..20.0),
        zero_mass: rng.gen_range(0.2..0.8),
    };

    let stay_prob: f64 = rng.gen_range(0.9..0.999);
    let go_prob = (1.0 - stay_prob) / ((state_count - 1).max(1)) as f64;
    let mut transition_matrix = vec![vec![go_prob; state_count]; state_count];
    for state_index in 0..state_count {
        transition_matrix[state_index][state_index] = if state_count > 1 { stay_prob } else { 1.0 };
    }

    let init_probs = vec![1.0 / state_count as f64; state_count];

    TrialParams {
        transition_matrix,
        init_probs,
        shared,
    }
}

/// Run one EM trial to its eps/iteration/time budget
pub(crate) fn run_em_trial(
    series: &[Vec<u32>],
    states: &[CopyNumberState],
    mut params: TrialParams,
    budget: &FitBudget,
    deadline: Option<Instant>,
) -> TrialFit {
    let state_count = states.len();
    let total_bins: usize = series.iter().map(|x| x.len()).sum();

    let mut mixture_weights = vec![0.0; state_count];
    let mut last_loglik = f64::NEG_INFINITY;
    let mut loglik_history = Vec::new();
    let mut converged = false;

    for iteration in 0..budget.max_iter.max(1) {
        let mut stats = SufficientStats::new(state_count);
        for chrom_observations in series.iter() {
            accumulate_chrom_stats(chrom_observations, states, &params, &mut stats);
        }

        for state_index in 0..state_count {
            mixture_weights[state_index] = stats.gamma_sum[state_index] / total_bins as f64;
        }

        let loglik = stats.loglik;
        loglik_history.push(loglik);
        debug!("EM iteration {iteration}: log-likelihood {loglik:.4}");

        if (loglik - last_loglik).abs() < budget.eps {
            converged = true;
            break;
        }
        last_loglik = loglik;

        reestimate_params(states, &stats, &mut params);

        // Cooperative cancellation point: the iteration in progress always completes
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            break;
        }
    }

    TrialFit {
        params,
        mixture_weights,
        log_likelihood: *loglik_history.last().unwrap(),
        converged,
        loglik_history,
    }
}

pub(crate) fn get_trial_init(
    series: &[Vec<u32>],
    states: &[CopyNumberState],
    most_frequent_state: CopyNumberState,
    seed: u64,
    trial_index: usize,
) -> TrialParams {
    let total_bins: usize = series.iter().map(|x| x.len()).sum();
    let total_count: u64 = series
        .iter()
        .flat_map(|x| x.iter())
        .map(|&x| x as u64)
        .sum();
    let empirical_mean = total_count as f64 / total_bins as f64;

    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(trial_index as u64));
    get_random_init(states, most_frequent_state, empirical_mean, &mut rng)
}

/// Fit the copy number HMM to one sample's binned count series
///
/// # Arguments
/// * `series` - One coordinate-ordered observation sequence per chromosome
/// * `num_trials` - Number of independent EM runs from randomized initial parameters
/// * `seed` - Base seed for trial initialization; refitting with the same seed
///   reproduces the same selected fit
///
/// The best trial by log-likelihood is returned regardless of its convergence
/// flag; the flag is preserved so callers can distinguish a trusted fit from a
/// budget-exhausted one.
///
pub fn fit(
    sample_id: &str,
    series: &[Vec<u32>],
    states: &[CopyNumberState],
    most_frequent_state: CopyNumberState,
    budget: &FitBudget,
    num_trials: usize,
    seed: u64,
) -> SimpleResult<Model> {
    if states.is_empty() {
        bail!("Empty copy number state set");
    }
    if !states.contains(&most_frequent_state) {
        bail!("Most-frequent state '{most_frequent_state}' is not a member of the state set");
    }
    let total_bins: usize = series.iter().map(|x| x.len()).sum();
    if total_bins == 0 {
        bail!("Empty observation sequence for sample '{sample_id}'");
    }

    let deadline = budget
        .max_time
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs));

    let mut best: Option<TrialFit> = None;
    for trial_index in 0..num_trials.max(1) {
        let init = get_trial_init(series, states, most_frequent_state, seed, trial_index);
        let trial = run_em_trial(series, states, init, budget, deadline);

        debug!(
            "Sample '{sample_id}' trial {trial_index}: log-likelihood {:.4} converged {}",
            trial.log_likelihood, trial.converged
        );

        // Strict comparison keeps the lowest trial index on ties
        let is_better = match &best {
            Some(best) => trial.log_likelihood > best.log_likelihood,
            None => true,
        };
        if is_better {
            best = Some(trial);
        }

        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            break;
        }
    }

    let best = best.unwrap();
    let emission_params = states
        .iter()
        .map(|&state| best.params.shared.state_params(state))
        .collect();

    Ok(Model {
        sample_id: sample_id.to_string(),
        states: states.to_vec(),
        transition_matrix: best.params.transition_matrix,
        init_probs: best.params.init_probs,
        emission_params,
        mixture_weights: best.mixture_weights,
        log_likelihood: best.log_likelihood,
        converged: best.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_counts::simulate_nb_series;

    fn default_budget() -> FitBudget {
        FitBudget {
            eps: 0.1,
            max_iter: 500,
            max_time: None,
        }
    }

    fn six_state_set() -> Vec<CopyNumberState> {
        use CopyNumberState::*;
        vec![ZeroInflation, Monosomy, Disomy, Trisomy, Tetrasomy, Multisomy]
    }

    fn seven_state_set() -> Vec<CopyNumberState> {
        use CopyNumberState::*;
        vec![
            ZeroInflation,
            Nullsomy,
            Monosomy,
            Disomy,
            Trisomy,
            Tetrasomy,
            Multisomy,
        ]
    }

    /// Simulated euploid series: long disomy stretches broken by short events so
    /// that the true disomy bin fraction is 8850/10000 = 0.885
    fn disomy_dominant_series() -> Vec<Vec<u32>> {
        use CopyNumberState::*;
        let spec: &[(CopyNumberState, usize)] = &[
            (Disomy, 1300),
            (Trisomy, 200),
            (Disomy, 1250),
            (Monosomy, 180),
            (Disomy, 1200),
            (ZeroInflation, 200),
            (Disomy, 1100),
            (Tetrasomy, 150),
            (Disomy, 1000),
            (Monosomy, 120),
            (Disomy, 1400),
            (Trisomy, 180),
            (Disomy, 800),
            (ZeroInflation, 120),
            (Disomy, 800),
        ];
        simulate_nb_series(spec, 50.0, 20.0, 7)
    }

    /// Simulated series where trisomy narrowly dominates: disomy fraction 0.315,
    /// trisomy fraction 0.35
    fn trisomy_dominant_series() -> Vec<Vec<u32>> {
        use CopyNumberState::*;
        let spec: &[(CopyNumberState, usize)] = &[
            (Disomy, 1200),
            (Trisomy, 1400),
            (Monosomy, 900),
            (Disomy, 950),
            (Trisomy, 1000),
            (Tetrasomy, 800),
            (Monosomy, 800),
            (Disomy, 1000),
            (Trisomy, 1100),
            (Tetrasomy, 850),
        ];
        simulate_nb_series(spec, 50.0, 20.0, 11)
    }

    #[test]
    fn test_fit_config_errors() {
        let budget = default_budget();
        let states = six_state_set();

        let err = fit(
            "s1",
            &[vec![1, 2, 3]],
            &[],
            CopyNumberState::Disomy,
            &budget,
            1,
            0,
        );
        assert!(err.is_err());

        let err = fit(
            "s1",
            &[vec![1, 2, 3]],
            &states,
            CopyNumberState::Nullsomy,
            &budget,
            1,
            0,
        );
        assert!(err.is_err());

        let err = fit(
            "s1",
            &[Vec::new()],
            &states,
            CopyNumberState::Disomy,
            &budget,
            1,
            0,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_fit_normalization_invariants() {
        let series = disomy_dominant_series();
        let states = six_state_set();
        let model = fit(
            "s1",
            &series,
            &states,
            CopyNumberState::Disomy,
            &default_budget(),
            3,
            1,
        )
        .unwrap();

        let weight_total: f64 = model.mixture_weights.iter().sum();
        approx::assert_relative_eq!(weight_total, 1.0, max_relative = 1e-9);

        let init_total: f64 = model.init_probs.iter().sum();
        approx::assert_relative_eq!(init_total, 1.0, max_relative = 1e-9);

        for row in model.transition_matrix.iter() {
            let row_total: f64 = row.iter().sum();
            approx::assert_relative_eq!(row_total, 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_fit_is_deterministic_for_fixed_seed() {
        let series = disomy_dominant_series();
        let states = six_state_set();

        let model1 = fit(
            "s1",
            &series,
            &states,
            CopyNumberState::Disomy,
            &default_budget(),
            3,
            42,
        )
        .unwrap();
        let model2 = fit(
            "s1",
            &series,
            &states,
            CopyNumberState::Disomy,
            &default_budget(),
            3,
            42,
        )
        .unwrap();

        approx::assert_relative_eq!(
            model1.log_likelihood,
            model2.log_likelihood,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_em_loglik_is_monotone_within_trial() {
        let series = disomy_dominant_series();
        let states = six_state_set();
        let init = get_trial_init(&series, &states, CopyNumberState::Disomy, 5, 0);
        let trial = run_em_trial(&series, &states, init, &default_budget(), None);

        for pair in trial.loglik_history.windows(2) {
            assert!(
                pair[1] >= pair[0] - 1e-6,
                "log-likelihood decreased: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_budget_exhaustion_clears_converged_flag() {
        let series = disomy_dominant_series();
        let states = six_state_set();
        let budget = FitBudget {
            eps: 1e-9,
            max_iter: 2,
            max_time: None,
        };
        let model = fit(
            "s1",
            &series,
            &states,
            CopyNumberState::Disomy,
            &budget,
            1,
            1,
        )
        .unwrap();
        assert!(!model.converged);
    }

    #[test]
    fn test_disomy_weight_on_euploid_series() {
        let series = disomy_dominant_series();
        let model = fit(
            "s1",
            &series,
            &six_state_set(),
            CopyNumberState::Disomy,
            &default_budget(),
            5,
            3,
        )
        .unwrap();

        assert!(model.converged);
        let disomy_weight =
            model.mixture_weights[model.state_index(CopyNumberState::Disomy).unwrap()];
        assert!(
            disomy_weight > 0.88 && disomy_weight < 0.90,
            "disomy weight {disomy_weight}"
        );
    }

    #[test]
    fn test_disomy_weight_with_nullsomy_in_state_set() {
        let series = disomy_dominant_series();
        let model = fit(
            "s1",
            &series,
            &seven_state_set(),
            CopyNumberState::Disomy,
            &default_budget(),
            5,
            3,
        )
        .unwrap();

        let disomy_weight =
            model.mixture_weights[model.state_index(CopyNumberState::Disomy).unwrap()];
        assert!(
            disomy_weight > 0.87 && disomy_weight < 0.89,
            "disomy weight {disomy_weight}"
        );
    }

    #[test]
    fn test_state_weights_on_trisomy_dominant_series() {
        let series = trisomy_dominant_series();
        for states in [six_state_set(), seven_state_set()] {
            let model = fit(
                "s1",
                &series,
                &states,
                CopyNumberState::Disomy,
                &default_budget(),
                5,
                3,
            )
            .unwrap();

            let disomy_weight =
                model.mixture_weights[model.state_index(CopyNumberState::Disomy).unwrap()];
            let trisomy_weight =
                model.mixture_weights[model.state_index(CopyNumberState::Trisomy).unwrap()];
            assert!(
                disomy_weight > 0.30 && disomy_weight < 0.33,
                "disomy weight {disomy_weight}"
            );
            assert!(
                trisomy_weight > 0.30 && trisomy_weight < 0.40,
                "trisomy weight {trisomy_weight}"
            );
        }
    }

    #[test]
    fn test_degenerate_state_keeps_zero_weight() {
        // No bins are anywhere near multisomy depth, so its weight collapses
        let series = disomy_dominant_series();
        let model = fit(
            "s1",
            &series,
            &six_state_set(),
            CopyNumberState::Disomy,
            &default_budget(),
            3,
            1,
        )
        .unwrap();
        let multisomy_weight =
            model.mixture_weights[model.state_index(CopyNumberState::Multisomy).unwrap()];
        assert!(multisomy_weight < 1e-3);
    }
}
