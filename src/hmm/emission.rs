//! Negative binomial emission layer shared by all copy number states
//!
//! One baseline mean and dispersion are fit globally and scaled by each state's
//! integer copy number multiplier. This sharing is what keeps multi-state fits
//! identifiable from modest bin counts.

use statrs::distribution::{Discrete, NegativeBinomial};

use super::{CopyNumberState, EmissionParams};
use crate::prob_utils::ln_sum_exp;

/// Zero-copy states can't use a zero emission mean, instead give the model a way
/// to explain occasional garbage counts inside zero copy regions.
pub const MIN_COPY_FRACTION: f64 = 0.01;

/// Log pmf of a negative binomial parameterized by mean and dispersion
///
/// With dispersion r and mean m, the success probability is r / (r + m). Large r
/// degrades gracefully toward Poisson behavior.
///
pub fn nb_ln_pmf(mean: f64, dispersion: f64, count: u32) -> f64 {
    assert!(mean > 0.0);
    assert!(dispersion > 0.0);

    let p = dispersion / (dispersion + mean);
    let nb = NegativeBinomial::new(dispersion, p).unwrap();
    nb.ln_pmf(count as u64)
}

/// Return the log emission prob of a count observation given the state parameters
///
/// The zero-inflation state's density is a mixture of a point mass at zero and
/// the base count distribution.
///
pub fn ln_density(state: CopyNumberState, params: &EmissionParams, count: u32) -> f64 {
    let base = nb_ln_pmf(params.mean, params.dispersion, count);
    if !state.is_zero_inflation() {
        return base;
    }

    let mix = (1.0 - params.zero_mass).ln() + base;
    if count == 0 {
        ln_sum_exp(params.zero_mass.ln(), mix)
    } else {
        mix
    }
}

/// The shared emission parameters maintained during EM
///
/// Per-state EmissionParams are derived views of these three values.
///
#[derive(Clone, Debug)]
pub struct SharedEmission {
    /// Expected count per copy number unit
    pub baseline_mean: f64,
    pub dispersion: f64,
    pub zero_mass: f64,
}

impl SharedEmission {
    pub fn state_mean(&self, state: CopyNumberState) -> f64 {
        let multiplier = state.multiplier();
        if multiplier > 0.0 {
            self.baseline_mean * multiplier
        } else {
            self.baseline_mean * MIN_COPY_FRACTION
        }
    }

    pub fn state_params(&self, state: CopyNumberState) -> EmissionParams {
        EmissionParams {
            mean: self.state_mean(state),
            dispersion: self.dispersion,
            zero_mass: if state.is_zero_inflation() {
                self.zero_mass
            } else {
                0.0
            },
        }
    }

    pub fn ln_density(&self, state: CopyNumberState, count: u32) -> f64 {
        ln_density(state, &self.state_params(state), count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_ln_pmf_matches_poisson_limit() {
        // At very high dispersion the NB pmf approaches Poisson; value should be
        // close to `log(dpois(5, 10))` in R:
        let v = nb_ln_pmf(10.0, 1e9, 5);
        approx::assert_relative_eq!(v, -3.2745662778118154, max_relative = 1e-5);
    }

    #[test]
    fn test_nb_ln_pmf_normalizes() {
        let total: f64 = (0..2000u32).map(|k| nb_ln_pmf(20.0, 4.0, k).exp()).sum();
        approx::assert_relative_eq!(total, 1.0, max_relative = 1e-9);
    }

    #[test]
    fn test_zero_inflation_density() {
        let params = EmissionParams {
            mean: 0.2,
            dispersion: 5.0,
            zero_mass: 0.7,
        };

        let at_zero = ln_density(CopyNumberState::ZeroInflation, &params, 0).exp();
        let base_at_zero = nb_ln_pmf(0.2, 5.0, 0).exp();
        approx::assert_relative_eq!(
            at_zero,
            0.7 + 0.3 * base_at_zero,
            max_relative = 1e-9
        );

        // Away from zero only the base distribution contributes
        let at_three = ln_density(CopyNumberState::ZeroInflation, &params, 3).exp();
        approx::assert_relative_eq!(
            at_three,
            0.3 * nb_ln_pmf(0.2, 5.0, 3).exp(),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_shared_emission_state_means() {
        let shared = SharedEmission {
            baseline_mean: 50.0,
            dispersion: 8.0,
            zero_mass: 0.5,
        };
        approx::assert_ulps_eq!(shared.state_mean(CopyNumberState::Disomy), 100.0);
        approx::assert_ulps_eq!(shared.state_mean(CopyNumberState::Trisomy), 150.0);
        approx::assert_ulps_eq!(
            shared.state_mean(CopyNumberState::Nullsomy),
            50.0 * MIN_COPY_FRACTION
        );
        assert_eq!(shared.state_params(CopyNumberState::Disomy).zero_mass, 0.0);
    }
}
