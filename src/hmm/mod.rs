pub mod emission;
pub mod fitter;

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

/// Hidden states available to the segmentation model
///
/// The active state set is an ordered subset of these labels selected on the
/// command line. State order matters for output readability and for the
/// deterministic tie-breaks in decoding, not for the model mathematics.
///
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum::Display,
    strum::EnumCount,
    strum::EnumString,
    strum::FromRepr,
)]
#[repr(usize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CopyNumberState {
    ZeroInflation,
    Nullsomy,
    Monosomy,
    Disomy,
    Trisomy,
    Tetrasomy,
    /// All copy numbers greater than 4
    Multisomy,
}

impl CopyNumberState {
    /// Copy number multiplier relative to the haploid baseline
    ///
    /// Zero for the zero-inflation and nullsomy states, which share a near-zero
    /// emission mean instead.
    ///
    pub fn multiplier(&self) -> f64 {
        use CopyNumberState::*;
        match self {
            ZeroInflation | Nullsomy => 0.0,
            Monosomy => 1.0,
            Disomy => 2.0,
            Trisomy => 3.0,
            Tetrasomy => 4.0,
            Multisomy => 5.0,
        }
    }

    pub fn is_zero_inflation(&self) -> bool {
        matches!(self, CopyNumberState::ZeroInflation)
    }
}

/// Parse an ordered state set from its comma-separated command-line form
pub fn parse_state_set(labels: &str) -> SimpleResult<Vec<CopyNumberState>> {
    let mut states = Vec::new();
    for label in labels.split(',') {
        let label = label.trim();
        let state = match label.parse::<CopyNumberState>() {
            Ok(x) => x,
            Err(_) => {
                bail!("Unknown copy number state label: '{label}'");
            }
        };
        if states.contains(&state) {
            bail!("Copy number state listed twice: '{label}'");
        }
        states.push(state);
    }
    if states.is_empty() {
        bail!("Empty copy number state set");
    }
    Ok(states)
}

/// Emission distribution parameters for one state
///
/// Estimated by the fitter. All states share one baseline mean and dispersion,
/// scaled by the state multiplier, so the per-state values recorded here are
/// derived rather than free parameters.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmissionParams {
    pub mean: f64,
    pub dispersion: f64,

    /// Extra point mass at a zero count, nonzero only for the zero-inflation state
    pub zero_mass: f64,
}

/// Iteration/convergence/time budgets for one EM fit
#[derive(Clone, Debug)]
pub struct FitBudget {
    /// Log-likelihood improvement below which an EM run is considered converged
    pub eps: f64,
    pub max_iter: usize,

    /// Wall-clock budget in seconds, checked once per EM iteration
    pub max_time: Option<f64>,
}

/// A fitted copy number HMM for one sample
///
/// Immutable once produced by the fitter. Probability vectors are stored in
/// linear space with rows/vectors normalized to 1.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Model {
    pub sample_id: String,
    pub states: Vec<CopyNumberState>,

    /// Lookup format matrix[from_state][to_state]
    pub transition_matrix: Vec<Vec<f64>>,
    pub init_probs: Vec<f64>,
    pub emission_params: Vec<EmissionParams>,

    /// Fraction of bins assigned to each state, sums to 1
    pub mixture_weights: Vec<f64>,

    pub log_likelihood: f64,

    /// True only if the selected EM trial stopped on the eps criterion
    pub converged: bool,
}

impl Model {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Index of a state within this model's declared state order
    pub fn state_index(&self, state: CopyNumberState) -> Option<usize> {
        self.states.iter().position(|&x| x == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_set() {
        let states = parse_state_set("zero-inflation,monosomy,disomy,trisomy").unwrap();
        assert_eq!(
            states,
            vec![
                CopyNumberState::ZeroInflation,
                CopyNumberState::Monosomy,
                CopyNumberState::Disomy,
                CopyNumberState::Trisomy,
            ]
        );

        assert!(parse_state_set("disomy,fivesomy").is_err());
        assert!(parse_state_set("disomy,disomy").is_err());
        assert!(parse_state_set("").is_err());
    }

    #[test]
    fn test_multipliers_are_ordered() {
        use CopyNumberState::*;
        let states = [Nullsomy, Monosomy, Disomy, Trisomy, Tetrasomy, Multisomy];
        for pair in states.windows(2) {
            assert!(pair[0].multiplier() <= pair[1].multiplier());
        }
        assert_eq!(ZeroInflation.multiplier(), 0.0);
    }
}
