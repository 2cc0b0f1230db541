#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;
use log::debug;
use log::trace;
use thiserror::Error;

use sketch_io::LargeFormatter;

use crate::Formula;
use crate::MarkovChain;
use crate::Predecessors;
use crate::Property;
use crate::StateIndex;
use crate::StateSet;
use crate::backward_reachable;

/// The answer of a model checker for every state of the chain.
#[derive(Clone, Debug, PartialEq)]
pub enum CheckResult {
    /// The set of states that satisfy the property.
    Qualitative(StateSet),

    /// The value (probability or expected reward) of the formula in every state.
    Quantitative(Vec<f64>),
}

impl CheckResult {
    /// Returns true iff the given state satisfies the property.
    pub fn is_satisfied(&self, state_index: StateIndex, property: &Property) -> bool {
        match self {
            CheckResult::Qualitative(states) => states[*state_index],
            CheckResult::Quantitative(values) => property.bound.is_satisfied(values[state_index]),
        }
    }

    /// Returns the value of the given state, if the result is quantitative.
    pub fn value(&self, state_index: StateIndex) -> Option<f64> {
        match self {
            CheckResult::Qualitative(_) => None,
            CheckResult::Quantitative(values) => Some(values[state_index]),
        }
    }
}

/// The interface of the model-checking oracle.
///
/// Implementations decide per property whether they answer qualitatively or
/// quantitatively. The result must cover every state of the given chain.
pub trait ModelChecker {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Checks the property on the given chain.
    fn check<C: MarkovChain>(&self, chain: &C, property: &Property) -> Result<CheckResult, Self::Error>;
}

#[derive(Error, Debug, PartialEq)]
pub enum CheckError {
    #[error("The chain has no label '{0}'")]
    UnknownLabel(String),

    #[error("The chain has no reward model '{0}'")]
    UnknownRewardModel(String),

    #[error("Value iteration did not converge within {0} iterations")]
    NoConvergence(usize),
}

/// A reference model checker for reachability probabilities and expected
/// rewards on explicit chains.
///
/// # Details
///
/// The states with probability zero and one are determined by graph analysis.
/// Properties with threshold zero or one are answered qualitatively from these
/// sets alone, other properties by Jacobi value iteration starting from below,
/// which stops once no value changes by more than `precision`.
#[derive(Clone, Debug)]
pub struct ValueIterationChecker {
    pub precision: f64,
    pub max_iterations: usize,
}

impl Default for ValueIterationChecker {
    fn default() -> Self {
        Self {
            precision: 1e-8,
            max_iterations: 1_000_000,
        }
    }
}

/// The qualitative classification of states for an until formula.
struct Prob01 {
    prob0: StateSet,
    prob1: StateSet,
}

impl ValueIterationChecker {
    /// Computes the states from which `constraint U target` holds with probability zero and one.
    fn prob01(chain: &impl MarkovChain, constraint: Option<&StateSet>, target: &StateSet) -> Prob01 {
        let predecessors = Predecessors::new(chain);
        let allowed = |state_index: StateIndex| constraint.is_none_or(|constraint| constraint[*state_index]);

        // States that can reach the target through constraint states have a positive probability.
        let positive = backward_reachable(&predecessors, target, |state_index| allowed(state_index));
        let prob0 = !positive;

        // States that can reach a probability zero state before the target do not have probability one.
        let not_prob1 = backward_reachable(&predecessors, &prob0, |state_index| {
            allowed(state_index) && !target[*state_index]
        });
        let prob1 = !not_prob1;

        debug!(
            "Found {} states with probability 0 and {} states with probability 1",
            LargeFormatter(prob0.count_ones()),
            LargeFormatter(prob1.count_ones())
        );
        Prob01 { prob0, prob1 }
    }

    /// Jacobi value iteration over the states in `maybe`, the values of all other states are fixed.
    fn iterate(
        &self,
        chain: &impl MarkovChain,
        maybe: &StateSet,
        mut values: Vec<f64>,
        state_reward: impl Fn(StateIndex) -> f64,
    ) -> Result<Vec<f64>, CheckError> {
        let maybe_states: Vec<StateIndex> = maybe.iter_ones().map(StateIndex::new).collect();
        let mut next = values.clone();

        for iteration in 0..self.max_iterations {
            let mut max_difference: f64 = 0.0;
            for &state_index in &maybe_states {
                let value = state_reward(state_index)
                    + chain
                        .outgoing_transitions(state_index)
                        .map(|transition| transition.probability * values[transition.to])
                        .sum::<f64>();

                // Equal infinite values should not produce a NaN difference.
                if value != values[state_index] {
                    max_difference = max_difference.max((value - values[state_index]).abs());
                }
                next[state_index] = value;
            }

            std::mem::swap(&mut values, &mut next);
            if max_difference <= self.precision {
                trace!("Value iteration converged after {} iterations", iteration + 1);
                return Ok(values);
            }
        }

        Err(CheckError::NoConvergence(self.max_iterations))
    }

    fn label<'a>(chain: &'a impl MarkovChain, name: &str) -> Result<&'a StateSet, CheckError> {
        chain
            .labelling()
            .get(name)
            .ok_or_else(|| CheckError::UnknownLabel(name.to_string()))
    }
}

impl ModelChecker for ValueIterationChecker {
    type Error = CheckError;

    fn check<C: MarkovChain>(&self, chain: &C, property: &Property) -> Result<CheckResult, CheckError> {
        match &property.formula {
            Formula::Probability { constraint, target } => {
                let target = Self::label(chain, target)?;
                let constraint = constraint.as_ref().map(|name| Self::label(chain, name)).transpose()?;
                let Prob01 { prob0, prob1 } = Self::prob01(chain, constraint, target);

                let threshold = property.bound.threshold;
                if threshold == 0.0 || threshold == 1.0 {
                    // Any value strictly between zero and one classifies the remaining states.
                    let mut satisfied = bitvec![usize, Lsb0; 0; chain.num_of_states()];
                    for state_index in chain.iter_states() {
                        let value = if prob0[*state_index] {
                            0.0
                        } else if prob1[*state_index] {
                            1.0
                        } else {
                            0.5
                        };
                        satisfied.set(*state_index, property.bound.is_satisfied(value));
                    }

                    return Ok(CheckResult::Qualitative(satisfied));
                }

                let values: Vec<f64> = chain
                    .iter_states()
                    .map(|state_index| if prob1[*state_index] { 1.0 } else { 0.0 })
                    .collect();
                let maybe = !(prob0 | prob1);

                Ok(CheckResult::Quantitative(self.iterate(chain, &maybe, values, |_| 0.0)?))
            }
            Formula::Reward { reward_model, target } => {
                let target = Self::label(chain, target)?;
                let rewards = chain
                    .reward_model(reward_model)
                    .ok_or_else(|| CheckError::UnknownRewardModel(reward_model.clone()))?;
                let Prob01 { prob1, .. } = Self::prob01(chain, None, target);

                // States that do not reach the target almost surely accumulate an infinite reward.
                let values: Vec<f64> = chain
                    .iter_states()
                    .map(|state_index| if prob1[*state_index] { 0.0 } else { f64::INFINITY })
                    .collect();
                let maybe = prob1 & !target.clone();

                Ok(CheckResult::Quantitative(self.iterate(
                    chain,
                    &maybe,
                    values,
                    |state_index| rewards.state_reward(state_index),
                )?))
            }
        }
    }
}
