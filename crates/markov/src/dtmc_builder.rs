#![forbid(unsafe_code)]

use log::trace;
use thiserror::Error;

use crate::Dtmc;
use crate::Labelling;
use crate::RewardModel;
use crate::StateIndex;

/// The tolerance used to decide whether the outgoing probabilities of a state sum up to one.
pub const STOCHASTIC_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, PartialEq)]
pub enum DtmcError {
    #[error("Initial state {0} is out of bounds for {1} states")]
    InitialStateOutOfBounds(usize, usize),

    #[error("Transition {from} -> {to} has invalid probability {probability}")]
    InvalidProbability { from: usize, to: usize, probability: f64 },

    #[error("The outgoing probabilities of state {state} sum up to {sum} instead of one")]
    NotStochastic { state: usize, sum: f64 },
}

/// Accumulates the transitions, labels and rewards of a chain, and checks on
/// [DtmcBuilder::finish] that the result is a valid Markov chain.
pub struct DtmcBuilder {
    transition_from: Vec<StateIndex>,
    transition_to: Vec<StateIndex>,
    probabilities: Vec<f64>,

    labelling: Labelling,
    reward_model: Option<RewardModel>,

    /// The number of states, grows when transitions refer to larger states.
    num_of_states: usize,
}

impl DtmcBuilder {
    /// Creates a builder for a chain with (at least) the given number of states.
    pub fn new(num_of_states: usize) -> Self {
        Self::with_capacity(num_of_states, num_of_states)
    }

    /// Creates a builder with pre-allocated space for the given number of transitions.
    pub fn with_capacity(num_of_states: usize, num_of_transitions: usize) -> Self {
        Self {
            transition_from: Vec::with_capacity(num_of_transitions),
            transition_to: Vec::with_capacity(num_of_transitions),
            probabilities: Vec::with_capacity(num_of_transitions),
            labelling: Labelling::new(num_of_states),
            reward_model: None,
            num_of_states,
        }
    }

    /// Adds a transition with the given probability.
    pub fn add_transition(&mut self, from: StateIndex, probability: f64, to: StateIndex) {
        self.transition_from.push(from);
        self.transition_to.push(to);
        self.probabilities.push(probability);

        self.require_num_of_states(from.value().max(to.value()) + 1);
    }

    /// Adds the label to the given state.
    pub fn add_label(&mut self, state_index: StateIndex, label: &str) {
        self.require_num_of_states(state_index.value() + 1);
        self.labelling.add_state(state_index, label);
    }

    /// Introduces the label without adding it to any state.
    pub fn ensure_label(&mut self, label: &str) {
        self.labelling.add_label(label);
    }

    /// Sets the reward of the given state in the reward model with the given
    /// name. A chain has at most one reward model, so this panics when the
    /// name differs from the one used before.
    pub fn set_state_reward(&mut self, name: &str, state_index: StateIndex, reward: f64) {
        self.require_num_of_states(state_index.value() + 1);

        let num_of_states = self.num_of_states;
        let reward_model = self
            .reward_model
            .get_or_insert_with(|| RewardModel::new(name, vec![0.0; num_of_states]));
        assert_eq!(reward_model.name(), name, "Only a single reward model is supported");

        reward_model.resize(num_of_states);
        reward_model.set_state_reward(state_index, reward);
    }

    /// Ensures that the chain has at least the given number of states.
    pub fn require_num_of_states(&mut self, num_of_states: usize) {
        if num_of_states > self.num_of_states {
            self.num_of_states = num_of_states;
            self.labelling.resize(num_of_states);
        }
    }

    /// Returns the number of states added to the builder.
    pub fn num_of_states(&self) -> usize {
        self.num_of_states
    }

    /// Returns the number of transitions added to the builder.
    pub fn num_of_transitions(&self) -> usize {
        self.transition_from.len()
    }

    /// Checks the accumulated transitions and constructs the chain.
    pub fn finish(self, initial_state: StateIndex) -> Result<Dtmc, DtmcError> {
        let num_of_states = self.num_of_states;
        if initial_state.value() >= num_of_states {
            return Err(DtmcError::InitialStateOutOfBounds(initial_state.value(), num_of_states));
        }

        // Count the number of transitions for every state, and check the probabilities.
        let mut states = vec![0usize; num_of_states + 1];
        let mut sums = vec![0.0f64; num_of_states];
        for ((&from, &to), &probability) in self
            .transition_from
            .iter()
            .zip(self.transition_to.iter())
            .zip(self.probabilities.iter())
        {
            if !(probability > 0.0 && probability <= 1.0 + STOCHASTIC_TOLERANCE) {
                return Err(DtmcError::InvalidProbability {
                    from: from.value(),
                    to: to.value(),
                    probability,
                });
            }

            states[from] += 1;
            sums[from] += probability;
        }

        for (state, sum) in sums.iter().enumerate() {
            if (sum - 1.0).abs() > STOCHASTIC_TOLERANCE {
                return Err(DtmcError::NotStochastic { state, sum: *sum });
            }
        }

        // Track the number of transitions before every state.
        states.iter_mut().fold(0, |count, start| {
            let result = count + *start;
            *start = count;
            result
        });

        // Place the transitions, and increment the offset of every state.
        let num_of_transitions = self.transition_from.len();
        let mut transition_to = vec![StateIndex::new(0); num_of_transitions];
        let mut probabilities = vec![0.0; num_of_transitions];
        for ((&from, &to), &probability) in self
            .transition_from
            .iter()
            .zip(self.transition_to.iter())
            .zip(self.probabilities.iter())
        {
            let start = &mut states[from];
            transition_to[*start] = to;
            probabilities[*start] = probability;
            *start += 1;
        }

        // Shift the offsets back such that every state points to its first transition.
        states.iter_mut().fold(0, |previous, start| {
            let result = *start;
            *start = previous;
            result
        });
        states[num_of_states] = num_of_transitions;

        let mut reward_model = self.reward_model;
        if let Some(reward_model) = &mut reward_model {
            reward_model.resize(num_of_states);
        }

        trace!("Built chain with {num_of_states} states and {num_of_transitions} transitions");
        Ok(Dtmc::new(
            initial_state,
            states,
            transition_to,
            probabilities,
            self.labelling,
            reward_model,
        ))
    }
}
