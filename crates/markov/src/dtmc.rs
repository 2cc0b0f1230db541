#![forbid(unsafe_code)]

//! The Markov chain trait and the explicit chain representation.

use std::fmt;

use sketch_utilities::TagIndex;

use crate::Labelling;

/// A unique type for the states.
pub struct StateTag;

/// The index for a state.
pub type StateIndex = TagIndex<usize, StateTag>;

/// A probabilistic transition to the given state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub to: StateIndex,
    pub probability: f64,
}

impl Transition {
    pub fn new(to: StateIndex, probability: f64) -> Self {
        Self { to, probability }
    }
}

/// A named reward assignment to the states of a chain.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardModel {
    name: String,
    state_rewards: Vec<f64>,
}

impl RewardModel {
    pub fn new(name: impl Into<String>, state_rewards: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            state_rewards,
        }
    }

    /// Returns the name of the reward model.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the reward of the given state.
    pub fn state_reward(&self, state_index: StateIndex) -> f64 {
        self.state_rewards[state_index]
    }

    /// Changes the reward of the given state.
    pub fn set_state_reward(&mut self, state_index: StateIndex, reward: f64) {
        self.state_rewards[state_index] = reward;
    }

    /// Returns the rewards of all states.
    pub fn state_rewards(&self) -> &[f64] {
        &self.state_rewards
    }

    /// Extends the model with zero rewards until it covers the given number of states.
    pub(crate) fn resize(&mut self, num_of_states: usize) {
        if self.state_rewards.len() < num_of_states {
            self.state_rewards.resize(num_of_states, 0.0);
        }
    }
}

/// The trait for discrete-time Markov chains.
///
/// Every state has a single probability distribution over successor states,
/// given by its outgoing transitions. The probabilities of every state sum up
/// to one. Uses strong indices to refer to states.
pub trait MarkovChain {
    /// Returns the index of the initial state.
    fn initial_state(&self) -> StateIndex;

    /// Returns the outgoing transitions of the given state.
    fn outgoing_transitions(&self, state_index: StateIndex) -> impl Iterator<Item = Transition> + '_;

    /// Returns the number of states.
    fn num_of_states(&self) -> usize;

    /// Returns the number of transitions.
    fn num_of_transitions(&self) -> usize;

    /// Returns the state labelling.
    fn labelling(&self) -> &Labelling;

    /// Returns the reward model with the given name, if it exists.
    fn reward_model(&self, name: &str) -> Option<&RewardModel>;

    /// Iterates over all states of the chain.
    fn iter_states(&self) -> impl DoubleEndedIterator<Item = StateIndex> + '_ {
        StateIndex::range(self.num_of_states())
    }
}

/// An explicit discrete-time Markov chain.
///
/// # Details
///
/// The transitions are stored in a compressed sparse row layout: the
/// transitions of state `s` are found at positions `states[s]..states[s + 1]`
/// of `transition_to` and `probabilities`. The last entry of `states` is a
/// sentinel. Use the [crate::DtmcBuilder] to construct a chain.
#[derive(Clone, PartialEq)]
pub struct Dtmc {
    /// Offsets into the transition arrays for every state.
    states: Vec<usize>,
    transition_to: Vec<StateIndex>,
    probabilities: Vec<f64>,

    labelling: Labelling,
    reward_model: Option<RewardModel>,

    initial_state: StateIndex,
}

impl Dtmc {
    /// Creates a chain from its raw components. The caller guarantees that the
    /// arrays are consistent, which is checked in debug builds.
    pub(crate) fn new(
        initial_state: StateIndex,
        states: Vec<usize>,
        transition_to: Vec<StateIndex>,
        probabilities: Vec<f64>,
        labelling: Labelling,
        reward_model: Option<RewardModel>,
    ) -> Self {
        debug_assert_eq!(
            transition_to.len(),
            probabilities.len(),
            "There should be a probability for every transition"
        );
        debug_assert_eq!(
            states.last().copied(),
            Some(transition_to.len()),
            "The sentinel state should point to the end of the transitions"
        );
        debug_assert!(
            initial_state.value() + 1 < states.len(),
            "Initial state {initial_state} out of bounds"
        );
        debug_assert_eq!(labelling.num_of_states(), states.len() - 1);

        Self {
            states,
            transition_to,
            probabilities,
            labelling,
            reward_model,
            initial_state,
        }
    }

    /// Returns the reward model of the chain, if any.
    pub fn any_reward_model(&self) -> Option<&RewardModel> {
        self.reward_model.as_ref()
    }
}

impl MarkovChain for Dtmc {
    fn initial_state(&self) -> StateIndex {
        self.initial_state
    }

    fn outgoing_transitions(&self, state_index: StateIndex) -> impl Iterator<Item = Transition> + '_ {
        let start = self.states[state_index.value()];
        let end = self.states[state_index.value() + 1];

        self.transition_to[start..end]
            .iter()
            .zip(self.probabilities[start..end].iter())
            .map(|(&to, &probability)| Transition::new(to, probability))
    }

    fn num_of_states(&self) -> usize {
        // Remove the sentinel state.
        self.states.len() - 1
    }

    fn num_of_transitions(&self) -> usize {
        self.transition_to.len()
    }

    fn labelling(&self) -> &Labelling {
        &self.labelling
    }

    fn reward_model(&self, name: &str) -> Option<&RewardModel> {
        self.reward_model.as_ref().filter(|model| model.name() == name)
    }
}

impl fmt::Debug for Dtmc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "initial state: {}", self.initial_state)?;
        for state_index in self.iter_states() {
            write!(f, "{state_index}")?;
            for label in self.labelling.labels_of(state_index) {
                write!(f, " {label}")?;
            }
            if let Some(reward_model) = &self.reward_model {
                write!(f, " [{}]", reward_model.state_reward(state_index))?;
            }
            writeln!(f)?;

            for transition in self.outgoing_transitions(state_index) {
                writeln!(f, "  -> {} : {}", transition.to, transition.probability)?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for Dtmc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Number of states: {}, number of transitions: {}",
            self.num_of_states(),
            self.num_of_transitions()
        )
    }
}
