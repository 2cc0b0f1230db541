#![forbid(unsafe_code)]

use sketch_markov::Dtmc;
use sketch_markov::MarkovChain;
use sketch_markov::StateIndex;

use crate::ChoiceIndex;
use crate::CounterexampleError;
use crate::QuotientStateIndex;

/// A Markov chain obtained by fixing every hole of the sketch, together with
/// the origin of its states in the quotient model.
///
/// Every state of the chain corresponds to a state of the quotient model, and
/// its single outgoing distribution corresponds to one choice of that quotient
/// state, which determines the holes the state depends on.
#[derive(Clone, Debug)]
pub struct ResolvedChain {
    dtmc: Dtmc,
    state_map: Vec<QuotientStateIndex>,
    choice_map: Vec<ChoiceIndex>,
}

impl ResolvedChain {
    /// Combines the chain with its state and choice maps, which must cover
    /// every state of the chain.
    pub fn new(
        dtmc: Dtmc,
        state_map: Vec<QuotientStateIndex>,
        choice_map: Vec<ChoiceIndex>,
    ) -> Result<Self, CounterexampleError> {
        if state_map.len() != dtmc.num_of_states() {
            return Err(CounterexampleError::IncompleteMap {
                map: "state",
                expected: dtmc.num_of_states(),
                found: state_map.len(),
            });
        }

        if choice_map.len() != dtmc.num_of_states() {
            return Err(CounterexampleError::IncompleteMap {
                map: "choice",
                expected: dtmc.num_of_states(),
                found: choice_map.len(),
            });
        }

        Ok(Self {
            dtmc,
            state_map,
            choice_map,
        })
    }

    /// Uses the chain itself as quotient model, where state `s` has choice `s`.
    pub fn identity(dtmc: Dtmc) -> Self {
        let num_of_states = dtmc.num_of_states();
        Self {
            dtmc,
            state_map: QuotientStateIndex::range(num_of_states).collect(),
            choice_map: ChoiceIndex::range(num_of_states).collect(),
        }
    }

    /// Returns the underlying chain.
    pub fn dtmc(&self) -> &Dtmc {
        &self.dtmc
    }

    /// Returns the quotient state of the given state.
    pub fn quotient_state(&self, state_index: StateIndex) -> QuotientStateIndex {
        self.state_map[*state_index]
    }

    /// Returns the quotient choice that defines the transitions of the given state.
    pub fn choice(&self, state_index: StateIndex) -> ChoiceIndex {
        self.choice_map[*state_index]
    }
}
