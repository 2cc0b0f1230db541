#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use rustc_hash::FxHashMap;

use crate::StateIndex;

/// A set of states, indexed by the state index.
pub type StateSet = BitVec<usize, Lsb0>;

/// Assigns a set of named labels to every state, stored as one state set per label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labelling {
    num_of_states: usize,

    /// The names of the labels, in the order they were introduced.
    names: Vec<String>,
    sets: Vec<StateSet>,

    index: FxHashMap<String, usize>,
}

impl Labelling {
    /// Creates a labelling without any labels for the given number of states.
    pub fn new(num_of_states: usize) -> Self {
        Self {
            num_of_states,
            ..Default::default()
        }
    }

    /// Returns the number of states this labelling is defined for.
    pub fn num_of_states(&self) -> usize {
        self.num_of_states
    }

    /// Introduces the label (if it does not exist yet) and returns its state set.
    pub fn add_label(&mut self, name: &str) -> &mut StateSet {
        let index = match self.index.get(name) {
            Some(&index) => index,
            None => {
                let index = self.names.len();
                self.names.push(name.to_string());
                self.sets.push(bitvec![usize, Lsb0; 0; self.num_of_states]);
                self.index.insert(name.to_string(), index);
                index
            }
        };

        &mut self.sets[index]
    }

    /// Adds the given label to the state.
    pub fn add_state(&mut self, state_index: StateIndex, name: &str) {
        self.add_label(name).set(*state_index, true);
    }

    /// Replaces the states of the given label.
    pub fn set_label(&mut self, name: &str, states: StateSet) {
        debug_assert_eq!(states.len(), self.num_of_states, "The state set should cover all states");
        *self.add_label(name) = states;
    }

    /// Returns the states carrying the given label.
    pub fn get(&self, name: &str) -> Option<&StateSet> {
        self.index.get(name).map(|&index| &self.sets[index])
    }

    /// Returns true iff the given state carries the label.
    pub fn has_label(&self, state_index: StateIndex, name: &str) -> bool {
        self.get(name).is_some_and(|states| states[*state_index])
    }

    /// Returns the names of all labels.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|name| name.as_str())
    }

    /// Returns the names of the labels carried by the given state.
    pub fn labels_of(&self, state_index: StateIndex) -> impl Iterator<Item = &str> + '_ {
        self.names
            .iter()
            .zip(self.sets.iter())
            .filter(move |(_, states)| states[*state_index])
            .map(|(name, _)| name.as_str())
    }

    /// Extends the labelling with unlabelled states until it covers the given number of states.
    pub fn resize(&mut self, num_of_states: usize) {
        debug_assert!(num_of_states >= self.num_of_states, "Labellings can only grow");

        self.num_of_states = num_of_states;
        for states in self.sets.iter_mut() {
            states.resize(num_of_states, false);
        }
    }
}
