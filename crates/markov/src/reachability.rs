#![forbid(unsafe_code)]

use std::collections::VecDeque;

use bitvec::bitvec;
use bitvec::order::Lsb0;

use crate::MarkovChain;
use crate::StateIndex;
use crate::StateSet;

/// Computes the set of states that are reachable from the initial state.
pub fn reachable_states(chain: &impl MarkovChain) -> StateSet {
    let mut visited = bitvec![usize, Lsb0; 0; chain.num_of_states()];

    let mut queue = VecDeque::new();
    let initial = chain.initial_state();
    queue.push_back(initial);
    visited.set(*initial, true);

    while let Some(state_index) = queue.pop_front() {
        for transition in chain.outgoing_transitions(state_index) {
            if !visited[*transition.to] {
                visited.set(*transition.to, true);
                queue.push_back(transition.to);
            }
        }
    }

    visited
}

/// Stores the predecessors of every state of a chain, ignoring probabilities.
pub struct Predecessors {
    edges_from: Vec<StateIndex>,
    state_to_predecessors: Vec<usize>,
}

impl Predecessors {
    /// Computes the predecessors for the given chain.
    pub fn new(chain: &impl MarkovChain) -> Self {
        let mut state_to_predecessors = vec![0usize; chain.num_of_states() + 1];

        // Count the number of incoming transitions of every state.
        for state_index in chain.iter_states() {
            for transition in chain.outgoing_transitions(state_index) {
                state_to_predecessors[transition.to] += 1;
            }
        }

        // Compute the start offsets.
        state_to_predecessors.iter_mut().fold(0, |offset, start| {
            let new_offset = offset + *start;
            *start = offset;
            new_offset
        });

        // Place the edges, this increments every offset to the start of the next state.
        let mut edges_from = vec![StateIndex::new(0); chain.num_of_transitions()];
        for state_index in chain.iter_states() {
            for transition in chain.outgoing_transitions(state_index) {
                let start = &mut state_to_predecessors[transition.to];
                edges_from[*start] = state_index;
                *start += 1;
            }
        }

        state_to_predecessors.iter_mut().fold(0, |previous, start| {
            let result = *start;
            *start = previous;
            result
        });

        let num_of_states = chain.num_of_states();
        state_to_predecessors[num_of_states] = edges_from.len();

        Self {
            edges_from,
            state_to_predecessors,
        }
    }

    /// Returns the predecessors of the given state, with a repetition for every incoming transition.
    pub fn predecessors(&self, state_index: StateIndex) -> impl Iterator<Item = StateIndex> + '_ {
        let start = self.state_to_predecessors[*state_index];
        let end = self.state_to_predecessors[*state_index + 1];
        self.edges_from[start..end].iter().copied()
    }
}

/// Computes the states that can reach a state in `initial` by a backward
/// search, only passing through states for which `through` holds. The states
/// in `initial` are always part of the result.
pub fn backward_reachable<F>(predecessors: &Predecessors, initial: &StateSet, through: F) -> StateSet
where
    F: Fn(StateIndex) -> bool,
{
    let mut result = initial.clone();
    let mut stack: Vec<StateIndex> = initial.iter_ones().map(StateIndex::new).collect();

    while let Some(state_index) = stack.pop() {
        for predecessor in predecessors.predecessors(state_index) {
            if !result[*predecessor] && through(predecessor) {
                result.set(*predecessor, true);
                stack.push(predecessor);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use sketch_utilities::random_test;

    use crate::DtmcBuilder;
    use crate::random_dtmc;

    #[test]
    fn test_reachable_states() {
        // State 2 is unreachable.
        let mut builder = DtmcBuilder::new(4);
        builder.add_transition(StateIndex::new(0), 0.5, StateIndex::new(1));
        builder.add_transition(StateIndex::new(0), 0.5, StateIndex::new(3));
        builder.add_transition(StateIndex::new(1), 1.0, StateIndex::new(1));
        builder.add_transition(StateIndex::new(2), 1.0, StateIndex::new(0));
        builder.add_transition(StateIndex::new(3), 1.0, StateIndex::new(0));
        let dtmc = builder.finish(StateIndex::new(0)).unwrap();

        let reachable = reachable_states(&dtmc);
        assert_eq!(reachable.iter_ones().collect::<Vec<_>>(), vec![0, 1, 3]);

        let predecessors = Predecessors::new(&dtmc);
        let mut of_zero: Vec<StateIndex> = predecessors.predecessors(StateIndex::new(0)).collect();
        of_zero.sort();
        assert_eq!(of_zero, vec![StateIndex::new(2), StateIndex::new(3)]);

        let mut initial = bitvec![usize, Lsb0; 0; 4];
        initial.set(1, true);
        let backward = backward_reachable(&predecessors, &initial, |state| *state != 3);
        assert_eq!(backward.iter_ones().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_random_predecessors() {
        random_test(100, |rng| {
            let dtmc = random_dtmc(rng, 10, 3);
            let predecessors = Predecessors::new(&dtmc);

            for state_index in dtmc.iter_states() {
                for transition in dtmc.outgoing_transitions(state_index) {
                    assert!(
                        predecessors
                            .predecessors(transition.to)
                            .any(|predecessor| predecessor == state_index)
                    );
                }
            }
        });
    }
}
