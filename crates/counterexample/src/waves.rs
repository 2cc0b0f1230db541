#![forbid(unsafe_code)]

use std::fmt;

use bitvec::bitvec;
use bitvec::order::Lsb0;
use itertools::Itertools;
use log::debug;
use log::trace;

use sketch_markov::MarkovChain;
use sketch_markov::StateIndex;
use sketch_utilities::TagIndex;

use crate::ChoiceHoles;
use crate::CounterexampleError;
use crate::HoleIndex;
use crate::ResolvedChain;

/// A unique type for the waves.
pub struct WaveTag;

/// The index of a wave, wave zero is the exploration before any hole is revealed.
pub type WaveIndex = TagIndex<usize, WaveTag>;

/// Stores for every hole the wave at which it was registered, if it was needed at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoleWaves {
    waves: Vec<Option<WaveIndex>>,
    num_of_waves: usize,
}

impl HoleWaves {
    /// Returns the number of holes.
    pub fn num_of_holes(&self) -> usize {
        self.waves.len()
    }

    /// Returns the number of waves of the exploration that produced this map.
    pub fn num_of_waves(&self) -> usize {
        self.num_of_waves
    }

    /// Returns the wave at which the hole was registered, or `None` when no
    /// reachable state depends on it.
    pub fn wave(&self, hole: HoleIndex) -> Option<WaveIndex> {
        self.waves[hole]
    }

    /// Returns the holes registered at exactly the given wave, in increasing order.
    pub fn registered_at(&self, wave: WaveIndex) -> impl Iterator<Item = HoleIndex> + '_ {
        self.iter()
            .filter_map(move |(hole, registered)| (registered == Some(wave)).then_some(hole))
    }

    /// Iterates over all holes and their registration waves.
    pub fn iter(&self) -> impl Iterator<Item = (HoleIndex, Option<WaveIndex>)> + '_ {
        self.waves
            .iter()
            .enumerate()
            .map(|(hole, wave)| (HoleIndex::new(hole), *wave))
    }
}

/// An ordered partition of the reachable states into waves.
///
/// # Details
///
/// The states of wave `w` are found at positions `waves[w]..waves[w + 1]` of
/// `states`, in the order in which they were explored. Unreachable states do
/// not belong to any wave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WavePartition {
    waves: Vec<usize>,
    states: Vec<StateIndex>,
}

impl WavePartition {
    /// Returns the number of waves, which is at least one.
    pub fn num_of_waves(&self) -> usize {
        self.waves.len() - 1
    }

    /// Returns the last wave.
    pub fn last_wave(&self) -> WaveIndex {
        WaveIndex::new(self.num_of_waves() - 1)
    }

    /// Returns the states of the given wave.
    pub fn states(&self, wave: WaveIndex) -> &[StateIndex] {
        &self.states[self.waves[*wave]..self.waves[*wave + 1]]
    }

    /// Returns the number of reachable states.
    pub fn num_of_states(&self) -> usize {
        self.states.len()
    }

    /// Iterates over all waves.
    pub fn iter_waves(&self) -> impl DoubleEndedIterator<Item = WaveIndex> + ExactSizeIterator {
        WaveIndex::range(self.num_of_waves())
    }
}

impl fmt::Display for WavePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for wave in self.iter_waves() {
            writeln!(f, "wave {wave}: {{{}}}", self.states(wave).iter().format(", "))?;
        }

        Ok(())
    }
}

/// Partitions the reachable states of the chain into waves, and determines at
/// which wave every hole has to be revealed.
///
/// # Details
///
/// States whose holes are all registered are explored depth first. When only
/// blocked states remain, i.e. states with unregistered holes, the one with
/// the fewest unregistered holes is chosen, where ties are broken in favour of
/// the state that was discovered first. A new wave starts and all its holes
/// are registered at that wave, which may unblock other states as well. Every
/// wave except the first registers at least one hole, so there are at most
/// `num_of_holes + 1` waves.
pub fn compute_waves(
    chain: &ResolvedChain,
    choice_holes: &ChoiceHoles,
) -> Result<(HoleWaves, WavePartition), CounterexampleError> {
    let dtmc = chain.dtmc();

    // The holes of a state are determined by its quotient choice.
    for state_index in dtmc.iter_states() {
        let choice = chain.choice(state_index);
        if *choice >= choice_holes.num_of_choices() {
            return Err(CounterexampleError::ChoiceOutOfBounds {
                state: *state_index,
                choice: *choice,
                num_of_choices: choice_holes.num_of_choices(),
            });
        }
    }
    let holes_of = |state_index: StateIndex| choice_holes.holes(chain.choice(state_index));

    let mut hole_waves: Vec<Option<WaveIndex>> = vec![None; choice_holes.num_of_holes()];
    let count_unregistered = |hole_waves: &[Option<WaveIndex>], state_index: StateIndex| {
        holes_of(state_index)
            .iter()
            .filter(|&&hole| hole_waves[hole].is_none())
            .count()
    };

    let mut waves = vec![0];
    let mut states = Vec::with_capacity(dtmc.num_of_states());

    let mut non_blocking: Vec<StateIndex> = Vec::new();
    let mut blocking: Vec<(StateIndex, usize)> = Vec::new();
    let mut reachable = bitvec![usize, Lsb0; 0; dtmc.num_of_states()];

    let initial = dtmc.initial_state();
    reachable.set(*initial, true);
    classify(
        initial,
        count_unregistered(&hole_waves, initial),
        &mut non_blocking,
        &mut blocking,
    );

    let mut current_wave = WaveIndex::new(0);
    loop {
        while let Some(state_index) = non_blocking.pop() {
            states.push(state_index);

            for transition in dtmc.outgoing_transitions(state_index) {
                if !reachable[*transition.to] {
                    reachable.set(*transition.to, true);
                    classify(
                        transition.to,
                        count_unregistered(&hole_waves, transition.to),
                        &mut non_blocking,
                        &mut blocking,
                    );
                }
            }
        }

        // The first state with the fewest unregistered holes determines the next wave.
        let Some(&(candidate, _)) = blocking.iter().min_by_key(|(_, unregistered)| *unregistered) else {
            break;
        };

        waves.push(states.len());
        current_wave = current_wave.next();

        for &hole in holes_of(candidate) {
            if hole_waves[hole].is_none() {
                hole_waves[hole] = Some(current_wave);
            }
        }

        // Unblocked states are moved to the stack in the order of discovery.
        blocking.retain_mut(|(state_index, unregistered)| {
            *unregistered = count_unregistered(&hole_waves, *state_index);
            if *unregistered == 0 {
                non_blocking.push(*state_index);
                false
            } else {
                true
            }
        });

        debug!(
            "Wave {current_wave}: revealed holes {{{}}} for state {candidate}, {} states remain blocked",
            hole_waves
                .iter()
                .enumerate()
                .filter(|(_, wave)| **wave == Some(current_wave))
                .map(|(hole, _)| hole)
                .format(", "),
            blocking.len()
        );
    }
    waves.push(states.len());

    let partition = WavePartition { waves, states };
    debug!(
        "Partitioned {} reachable states into {} waves",
        partition.num_of_states(),
        partition.num_of_waves()
    );

    Ok((
        HoleWaves {
            waves: hole_waves,
            num_of_waves: partition.num_of_waves(),
        },
        partition,
    ))
}

/// Places a newly reached state on the stack, or on the blocking list when it has unregistered holes.
fn classify(
    state_index: StateIndex,
    unregistered: usize,
    non_blocking: &mut Vec<StateIndex>,
    blocking: &mut Vec<(StateIndex, usize)>,
) {
    if unregistered == 0 {
        trace!("State {state_index} is not blocking");
        non_blocking.push(state_index);
    } else {
        trace!("State {state_index} is blocked by {unregistered} holes");
        blocking.push((state_index, unregistered));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use sketch_markov::DtmcBuilder;

    fn holes(indices: &[usize]) -> Vec<HoleIndex> {
        indices.iter().map(|&index| HoleIndex::new(index)).collect()
    }

    /// The chain 0 -> {1, 2}, 1 -> 3, 2 -> 3 and 3 -> 3 where state 1 needs
    /// holes 0 and 1, state 2 needs hole 1 and state 3 needs hole 2.
    fn diamond() -> (ResolvedChain, ChoiceHoles) {
        let mut builder = DtmcBuilder::new(4);
        builder.add_transition(StateIndex::new(0), 0.5, StateIndex::new(1));
        builder.add_transition(StateIndex::new(0), 0.5, StateIndex::new(2));
        builder.add_transition(StateIndex::new(1), 1.0, StateIndex::new(3));
        builder.add_transition(StateIndex::new(2), 1.0, StateIndex::new(3));
        builder.add_transition(StateIndex::new(3), 1.0, StateIndex::new(3));
        let chain = ResolvedChain::identity(builder.finish(StateIndex::new(0)).unwrap());

        let choice_holes = ChoiceHoles::new(4, vec![holes(&[]), holes(&[0, 1]), holes(&[1]), holes(&[2])]).unwrap();
        (chain, choice_holes)
    }

    #[test]
    fn test_compute_waves() {
        let (chain, choice_holes) = diamond();
        let (hole_waves, partition) = compute_waves(&chain, &choice_holes).unwrap();

        // State 2 is the cheapest, after which state 1 needs only hole 0 and state 3 hole 2.
        assert_eq!(partition.num_of_waves(), 4);
        assert_eq!(partition.states(WaveIndex::new(0)), &[StateIndex::new(0)]);
        assert_eq!(partition.states(WaveIndex::new(1)), &[StateIndex::new(2)]);
        assert_eq!(partition.states(WaveIndex::new(2)), &[StateIndex::new(1)]);
        assert_eq!(partition.states(WaveIndex::new(3)), &[StateIndex::new(3)]);

        assert_eq!(hole_waves.wave(HoleIndex::new(0)), Some(WaveIndex::new(2)));
        assert_eq!(hole_waves.wave(HoleIndex::new(1)), Some(WaveIndex::new(1)));
        assert_eq!(hole_waves.wave(HoleIndex::new(2)), Some(WaveIndex::new(3)));
        assert_eq!(hole_waves.wave(HoleIndex::new(3)), None);
        assert_eq!(
            hole_waves.registered_at(WaveIndex::new(1)).collect::<Vec<_>>(),
            holes(&[1])
        );
    }

    #[test]
    fn test_blocking_initial_state() {
        let (chain, _) = diamond();
        let choice_holes = ChoiceHoles::new(1, vec![holes(&[0]), holes(&[0]), holes(&[0]), holes(&[])]).unwrap();

        let (hole_waves, partition) = compute_waves(&chain, &choice_holes).unwrap();

        // Wave zero is empty, revealing the only hole unblocks everything.
        assert_eq!(partition.num_of_waves(), 2);
        assert!(partition.states(WaveIndex::new(0)).is_empty());
        assert_eq!(partition.states(WaveIndex::new(1)).len(), 4);
        assert_eq!(hole_waves.wave(HoleIndex::new(0)), Some(WaveIndex::new(1)));
    }

    #[test]
    fn test_choice_out_of_bounds() {
        let (chain, _) = diamond();
        let choice_holes = ChoiceHoles::new(1, vec![holes(&[]), holes(&[0])]).unwrap();

        assert!(matches!(
            compute_waves(&chain, &choice_holes),
            Err(CounterexampleError::ChoiceOutOfBounds { state: 2, .. })
        ));
    }
}
