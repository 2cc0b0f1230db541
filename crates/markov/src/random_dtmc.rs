#![forbid(unsafe_code)]

use rand::Rng;

use crate::Dtmc;
use crate::DtmcBuilder;
use crate::StateIndex;

/// Generates a random chain with the given number of states, in which every
/// state has between one and `outdegree` successors. Roughly a quarter of the
/// states is labelled `target`, and the reward model `cost` assigns small
/// integer rewards.
pub fn random_dtmc(rng: &mut impl Rng, num_of_states: usize, outdegree: usize) -> Dtmc {
    assert!(num_of_states > 0, "A chain needs at least an initial state");
    assert!(outdegree > 0, "Every state needs at least one successor");

    let mut builder = DtmcBuilder::with_capacity(num_of_states, num_of_states * outdegree);

    for state_index in StateIndex::range(num_of_states) {
        let successors: Vec<(usize, u32)> = (0..rng.random_range(1..=outdegree))
            .map(|_| (rng.random_range(0..num_of_states), rng.random_range(1..=4u32)))
            .collect();
        let total: u32 = successors.iter().map(|(_, weight)| weight).sum();

        for (to, weight) in successors {
            builder.add_transition(state_index, weight as f64 / total as f64, StateIndex::new(to));
        }

        if rng.random_bool(0.25) {
            builder.add_label(state_index, "target");
        }
        builder.set_state_reward("cost", state_index, rng.random_range(0..3u32) as f64);
    }

    // Ensure the label exists even when no state was chosen.
    builder.ensure_label("target");

    builder
        .finish(StateIndex::new(0))
        .expect("Normalised random weights always form a valid chain")
}
