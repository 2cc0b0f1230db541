#![forbid(unsafe_code)]

use std::collections::VecDeque;

use rand::Rng;
use rand::seq::IndexedRandom;

use sketch_markov::DtmcBuilder;
use sketch_markov::StateIndex;

use crate::ChoiceHoles;
use crate::ChoiceIndex;
use crate::HoleIndex;
use crate::QuotientStateIndex;
use crate::ResolvedChain;

/// The number of options of every hole.
const NUM_OF_OPTIONS: usize = 2;

/// A randomly generated family of chains, used to test critical hole sets.
///
/// # Details
///
/// Every quotient state is controlled by up to two holes, and has one choice
/// per option. The option of a state is the sum of the values of its holes
/// modulo the number of options, so the choice of a state is determined by
/// exactly the holes controlling it. Choices have random successors, and the
/// reward of a state depends on its choice.
pub struct RandomSketch {
    num_of_holes: usize,
    controllers: Vec<Vec<HoleIndex>>,
    choices: Vec<Vec<(QuotientStateIndex, f64)>>,
    choice_rewards: Vec<f64>,
    targets: Vec<bool>,
    choice_holes: ChoiceHoles,
}

impl RandomSketch {
    /// Generates a sketch with the given number of quotient states and holes.
    pub fn random(rng: &mut impl Rng, num_of_states: usize, num_of_holes: usize, outdegree: usize) -> Self {
        assert!(num_of_states > 0, "A sketch needs at least an initial state");
        assert!(outdegree > 0, "Every choice needs at least one successor");

        let holes: Vec<HoleIndex> = HoleIndex::range(num_of_holes).collect();
        let mut controllers = Vec::with_capacity(num_of_states);
        let mut targets = Vec::with_capacity(num_of_states);
        let mut choices = Vec::with_capacity(num_of_states * NUM_OF_OPTIONS);
        let mut choice_rewards = Vec::with_capacity(num_of_states * NUM_OF_OPTIONS);

        for _ in 0..num_of_states {
            let num_of_controllers = if holes.is_empty() { 0 } else { rng.random_range(0..=2) };
            let mut controller: Vec<HoleIndex> = holes.choose_multiple(rng, num_of_controllers).copied().collect();
            controller.sort();
            controllers.push(controller);
            targets.push(rng.random_bool(0.2));

            for _ in 0..NUM_OF_OPTIONS {
                let successors: Vec<(usize, u32)> = (0..rng.random_range(1..=outdegree))
                    .map(|_| (rng.random_range(0..num_of_states), rng.random_range(1..=4u32)))
                    .collect();
                let total: u32 = successors.iter().map(|(_, weight)| weight).sum();

                choices.push(
                    successors
                        .into_iter()
                        .map(|(to, weight)| (QuotientStateIndex::new(to), weight as f64 / total as f64))
                        .collect(),
                );
                choice_rewards.push(rng.random_range(0..3u32) as f64);
            }
        }

        let choice_holes = ChoiceHoles::new(
            num_of_holes,
            controllers
                .iter()
                .flat_map(|controller| std::iter::repeat_n(controller.clone(), NUM_OF_OPTIONS)),
        )
        .expect("Controllers are drawn from the existing holes");

        Self {
            num_of_holes,
            controllers,
            choices,
            choice_rewards,
            targets,
            choice_holes,
        }
    }

    /// Returns the number of holes.
    pub fn num_of_holes(&self) -> usize {
        self.num_of_holes
    }

    /// Returns the number of quotient states.
    pub fn num_of_states(&self) -> usize {
        self.controllers.len()
    }

    /// Returns the holes of every choice.
    pub fn choice_holes(&self) -> &ChoiceHoles {
        &self.choice_holes
    }

    /// Returns a random value for every hole.
    pub fn random_assignment(&self, rng: &mut impl Rng) -> Vec<usize> {
        (0..self.num_of_holes)
            .map(|_| rng.random_range(0..NUM_OF_OPTIONS))
            .collect()
    }

    /// Returns every assignment of values to the holes.
    pub fn all_assignments(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        let num_of_assignments = NUM_OF_OPTIONS.pow(self.num_of_holes as u32);
        (0..num_of_assignments).map(|mut number| {
            (0..self.num_of_holes)
                .map(|_| {
                    let value = number % NUM_OF_OPTIONS;
                    number /= NUM_OF_OPTIONS;
                    value
                })
                .collect()
        })
    }

    /// Builds the reachable part of the chain for the given assignment. The
    /// states are labelled `target` and carry the reward model `cost`.
    pub fn resolve(&self, assignment: &[usize]) -> ResolvedChain {
        self.resolve_from(assignment, QuotientStateIndex::new(0))
    }

    /// Same as [RandomSketch::resolve], but the chain starts in the given quotient state.
    pub fn resolve_from(&self, assignment: &[usize], initial: QuotientStateIndex) -> ResolvedChain {
        assert_eq!(assignment.len(), self.num_of_holes, "Every hole needs a value");

        let choice_of = |state: QuotientStateIndex| {
            let option = self.controllers[state]
                .iter()
                .map(|&hole| assignment[hole])
                .sum::<usize>()
                % NUM_OF_OPTIONS;
            ChoiceIndex::new(*state * NUM_OF_OPTIONS + option)
        };

        // Number the reachable quotient states in breadth first order.
        let mut index: Vec<Option<StateIndex>> = vec![None; self.controllers.len()];
        let mut state_map = Vec::new();
        let mut choice_map = Vec::new();
        let mut queue = VecDeque::new();

        let mut builder = DtmcBuilder::new(1);
        builder.ensure_label("target");

        index[initial] = Some(StateIndex::new(0));
        state_map.push(initial);
        queue.push_back(initial);

        while let Some(state) = queue.pop_front() {
            let Some(state_index) = index[state] else {
                unreachable!("Queued states are always numbered");
            };

            let choice = choice_of(state);
            choice_map.push(choice);
            if self.targets[state] {
                builder.add_label(state_index, "target");
            }
            builder.set_state_reward("cost", state_index, self.choice_rewards[choice]);

            for &(to, probability) in &self.choices[choice] {
                let to_index = match index[to] {
                    Some(to_index) => to_index,
                    None => {
                        let to_index = StateIndex::new(state_map.len());
                        index[to] = Some(to_index);
                        state_map.push(to);
                        queue.push_back(to);
                        to_index
                    }
                };
                builder.add_transition(state_index, probability, to_index);
            }
        }

        let dtmc = builder
            .finish(StateIndex::new(0))
            .expect("Normalised random weights always form a valid chain");
        ResolvedChain::new(dtmc, state_map, choice_map).expect("Every reachable state has been mapped")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use sketch_markov::MarkovChain;
    use sketch_utilities::random_test;

    #[test]
    fn test_random_sketch() {
        random_test(100, |rng| {
            let sketch = RandomSketch::random(rng, 10, 4, 3);
            let chain = sketch.resolve(&sketch.random_assignment(rng));

            for state_index in chain.dtmc().iter_states() {
                let choice = chain.choice(state_index);
                assert_eq!(*choice / 2, *chain.quotient_state(state_index));
                assert!(sketch.choice_holes().holes(choice).len() <= 2);
            }
        });
    }

    #[test]
    fn test_random_sketch_resolve_from() {
        random_test(100, |rng| {
            let sketch = RandomSketch::random(rng, 6, 3, 2);
            assert_eq!(sketch.all_assignments().count(), 8);

            for assignment in sketch.all_assignments() {
                let initial = QuotientStateIndex::new(rng.random_range(0..sketch.num_of_states()));
                let chain = sketch.resolve_from(&assignment, initial);
                assert_eq!(chain.quotient_state(chain.dtmc().initial_state()), initial);
            }
        });
    }
}
