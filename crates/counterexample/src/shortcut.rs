#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use log::debug;
use smallvec::SmallVec;
use smallvec::smallvec;

use sketch_markov::Formula;
use sketch_markov::Labelling;
use sketch_markov::MarkovChain;
use sketch_markov::Property;
use sketch_markov::RewardModel;
use sketch_markov::StateIndex;
use sketch_markov::Transition;
use sketch_utilities::debug_trace;

use crate::CounterexampleError;
use crate::QuotientBounds;
use crate::ResolvedChain;

/// The label of the states that count as target in the shortcut chain.
pub const SHORTCUT_TARGET_LABEL: &str = "shortcut_target";

/// The label of the sink that represents not reaching the target.
pub const SINK_FALSE_LABEL: &str = "sink_false";

/// The label of the sink that represents reaching the target.
pub const SINK_TRUE_LABEL: &str = "sink_true";

/// The outgoing transitions of one state, most unexpanded states have two.
type Row = SmallVec<[Transition; 2]>;

/// A working approximation of a resolved chain in which the states that are
/// not yet expanded move directly to one of two sink states.
///
/// # Details
///
/// The chain consists of the states of the resolved chain followed by the two
/// sinks `sink_false` and `sink_true`, which loop with probability one. An
/// unexpanded state `s` with bound `b` moves to `sink_true` with probability
/// `b` and to `sink_false` with probability `1 - b`. For expected rewards it
/// moves to `sink_true` with probability one and collects reward `b`. Only
/// positive probabilities are stored.
///
/// Probability bounds must be finite and are clamped to `[0, 1]`, reward
/// bounds must be non-negative but may be infinite.
///
/// When the quotient model provides no bound the trivial one is used: zero for
/// upper bounded properties, and one (probabilities) or infinity (rewards) for
/// lower bounded properties. This way the shortcut value never overestimates
/// the value of the chain for upper bounds, and never underestimates it for
/// lower bounds, regardless of the transitions that are still hidden.
pub struct ShortcutChain<'a> {
    chain: &'a ResolvedChain,

    /// The property with its target replaced by [SHORTCUT_TARGET_LABEL].
    property: Property,

    rows: Vec<Row>,
    expanded: BitVec<usize, Lsb0>,
    num_of_expanded: usize,
    num_of_transitions: usize,

    labelling: Labelling,
    reward_model: Option<RewardModel>,

    sink_false: StateIndex,
    sink_true: StateIndex,
}

impl<'a> ShortcutChain<'a> {
    /// Creates the shortcut chain in which no state is expanded yet.
    pub fn new(
        chain: &'a ResolvedChain,
        bounds: &QuotientBounds,
        property: &Property,
    ) -> Result<Self, CounterexampleError> {
        let dtmc = chain.dtmc();
        let num_of_states = dtmc.num_of_states();
        let sink_false = StateIndex::new(num_of_states);
        let sink_true = StateIndex::new(num_of_states + 1);

        let target_label = property.formula.target();
        let targets = dtmc
            .labelling()
            .get(target_label)
            .ok_or_else(|| CounterexampleError::UnknownLabel(target_label.to_string()))?;

        if let Formula::Probability {
            constraint: Some(constraint),
            ..
        } = &property.formula
        {
            if dtmc.labelling().get(constraint).is_none() {
                return Err(CounterexampleError::UnknownLabel(constraint.clone()));
            }
        }

        // The labels of the chain are kept so that constraints of until formulas still apply.
        let mut labelling = dtmc.labelling().clone();
        labelling.resize(num_of_states + 2);
        labelling.add_state(sink_false, SINK_FALSE_LABEL);
        labelling.add_state(sink_true, SINK_TRUE_LABEL);

        let mut shortcut_targets = targets.clone();
        shortcut_targets.resize(num_of_states + 2, false);
        shortcut_targets.set(*sink_true, true);
        for state_index in dtmc.iter_states() {
            if bounds.is_target(chain.quotient_state(state_index)) {
                shortcut_targets.set(*state_index, true);
            }
        }
        labelling.set_label(SHORTCUT_TARGET_LABEL, shortcut_targets);

        let mut rows: Vec<Row> = Vec::with_capacity(num_of_states + 2);
        let mut reward_model = None;

        match &property.formula {
            Formula::Probability { .. } => {
                let default_bound = if property.is_safety() { 0.0 } else { 1.0 };

                for state_index in dtmc.iter_states() {
                    let quotient_state = chain.quotient_state(state_index);
                    let bound = match bounds.bound(quotient_state) {
                        Some(bound) if !bound.is_finite() => {
                            return Err(CounterexampleError::InvalidBound {
                                state: *quotient_state,
                                bound,
                                kind: "probability",
                            });
                        }
                        Some(bound) => bound.clamp(0.0, 1.0),
                        None => default_bound,
                    };

                    let mut row = Row::new();
                    if bound < 1.0 {
                        row.push(Transition::new(sink_false, 1.0 - bound));
                    }
                    if bound > 0.0 {
                        row.push(Transition::new(sink_true, bound));
                    }
                    rows.push(row);
                }
            }
            Formula::Reward {
                reward_model: name, ..
            } => {
                if dtmc.reward_model(name).is_none() {
                    return Err(CounterexampleError::UnknownRewardModel(name.clone()));
                }

                let default_bound = if property.is_safety() { 0.0 } else { f64::INFINITY };
                let mut rewards = Vec::with_capacity(num_of_states + 2);
                for state_index in dtmc.iter_states() {
                    let quotient_state = chain.quotient_state(state_index);
                    let bound = match bounds.bound(quotient_state) {
                        // Infinite rewards are valid bounds, they mean that the target may be missed.
                        Some(bound) if bound.is_nan() || bound < 0.0 => {
                            return Err(CounterexampleError::InvalidBound {
                                state: *quotient_state,
                                bound,
                                kind: "expected reward",
                            });
                        }
                        Some(bound) => bound,
                        None => default_bound,
                    };
                    rewards.push(bound);
                    rows.push(smallvec![Transition::new(sink_true, 1.0)]);
                }

                rewards.extend([0.0, 0.0]);
                reward_model = Some(RewardModel::new(name.clone(), rewards));
            }
        }

        rows.push(smallvec![Transition::new(sink_false, 1.0)]);
        rows.push(smallvec![Transition::new(sink_true, 1.0)]);
        let num_of_transitions = rows.iter().map(|row| row.len()).sum();

        debug!("Created the shortcut chain with {num_of_transitions} transitions");
        Ok(Self {
            chain,
            property: property.with_target(SHORTCUT_TARGET_LABEL),
            rows,
            expanded: bitvec![usize, Lsb0; 0; num_of_states],
            num_of_expanded: 0,
            num_of_transitions,
            labelling,
            reward_model,
            sink_false,
            sink_true,
        })
    }

    /// Replaces the shortcut transitions (and reward) of the given states by
    /// their exact transitions in the resolved chain. States that are already
    /// expanded are ignored.
    pub fn expand(&mut self, states: &[StateIndex]) {
        let chain = self.chain;
        let dtmc = chain.dtmc();

        for &state_index in states {
            if self.expanded[*state_index] {
                continue;
            }
            debug_trace!("Expanding state {state_index}");

            let row: Row = dtmc.outgoing_transitions(state_index).collect();
            self.num_of_transitions = self.num_of_transitions - self.rows[state_index].len() + row.len();
            self.rows[state_index] = row;

            if let Some(reward_model) = &mut self.reward_model {
                let reward = dtmc
                    .reward_model(reward_model.name())
                    .map_or(0.0, |exact| exact.state_reward(state_index));
                reward_model.set_state_reward(state_index, reward);
            }

            self.expanded.set(*state_index, true);
            self.num_of_expanded += 1;
        }
    }

    /// Returns the property that must be checked on the shortcut chain.
    pub fn property(&self) -> &Property {
        &self.property
    }

    /// Returns true iff the given state of the resolved chain has been expanded.
    pub fn is_expanded(&self, state_index: StateIndex) -> bool {
        self.expanded[*state_index]
    }

    /// Returns the number of expanded states.
    pub fn num_of_expanded(&self) -> usize {
        self.num_of_expanded
    }

    /// Returns the sink that represents not reaching the target.
    pub fn sink_false(&self) -> StateIndex {
        self.sink_false
    }

    /// Returns the sink that represents reaching the target.
    pub fn sink_true(&self) -> StateIndex {
        self.sink_true
    }
}

impl MarkovChain for ShortcutChain<'_> {
    fn initial_state(&self) -> StateIndex {
        self.chain.dtmc().initial_state()
    }

    fn outgoing_transitions(&self, state_index: StateIndex) -> impl Iterator<Item = Transition> + '_ {
        self.rows[state_index].iter().copied()
    }

    fn num_of_states(&self) -> usize {
        self.rows.len()
    }

    fn num_of_transitions(&self) -> usize {
        self.num_of_transitions
    }

    fn labelling(&self) -> &Labelling {
        &self.labelling
    }

    fn reward_model(&self, name: &str) -> Option<&RewardModel> {
        self.reward_model.as_ref().filter(|model| model.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use sketch_markov::CheckResult;
    use sketch_markov::Comparison;
    use sketch_markov::DtmcBuilder;
    use sketch_markov::ModelChecker;
    use sketch_markov::STOCHASTIC_TOLERANCE;
    use sketch_markov::ValueIterationChecker;

    use crate::QuotientStateIndex;

    /// The chain 0 -> 1 -> 2 where state 2 is the target, and every state costs one.
    fn line() -> ResolvedChain {
        let mut builder = DtmcBuilder::new(3);
        builder.add_transition(StateIndex::new(0), 1.0, StateIndex::new(1));
        builder.add_transition(StateIndex::new(1), 1.0, StateIndex::new(2));
        builder.add_transition(StateIndex::new(2), 1.0, StateIndex::new(2));
        builder.add_label(StateIndex::new(2), "target");
        for state in 0..3 {
            builder.set_state_reward("cost", StateIndex::new(state), 1.0);
        }
        ResolvedChain::identity(builder.finish(StateIndex::new(0)).unwrap())
    }

    fn assert_stochastic(shortcut: &ShortcutChain<'_>) {
        for state_index in shortcut.iter_states() {
            let sum: f64 = shortcut
                .outgoing_transitions(state_index)
                .map(|transition| transition.probability)
                .sum();
            assert!((sum - 1.0).abs() < STOCHASTIC_TOLERANCE, "State {state_index} sums up to {sum}");
        }
    }

    fn initial_value(shortcut: &ShortcutChain<'_>) -> f64 {
        let result = ValueIterationChecker::default()
            .check(shortcut, shortcut.property())
            .unwrap();
        match result {
            CheckResult::Quantitative(values) => values[shortcut.initial_state()],
            CheckResult::Qualitative(_) => panic!("Expected a quantitative result"),
        }
    }

    #[test]
    fn test_shortcut_probability() {
        let chain = line();
        let mut bounds = QuotientBounds::new(3);
        bounds.set_bound(QuotientStateIndex::new(1), 0.25);
        let property = Property::reachability("target", Comparison::Less, 0.5);

        let mut shortcut = ShortcutChain::new(&chain, &bounds, &property).unwrap();
        assert_eq!(shortcut.num_of_states(), 5);
        assert_stochastic(&shortcut);

        // The default bound of an upper bounded property is zero.
        assert_eq!(
            shortcut.outgoing_transitions(StateIndex::new(0)).collect::<Vec<_>>(),
            vec![Transition::new(shortcut.sink_false(), 1.0)]
        );
        assert_eq!(initial_value(&shortcut), 0.0);

        shortcut.expand(&[StateIndex::new(0)]);
        assert!(shortcut.is_expanded(StateIndex::new(0)));
        assert_stochastic(&shortcut);
        assert!((initial_value(&shortcut) - 0.25).abs() < 1e-6);

        shortcut.expand(&[StateIndex::new(1), StateIndex::new(0)]);
        assert_eq!(shortcut.num_of_expanded(), 2);
        assert!((initial_value(&shortcut) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shortcut_lower_bound_defaults() {
        let chain = line();
        let property = Property::reachability("target", Comparison::GreaterEqual, 0.5);
        let shortcut = ShortcutChain::new(&chain, &QuotientBounds::default(), &property).unwrap();

        assert_eq!(
            shortcut.outgoing_transitions(StateIndex::new(1)).collect::<Vec<_>>(),
            vec![Transition::new(shortcut.sink_true(), 1.0)]
        );
        assert!(shortcut.labelling().has_label(shortcut.sink_true(), SHORTCUT_TARGET_LABEL));
        assert!(shortcut.labelling().has_label(StateIndex::new(2), SHORTCUT_TARGET_LABEL));
        assert!(!shortcut.labelling().has_label(shortcut.sink_false(), SHORTCUT_TARGET_LABEL));
    }

    #[test]
    fn test_shortcut_reward() {
        let chain = line();
        let mut bounds = QuotientBounds::new(3);
        bounds.set_bound(QuotientStateIndex::new(1), 0.5);
        let property = Property::expected_reward("cost", "target", Comparison::LessEqual, 1.0);

        let mut shortcut = ShortcutChain::new(&chain, &bounds, &property).unwrap();
        assert_stochastic(&shortcut);
        assert_eq!(initial_value(&shortcut), 0.0);

        shortcut.expand(&[StateIndex::new(0)]);
        assert!((initial_value(&shortcut) - 1.5).abs() < 1e-6);

        shortcut.expand(&[StateIndex::new(1)]);
        assert!((initial_value(&shortcut) - 2.0).abs() < 1e-6);

        // Without bounds a lower bounded reward is infinite until the target is certain.
        let property = Property::expected_reward("cost", "target", Comparison::GreaterEqual, 1.0);
        let shortcut = ShortcutChain::new(&chain, &QuotientBounds::default(), &property).unwrap();
        assert_eq!(initial_value(&shortcut), f64::INFINITY);
    }

    #[test]
    fn test_shortcut_unknown_names() {
        let chain = line();

        let property = Property::reachability("goal", Comparison::Less, 0.5);
        assert!(matches!(
            ShortcutChain::new(&chain, &QuotientBounds::default(), &property),
            Err(CounterexampleError::UnknownLabel(_))
        ));

        let property = Property::expected_reward("time", "target", Comparison::Less, 0.5);
        assert!(matches!(
            ShortcutChain::new(&chain, &QuotientBounds::default(), &property),
            Err(CounterexampleError::UnknownRewardModel(_))
        ));
    }

    #[test]
    fn test_shortcut_invalid_bounds() {
        let chain = line();
        let probability = Property::reachability("target", Comparison::GreaterEqual, 0.5);
        let reward = Property::expected_reward("cost", "target", Comparison::Less, 2.0);

        for (bound, property) in [
            (f64::NAN, &probability),
            (f64::INFINITY, &probability),
            (f64::NAN, &reward),
            (-1.0, &reward),
        ] {
            let mut bounds = QuotientBounds::new(3);
            bounds.set_bound(QuotientStateIndex::new(1), bound);
            assert!(
                matches!(
                    ShortcutChain::new(&chain, &bounds, property),
                    Err(CounterexampleError::InvalidBound { state: 1, .. })
                ),
                "Bound {bound} should be rejected for {property}"
            );
        }

        // An infinite expected reward is a valid bound.
        let mut bounds = QuotientBounds::new(3);
        bounds.set_bound(QuotientStateIndex::new(1), f64::INFINITY);
        let mut shortcut = ShortcutChain::new(&chain, &bounds, &reward).unwrap();
        shortcut.expand(&[StateIndex::new(0)]);
        assert_stochastic(&shortcut);
        assert_eq!(initial_value(&shortcut), f64::INFINITY);
    }

    #[test]
    fn test_shortcut_quotient_targets() {
        let chain = line();
        let mut bounds = QuotientBounds::new(3);
        bounds.set_target(QuotientStateIndex::new(1));
        let property = Property::reachability("target", Comparison::Less, 0.5);

        let mut shortcut = ShortcutChain::new(&chain, &bounds, &property).unwrap();
        assert!(!shortcut.labelling().has_label(StateIndex::new(0), SHORTCUT_TARGET_LABEL));
        assert!(shortcut.labelling().has_label(StateIndex::new(1), SHORTCUT_TARGET_LABEL));
        assert!(shortcut.labelling().has_label(StateIndex::new(2), SHORTCUT_TARGET_LABEL));

        // State 1 counts as target before its own transitions are known.
        shortcut.expand(&[StateIndex::new(0)]);
        assert!((initial_value(&shortcut) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shortcut_until_constraint() {
        // The chain 0 -> {1, 2} -> 3 where state 2 violates the constraint.
        let mut builder = DtmcBuilder::new(4);
        builder.add_transition(StateIndex::new(0), 0.5, StateIndex::new(1));
        builder.add_transition(StateIndex::new(0), 0.5, StateIndex::new(2));
        builder.add_transition(StateIndex::new(1), 1.0, StateIndex::new(3));
        builder.add_transition(StateIndex::new(2), 1.0, StateIndex::new(3));
        builder.add_transition(StateIndex::new(3), 1.0, StateIndex::new(3));
        builder.add_label(StateIndex::new(0), "safe");
        builder.add_label(StateIndex::new(1), "safe");
        builder.add_label(StateIndex::new(3), "target");
        let chain = ResolvedChain::identity(builder.finish(StateIndex::new(0)).unwrap());

        // The bound of state 2 is irrelevant, since it leaves the safe states.
        let mut bounds = QuotientBounds::new(4);
        bounds.set_bound(QuotientStateIndex::new(1), 0.5);
        bounds.set_bound(QuotientStateIndex::new(2), 1.0);
        let property = Property::parse(r#"P<=0.4 ["safe" U "target"]"#).unwrap();

        let mut shortcut = ShortcutChain::new(&chain, &bounds, &property).unwrap();
        assert_eq!(shortcut.property().formula.target(), SHORTCUT_TARGET_LABEL);
        assert!(shortcut.labelling().has_label(StateIndex::new(1), "safe"));
        assert!(!shortcut.labelling().has_label(StateIndex::new(2), "safe"));
        assert!(!shortcut.labelling().has_label(shortcut.sink_false(), "safe"));
        assert!(!shortcut.labelling().has_label(shortcut.sink_true(), "safe"));

        shortcut.expand(&[StateIndex::new(0)]);
        assert!((initial_value(&shortcut) - 0.25).abs() < 1e-6);

        shortcut.expand(&[StateIndex::new(1), StateIndex::new(3)]);
        assert!((initial_value(&shortcut) - 0.5).abs() < 1e-6);

        let property = Property::parse(r#"P<=0.4 ["unsafe" U "target"]"#).unwrap();
        assert!(matches!(
            ShortcutChain::new(&chain, &bounds, &property),
            Err(CounterexampleError::UnknownLabel(label)) if label == "unsafe"
        ));
    }
}
