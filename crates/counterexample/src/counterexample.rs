#![forbid(unsafe_code)]

use std::time::Duration;
use std::time::Instant;

use itertools::Itertools;
use log::debug;
use log::info;
use log::warn;
use thiserror::Error;

use sketch_markov::CheckResult;
use sketch_markov::MarkovChain;
use sketch_markov::ModelChecker;
use sketch_markov::Property;
use sketch_utilities::Timing;

use crate::ChoiceHoles;
use crate::HoleIndex;
use crate::QuotientBounds;
use crate::ResolvedChain;
use crate::ShortcutChain;
use crate::WaveIndex;
use crate::compute_waves;
use crate::extract_critical_holes;

#[derive(Error, Debug)]
pub enum CounterexampleError {
    #[error("The {map} map covers {found} states, but the chain has {expected} states")]
    IncompleteMap {
        map: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("State {state} has choice {choice}, but the quotient model has only {num_of_choices} choices")]
    ChoiceOutOfBounds {
        state: usize,
        choice: usize,
        num_of_choices: usize,
    },

    #[error("The chain has no label '{0}'")]
    UnknownLabel(String),

    #[error("The chain has no reward model '{0}'")]
    UnknownRewardModel(String),

    #[error("Quotient state {state} has bound {bound}, which is not a valid {kind}")]
    InvalidBound {
        state: usize,
        bound: f64,
        kind: &'static str,
    },

    #[error("The oracle returned a result for {found} states, but the shortcut chain has {expected} states")]
    IncompleteResult { expected: usize, found: usize },

    #[error("The chain satisfies {0}, so there is no counterexample")]
    ChainSatisfiesProperty(Property),

    #[error("The model checking oracle failed")]
    Oracle(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Determines what happens when the oracle fails or the deadline expires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OracleFailurePolicy {
    /// Return the error of the oracle.
    #[default]
    Fail,
    /// Consider all holes that are needed by some reachable state critical.
    Conservative,
}

/// The options of [construct_counterexample].
#[derive(Clone, Debug)]
pub struct CounterexampleConfig {
    batch_size: usize,
    oracle_failure: OracleFailurePolicy,
    deadline: Option<Duration>,
}

impl Default for CounterexampleConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            oracle_failure: OracleFailurePolicy::Fail,
            deadline: None,
        }
    }
}

impl CounterexampleConfig {
    /// Checks the shortcut chain only after every `batch_size` waves. A batch
    /// size larger than one saves oracle calls, but the stopping wave is then
    /// only known up to the end of its batch, so the critical set can be
    /// larger than with single waves.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "The batch size must be positive");
        self.batch_size = batch_size;
        self
    }

    /// Sets the behaviour when the oracle fails.
    pub fn with_oracle_failure(mut self, policy: OracleFailurePolicy) -> Self {
        self.oracle_failure = policy;
        self
    }

    /// Sets a time budget for the whole construction, after which the
    /// conservative answer is returned. The budget is checked between oracle
    /// calls, so a single call is never interrupted.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn oracle_failure(&self) -> OracleFailurePolicy {
        self.oracle_failure
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

/// The explanation of a property violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterexample {
    /// The holes that must keep their value for the violation to persist, in increasing order.
    pub critical_holes: Vec<HoleIndex>,

    /// The wave at which the shortcut chain first violated the property.
    pub stopping_wave: WaveIndex,

    /// The total number of waves of the chain.
    pub num_of_waves: usize,

    /// The number of times the oracle was invoked.
    pub oracle_calls: usize,

    /// Whether the critical holes are the conservative answer after an oracle
    /// failure or an expired deadline.
    pub conservative: bool,
}

/// Computes a critical hole set for a resolved chain that violates the given property.
///
/// # Details
///
/// The reachable states are partitioned into waves by [compute_waves]. The
/// states of every wave are then expanded in a [ShortcutChain], which is
/// checked by the oracle after every batch of waves. The construction stops at
/// the first wave at which the shortcut chain violates the property, and the
/// holes registered up to that wave are critical: every assignment that agrees
/// with the chain on them also violates the property.
///
/// To explain why a chain satisfies a property, pass the negated property.
/// When even the complete chain satisfies the property an error is returned.
pub fn construct_counterexample<M: ModelChecker>(
    chain: &ResolvedChain,
    choice_holes: &ChoiceHoles,
    bounds: &QuotientBounds,
    property: &Property,
    checker: &M,
    config: &CounterexampleConfig,
    timing: &mut Timing,
) -> Result<Counterexample, CounterexampleError> {
    info!("Constructing a counterexample for {property}...");
    let start = Instant::now();

    let mut waves_time = timing.start("waves");
    let (hole_waves, partition) = compute_waves(chain, choice_holes)?;
    waves_time.finish();

    let mut shortcut_time = timing.start("shortcut");
    let mut shortcut = ShortcutChain::new(chain, bounds, property)?;
    shortcut_time.finish();

    let last_wave = partition.last_wave();
    let initial_state = shortcut.initial_state();
    let mut oracle_calls = 0;

    let conclude = |stopping_wave: WaveIndex, oracle_calls: usize, conservative: bool| {
        let critical_holes = extract_critical_holes(&hole_waves, stopping_wave);
        info!(
            "Found {} critical holes {{{}}} at wave {stopping_wave} of {}",
            critical_holes.len(),
            critical_holes.iter().format(", "),
            partition.num_of_waves()
        );

        Counterexample {
            critical_holes,
            stopping_wave,
            num_of_waves: partition.num_of_waves(),
            oracle_calls,
            conservative,
        }
    };

    for wave in partition.iter_waves() {
        shortcut.expand(partition.states(wave));

        if (*wave + 1) % config.batch_size != 0 && wave != last_wave {
            continue;
        }

        let mut oracle_time = timing.start("oracle");
        let result = checker.check(&shortcut, shortcut.property());
        oracle_time.finish();
        oracle_calls += 1;

        match result {
            Ok(result) => {
                let found = match &result {
                    CheckResult::Qualitative(states) => states.len(),
                    CheckResult::Quantitative(values) => values.len(),
                };
                if found != shortcut.num_of_states() {
                    return Err(CounterexampleError::IncompleteResult {
                        expected: shortcut.num_of_states(),
                        found,
                    });
                }

                debug!(
                    "Wave {wave}: expanded {} states, value {}",
                    shortcut.num_of_expanded(),
                    result
                        .value(initial_state)
                        .map_or_else(|| "unknown".to_string(), |value| value.to_string())
                );

                if !result.is_satisfied(initial_state, shortcut.property()) {
                    return Ok(conclude(wave, oracle_calls, false));
                }
            }
            Err(error) => match config.oracle_failure {
                OracleFailurePolicy::Fail => return Err(CounterexampleError::Oracle(Box::new(error))),
                OracleFailurePolicy::Conservative => {
                    warn!("The oracle failed at wave {wave}: {error}, all needed holes are considered critical");
                    return Ok(conclude(last_wave, oracle_calls, true));
                }
            },
        }

        if let Some(deadline) = config.deadline {
            if wave != last_wave && start.elapsed() >= deadline {
                warn!("The deadline expired at wave {wave}, all needed holes are considered critical");
                return Ok(conclude(last_wave, oracle_calls, true));
            }
        }
    }

    Err(CounterexampleError::ChainSatisfiesProperty(property.clone()))
}
