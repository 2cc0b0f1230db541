#![forbid(unsafe_code)]

use std::io::BufWriter;
use std::io::Read;
use std::io::Write;

use log::info;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use thiserror::Error;

use sketch_io::LargeFormatter;
use sketch_io::LineIterator;
use sketch_io::TimeProgress;
use sketch_utilities::SketchError;
use sketch_utilities::debug_trace;

use crate::Dtmc;
use crate::DtmcBuilder;
use crate::MarkovChain;
use crate::StateIndex;

/// The label that marks the initial state in the DRN format.
pub const INIT_LABEL: &str = "init";

#[derive(Error, Debug)]
pub enum DrnError {
    #[error("Unsupported model type '{0}', only DTMC is supported")]
    UnsupportedType(String),

    #[error("Missing section {0}")]
    MissingSection(&'static str),

    #[error("Only a single reward model is supported, found '{0}'")]
    MultipleRewardModels(String),

    #[error("Invalid line {0}: '{1}'")]
    InvalidLine(usize, String),

    #[error("State {0} has more than one action, which is not allowed in a DTMC")]
    MultipleActions(usize),

    #[error("No state is marked as initial state")]
    MissingInitialState,

    #[error("Line {line} refers to state {state}, but @nr_states declares {num_of_states} states")]
    StateOutOfBounds {
        line: usize,
        state: usize,
        num_of_states: usize,
    },
}

/// Reads a Markov chain in a subset of the explicit DRN format.
///
/// The format consists of a header with the sections `@type: DTMC`, an
/// optional `@reward_models` with a single name, and `@nr_states`, followed by
/// `@model` and the states:
///
/// ```text
/// state <id> [<reward>] <labels>...
///     action 0 [<reward>]
///         <to> : <probability>
/// ```
///
/// The bracketed rewards are optional, action rewards are added to the state
/// reward. The label `init` marks the initial state. Lines starting with `//`
/// are comments.
pub fn read_drn(reader: impl Read) -> Result<Dtmc, SketchError> {
    info!("Reading chain in .drn format...");

    let state_regex =
        Regex::new(r#"^state\s+(\d+)(?:\s+\[([^\]]*)\])?\s*(.*)$"#).expect("Regex compilation should not fail");
    let action_regex =
        Regex::new(r#"^action\s+\S+(?:\s+\[([^\]]*)\])?\s*$"#).expect("Regex compilation should not fail");
    let transition_regex = Regex::new(r#"^(\d+)\s*:\s*(\S+)$"#).expect("Regex compilation should not fail");

    let mut lines = LineIterator::new(reader);
    let mut reward_model: Option<String> = None;
    let mut num_of_states: Option<usize> = None;

    // Parse the header until the @model section.
    let mut found_model = false;
    let mut found_type = false;
    loop {
        lines.advance();
        let Some(line) = lines.get() else {
            break;
        };
        let line_number = lines.line_number();
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if let Some(model_type) = line.strip_prefix("@type:") {
            let model_type = model_type.trim();
            if model_type != "DTMC" {
                return Err(DrnError::UnsupportedType(model_type.to_string()).into());
            }
            found_type = true;
        } else if line == "@reward_models" {
            let names = next_line(&mut lines).ok_or(DrnError::MissingSection("@reward_models"))?;
            let names: Vec<&str> = names.split_whitespace().collect();
            if names.len() > 1 {
                return Err(DrnError::MultipleRewardModels(names.join(" ")).into());
            }
            reward_model = names.first().map(|name| name.to_string());
        } else if line == "@nr_states" {
            let number = next_line(&mut lines).ok_or(DrnError::MissingSection("@nr_states"))?;
            num_of_states = Some(number.trim().parse()?);
        } else if line == "@model" {
            found_model = true;
            break;
        } else if line.starts_with('@') {
            // Sections such as @parameters and @nr_choices do not influence a DTMC.
            next_line(&mut lines);
        } else {
            return Err(DrnError::InvalidLine(line_number, line.to_string()).into());
        }
    }

    if !found_type {
        return Err(DrnError::MissingSection("@type").into());
    }
    if !found_model {
        return Err(DrnError::MissingSection("@model").into());
    }
    let num_of_states = num_of_states.ok_or(DrnError::MissingSection("@nr_states"))?;

    let mut builder = DtmcBuilder::with_capacity(num_of_states, num_of_states);

    let progress = TimeProgress::new(
        move |read: usize| {
            info!(
                "Read {} states {}%...",
                LargeFormatter(read),
                read * 100 / num_of_states.max(1)
            )
        },
        1,
    );

    let mut initial_state = None;
    let mut current_state: Option<StateIndex> = None;
    let mut current_has_action = false;
    let mut current_reward = 0.0;
    loop {
        lines.advance();
        let Some(line) = lines.get() else {
            break;
        };
        let line_number = lines.line_number();
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        let invalid_line = || DrnError::InvalidLine(line_number, line.to_string());
        let parse_state = |text: &str| -> Result<StateIndex, SketchError> {
            let state: usize = text.parse()?;
            if state >= num_of_states {
                return Err(DrnError::StateOutOfBounds {
                    line: line_number,
                    state,
                    num_of_states,
                }
                .into());
            }
            Ok(StateIndex::new(state))
        };

        if let Some(captures) = state_regex.captures(line) {
            let state_index = parse_state(&captures[1])?;
            current_state = Some(state_index);
            current_has_action = false;
            current_reward = parse_reward(captures.get(2).map(|reward| reward.as_str()))?;

            for label in captures[3].split_whitespace() {
                let label = label.trim_matches('"');
                if label == INIT_LABEL {
                    initial_state = Some(state_index);
                }
                builder.add_label(state_index, label);
            }

            if let Some(reward_model) = &reward_model {
                builder.set_state_reward(reward_model, state_index, current_reward);
            }
            progress.print(*state_index);
        } else if let Some(captures) = action_regex.captures(line) {
            let state_index = current_state.ok_or_else(invalid_line)?;
            if current_has_action {
                return Err(DrnError::MultipleActions(*state_index).into());
            }
            current_has_action = true;

            let action_reward = parse_reward(captures.get(1).map(|reward| reward.as_str()))?;
            if let Some(reward_model) = &reward_model {
                builder.set_state_reward(reward_model, state_index, current_reward + action_reward);
            }
        } else if let Some(captures) = transition_regex.captures(line) {
            let state_index = current_state.filter(|_| current_has_action).ok_or_else(invalid_line)?;
            let to = parse_state(&captures[1])?;
            let probability: f64 = captures[2].parse()?;

            debug_trace!("Read transition {state_index} --{probability}-> {to}");
            builder.add_transition(state_index, probability, to);
        } else {
            return Err(invalid_line().into());
        }
    }

    let initial_state = initial_state.ok_or(DrnError::MissingInitialState)?;
    builder.require_num_of_states(num_of_states);

    let dtmc = builder.finish(initial_state)?;
    info!("Finished reading chain: {dtmc}");
    Ok(dtmc)
}

/// Writes the chain in the DRN format, see [read_drn].
///
/// Note that the writer is buffered internally using a `BufWriter`.
pub fn write_drn(writer: &mut impl Write, dtmc: &Dtmc) -> Result<(), SketchError> {
    info!("Writing chain in .drn format...");

    let mut writer = BufWriter::new(writer);
    writeln!(writer, "@type: DTMC")?;
    if let Some(reward_model) = dtmc.any_reward_model() {
        writeln!(writer, "@reward_models")?;
        writeln!(writer, "{}", reward_model.name())?;
    }
    writeln!(writer, "@nr_states")?;
    writeln!(writer, "{}", dtmc.num_of_states())?;
    writeln!(writer, "@model")?;

    for state_index in dtmc.iter_states() {
        write!(writer, "state {state_index}")?;
        if let Some(reward_model) = dtmc.any_reward_model() {
            write!(writer, " [{}]", reward_model.state_reward(state_index))?;
        }
        if state_index == dtmc.initial_state() && !dtmc.labelling().has_label(state_index, INIT_LABEL) {
            write!(writer, " {INIT_LABEL}")?;
        }
        for label in dtmc.labelling().labels_of(state_index) {
            write!(writer, " {label}")?;
        }
        writeln!(writer)?;

        writeln!(writer, "\taction 0")?;
        for transition in dtmc.outgoing_transitions(state_index) {
            writeln!(writer, "\t\t{} : {}", transition.to, transition.probability)?;
        }
    }

    info!("Finished writing chain.");
    Ok(())
}

/// Returns the next line of the header, skipping empty lines.
fn next_line<R: Read>(lines: &mut LineIterator<R>) -> Option<String> {
    while let Some(line) = lines.next() {
        if !line.trim().is_empty() {
            return Some(line.clone());
        }
    }

    None
}

/// Parses an optional bracketed reward, for multiple values only the first is used.
fn parse_reward(reward: Option<&str>) -> Result<f64, SketchError> {
    match reward.and_then(|reward| reward.split(',').next()) {
        Some(reward) if !reward.trim().is_empty() => Ok(reward.trim().parse()?),
        _ => Ok(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use test_log::test;

    use sketch_utilities::random_test;

    use crate::random_dtmc;

    #[test]
    fn test_reading_drn() {
        let file = indoc! {"
            // A chain that reaches the target with probability 1/2.
            @type: DTMC
            @reward_models
            cost
            @nr_states
            3
            @model
            state 0 [1.5] init
                action 0 [0.5]
                    1 : 0.5
                    2 : 0.5
            state 1 [0] target
                action 0
                    1 : 1
            state 2
                action 0
                    2 : 1
        "};

        let dtmc = read_drn(file.as_bytes()).unwrap();

        assert_eq!(dtmc.initial_state(), StateIndex::new(0));
        assert_eq!(dtmc.num_of_states(), 3);
        assert_eq!(dtmc.num_of_transitions(), 4);
        assert!(dtmc.labelling().has_label(StateIndex::new(1), "target"));
        assert_eq!(dtmc.reward_model("cost").unwrap().state_rewards(), &[2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_drn_failures() {
        let wrong_type = indoc! {"
            @type: MDP
            @nr_states
            1
            @model
        "};
        assert!(read_drn(wrong_type.as_bytes()).is_err());

        let two_actions = indoc! {"
            @type: DTMC
            @nr_states
            1
            @model
            state 0 init
                action 0
                    0 : 1
                action 1
                    0 : 1
        "};
        let error = read_drn(two_actions.as_bytes()).unwrap_err();
        assert!(matches!(error.downcast_ref::<DrnError>(), Some(DrnError::MultipleActions(0))));

        let no_initial = indoc! {"
            @type: DTMC
            @nr_states
            1
            @model
            state 0
                action 0
                    0 : 1
        "};
        let error = read_drn(no_initial.as_bytes()).unwrap_err();
        assert!(matches!(error.downcast_ref::<DrnError>(), Some(DrnError::MissingInitialState)));

        let not_stochastic = indoc! {"
            @type: DTMC
            @nr_states
            1
            @model
            state 0 init
                action 0
                    0 : 0.5
        "};
        assert!(read_drn(not_stochastic.as_bytes()).is_err());
    }

    #[test]
    fn test_drn_undeclared_states() {
        let undeclared_successor = indoc! {"
            @type: DTMC
            @nr_states
            2
            @model
            state 0 init
                action 0
                    2 : 1
            state 1
                action 0
                    1 : 1
        "};
        let error = read_drn(undeclared_successor.as_bytes()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<DrnError>(),
            Some(DrnError::StateOutOfBounds {
                line: 7,
                state: 2,
                num_of_states: 2
            })
        ));

        let undeclared_state = indoc! {"
            @type: DTMC
            @nr_states
            1
            @model
            state 0 init
                action 0
                    0 : 1
            state 1
                action 0
                    1 : 1
        "};
        let error = read_drn(undeclared_state.as_bytes()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<DrnError>(),
            Some(DrnError::StateOutOfBounds { line: 8, state: 1, .. })
        ));
    }

    #[test]
    fn test_random_drn_io() {
        random_test(100, |rng| {
            let dtmc = random_dtmc(rng, 10, 3);

            let mut buffer: Vec<u8> = Vec::new();
            write_drn(&mut buffer, &dtmc).unwrap();

            let result = read_drn(&buffer[0..]).unwrap();
            assert_eq!(result.num_of_states(), dtmc.num_of_states());
            assert_eq!(result.num_of_transitions(), dtmc.num_of_transitions());
            for state_index in dtmc.iter_states() {
                assert_eq!(
                    result.labelling().has_label(state_index, "target"),
                    dtmc.labelling().has_label(state_index, "target")
                );
            }
            assert_eq!(
                result.reward_model("cost").unwrap().state_rewards(),
                dtmc.reward_model("cost").unwrap().state_rewards()
            );
        });
    }
}
