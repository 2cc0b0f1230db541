#![forbid(unsafe_code)]

use std::io::Read;

use log::info;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use thiserror::Error;

use sketch_io::LineIterator;
use sketch_markov::Dtmc;
use sketch_markov::MarkovChain;
use sketch_utilities::SketchError;

use crate::ChoiceHoles;
use crate::HoleIndex;
use crate::QuotientBounds;
use crate::QuotientStateIndex;
use crate::ResolvedChain;

#[derive(Error, Debug)]
pub enum HoleAnnotationError {
    #[error("Expected the header 'holes <number>' before line {0}")]
    MissingHeader(usize),

    #[error("Invalid line {0}: '{1}'")]
    InvalidLine(usize, String),

    #[error("Line {line} refers to state {state}, but the chain has {num_of_states} states")]
    StateOutOfBounds {
        line: usize,
        state: usize,
        num_of_states: usize,
    },
}

/// A chain together with the hole dependencies and a priori bounds of its states.
#[derive(Debug)]
pub struct AnnotatedChain {
    pub chain: ResolvedChain,
    pub choice_holes: ChoiceHoles,
    pub bounds: QuotientBounds,
}

/// Reads the holes and bounds of the states of the given chain.
///
/// The chain is its own quotient model, so every state has its own choice.
/// The file starts with the header `holes <number>`, followed by lines of the
/// following forms, where `#` starts a comment:
///
/// ```text
/// <state> : <hole> <hole> ...
/// bound <state> <value>
/// target <state>
/// ```
///
/// States without a hole line do not depend on any hole, repeated lines for
/// the same state accumulate.
pub fn read_hole_annotations(reader: impl Read, dtmc: Dtmc) -> Result<AnnotatedChain, SketchError> {
    info!("Reading hole annotations...");

    let header_regex = Regex::new(r#"^holes\s+(\d+)$"#).expect("Regex compilation should not fail");
    let holes_regex = Regex::new(r#"^(\d+)\s*:\s*([\d\s]*)$"#).expect("Regex compilation should not fail");
    let bound_regex = Regex::new(r#"^bound\s+(\d+)\s+(\S+)$"#).expect("Regex compilation should not fail");
    let target_regex = Regex::new(r#"^target\s+(\d+)$"#).expect("Regex compilation should not fail");

    let num_of_states = dtmc.num_of_states();
    let mut num_of_holes = None;
    let mut state_holes: Vec<Vec<HoleIndex>> = vec![Vec::new(); num_of_states];
    let mut bounds = QuotientBounds::new(num_of_states);

    let mut lines = LineIterator::new(reader);
    loop {
        lines.advance();
        let Some(line) = lines.get() else {
            break;
        };
        let line_number = lines.line_number();

        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let parse_state = |text: &str| -> Result<usize, SketchError> {
            let state: usize = text.parse()?;
            if state >= num_of_states {
                return Err(HoleAnnotationError::StateOutOfBounds {
                    line: line_number,
                    state,
                    num_of_states,
                }
                .into());
            }
            Ok(state)
        };

        if let Some(captures) = header_regex.captures(line) {
            num_of_holes = Some(captures[1].parse::<usize>()?);
            continue;
        }

        if num_of_holes.is_none() {
            return Err(HoleAnnotationError::MissingHeader(line_number).into());
        }

        if let Some(captures) = holes_regex.captures(line) {
            let state = parse_state(&captures[1])?;
            for hole in captures[2].split_whitespace() {
                state_holes[state].push(HoleIndex::new(hole.parse()?));
            }
        } else if let Some(captures) = bound_regex.captures(line) {
            let state = parse_state(&captures[1])?;
            let bound: f64 = captures[2].parse()?;
            if bound.is_nan() {
                return Err(HoleAnnotationError::InvalidLine(line_number, line.to_string()).into());
            }
            bounds.set_bound(QuotientStateIndex::new(state), bound);
        } else if let Some(captures) = target_regex.captures(line) {
            let state = parse_state(&captures[1])?;
            bounds.set_target(QuotientStateIndex::new(state));
        } else {
            return Err(HoleAnnotationError::InvalidLine(line_number, line.to_string()).into());
        }
    }

    let num_of_holes = num_of_holes.ok_or(HoleAnnotationError::MissingHeader(lines.line_number() + 1))?;
    let choice_holes = ChoiceHoles::new(num_of_holes, state_holes)?;

    info!("Finished reading {num_of_holes} holes for {num_of_states} states");
    Ok(AnnotatedChain {
        chain: ResolvedChain::identity(dtmc),
        choice_holes,
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use test_log::test;

    use sketch_markov::DtmcBuilder;
    use sketch_markov::StateIndex;

    use crate::ChoiceHolesError;
    use crate::ChoiceIndex;

    fn chain() -> Dtmc {
        let mut builder = DtmcBuilder::new(3);
        builder.add_transition(StateIndex::new(0), 1.0, StateIndex::new(1));
        builder.add_transition(StateIndex::new(1), 1.0, StateIndex::new(2));
        builder.add_transition(StateIndex::new(2), 1.0, StateIndex::new(2));
        builder.finish(StateIndex::new(0)).unwrap()
    }

    #[test]
    fn test_read_hole_annotations() {
        let file = indoc! {"
            # Hole 1 controls the first step.
            holes 3
            0 : 1
            1 : 2 0
            1 : 2
            bound 1 0.25
            target 2
        "};

        let annotated = read_hole_annotations(file.as_bytes(), chain()).unwrap();

        assert_eq!(annotated.choice_holes.num_of_holes(), 3);
        assert_eq!(annotated.choice_holes.holes(ChoiceIndex::new(0)), &[HoleIndex::new(1)]);
        assert_eq!(
            annotated.choice_holes.holes(ChoiceIndex::new(1)),
            &[HoleIndex::new(0), HoleIndex::new(2)]
        );
        assert!(annotated.choice_holes.is_hole_independent(ChoiceIndex::new(2)));
        assert_eq!(annotated.bounds.bound(QuotientStateIndex::new(1)), Some(0.25));
        assert!(annotated.bounds.is_target(QuotientStateIndex::new(2)));
        assert_eq!(annotated.chain.choice(StateIndex::new(2)), ChoiceIndex::new(2));
    }

    #[test]
    fn test_read_hole_annotations_failures() {
        let error = read_hole_annotations("0 : 1\n".as_bytes(), chain()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<HoleAnnotationError>(),
            Some(HoleAnnotationError::MissingHeader(1))
        ));

        let error = read_hole_annotations("holes 2\n5 : 1\n".as_bytes(), chain()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<HoleAnnotationError>(),
            Some(HoleAnnotationError::StateOutOfBounds { line: 2, state: 5, .. })
        ));

        let error = read_hole_annotations("holes 2\n0 : 2\n".as_bytes(), chain()).unwrap_err();
        assert!(error.is::<ChoiceHolesError>());

        let error = read_hole_annotations("holes 2\nbound 0\n".as_bytes(), chain()).unwrap_err();
        assert!(error.is::<HoleAnnotationError>());

        let error = read_hole_annotations("holes 2\nbound 1 NaN\n".as_bytes(), chain()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<HoleAnnotationError>(),
            Some(HoleAnnotationError::InvalidLine(2, _))
        ));

        let annotated = read_hole_annotations("holes 2\nbound 1 inf\n".as_bytes(), chain()).unwrap();
        assert_eq!(annotated.bounds.bound(QuotientStateIndex::new(1)), Some(f64::INFINITY));
    }
}
