#![forbid(unsafe_code)]

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use sketch_utilities::TagIndex;

/// A unique type for the holes of a sketch.
pub struct HoleTag;

/// A unique type for the choices of the quotient model.
pub struct ChoiceTag;

/// A unique type for the states of the quotient model.
pub struct QuotientStateTag;

/// The index of a hole, a free parameter of the sketch.
pub type HoleIndex = TagIndex<usize, HoleTag>;

/// The index of a choice (an action of a state) in the quotient model.
pub type ChoiceIndex = TagIndex<usize, ChoiceTag>;

/// The index of a state in the quotient model.
pub type QuotientStateIndex = TagIndex<usize, QuotientStateTag>;

#[derive(Error, Debug, PartialEq)]
pub enum ChoiceHolesError {
    #[error("Choice {choice} depends on hole {hole}, but there are only {num_of_holes} holes")]
    HoleOutOfBounds {
        choice: usize,
        hole: usize,
        num_of_holes: usize,
    },
}

/// Stores for every choice of the quotient model the set of holes that
/// influence it.
///
/// # Details
///
/// The hole sets are stored consecutively, the holes of choice `c` are found at
/// positions `choices[c]..choices[c + 1]` of `holes`. Every set is sorted and
/// free of duplicates. Choices with an empty set do not depend on any hole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceHoles {
    num_of_holes: usize,
    choices: Vec<usize>,
    holes: Vec<HoleIndex>,
}

impl ChoiceHoles {
    /// Creates the table from the hole sets of the choices, in the order of
    /// the choice indices.
    pub fn new<I, H>(num_of_holes: usize, hole_sets: I) -> Result<Self, ChoiceHolesError>
    where
        I: IntoIterator<Item = H>,
        H: IntoIterator<Item = HoleIndex>,
    {
        let mut choices = vec![0];
        let mut holes = Vec::new();

        for (choice, hole_set) in hole_sets.into_iter().enumerate() {
            for hole in hole_set.into_iter().sorted_unstable().dedup() {
                if hole.value() >= num_of_holes {
                    return Err(ChoiceHolesError::HoleOutOfBounds {
                        choice,
                        hole: hole.value(),
                        num_of_holes,
                    });
                }
                holes.push(hole);
            }
            choices.push(holes.len());
        }

        Ok(Self {
            num_of_holes,
            choices,
            holes,
        })
    }

    /// Returns the number of holes of the sketch.
    pub fn num_of_holes(&self) -> usize {
        self.num_of_holes
    }

    /// Returns the number of choices of the quotient model.
    pub fn num_of_choices(&self) -> usize {
        self.choices.len() - 1
    }

    /// Returns the sorted set of holes of the given choice.
    pub fn holes(&self, choice: ChoiceIndex) -> &[HoleIndex] {
        &self.holes[self.choices[*choice]..self.choices[*choice + 1]]
    }

    /// Returns true iff the choice does not depend on any hole.
    pub fn is_hole_independent(&self, choice: ChoiceIndex) -> bool {
        self.holes(choice).is_empty()
    }
}

impl fmt::Display for ChoiceHoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for choice in ChoiceIndex::range(self.num_of_choices()) {
            writeln!(f, "{choice}: {{{}}}", self.holes(choice).iter().format(", "))?;
        }

        Ok(())
    }
}
