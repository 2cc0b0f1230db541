#![forbid(unsafe_code)]

use bitvec::bitvec;
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;

use crate::QuotientStateIndex;

/// The a priori results of the quotient model for one property, computed once
/// before any chain is analysed.
///
/// For every quotient state it stores an optional bound on the value of the
/// property over all assignments, and whether the state is a target state.
/// States without a bound, including states beyond the table, fall back to
/// the trivial bounds of the shortcut chain. Use [QuotientBounds::default] when
/// no bounds are available at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuotientBounds {
    bounds: Vec<Option<f64>>,
    targets: BitVec<usize, Lsb0>,
}

impl QuotientBounds {
    /// Creates a table without bounds and targets for the given number of quotient states.
    pub fn new(num_of_states: usize) -> Self {
        Self {
            bounds: vec![None; num_of_states],
            targets: bitvec![usize, Lsb0; 0; num_of_states],
        }
    }

    /// Returns the number of quotient states covered by the table.
    pub fn num_of_states(&self) -> usize {
        self.bounds.len()
    }

    /// Sets the bound of the given state, growing the table when necessary.
    pub fn set_bound(&mut self, state: QuotientStateIndex, bound: f64) {
        self.require_num_of_states(*state + 1);
        self.bounds[state] = Some(bound);
    }

    /// Marks the given state as target state, growing the table when necessary.
    pub fn set_target(&mut self, state: QuotientStateIndex) {
        self.require_num_of_states(*state + 1);
        self.targets.set(*state, true);
    }

    /// Returns the a priori bound of the given state, if any.
    pub fn bound(&self, state: QuotientStateIndex) -> Option<f64> {
        self.bounds.get(*state).copied().flatten()
    }

    /// Returns true iff the given state is a target state of the quotient model.
    pub fn is_target(&self, state: QuotientStateIndex) -> bool {
        self.targets.get(*state).is_some_and(|target| *target)
    }

    fn require_num_of_states(&mut self, num_of_states: usize) {
        if num_of_states > self.bounds.len() {
            self.bounds.resize(num_of_states, None);
            self.targets.resize(num_of_states, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotient_bounds() {
        let mut bounds = QuotientBounds::new(2);
        bounds.set_bound(QuotientStateIndex::new(1), 0.25);
        bounds.set_target(QuotientStateIndex::new(3));

        assert_eq!(bounds.num_of_states(), 4);
        assert_eq!(bounds.bound(QuotientStateIndex::new(0)), None);
        assert_eq!(bounds.bound(QuotientStateIndex::new(1)), Some(0.25));
        assert_eq!(bounds.bound(QuotientStateIndex::new(10)), None);
        assert!(bounds.is_target(QuotientStateIndex::new(3)));
        assert!(!bounds.is_target(QuotientStateIndex::new(2)));
        assert!(!QuotientBounds::default().is_target(QuotientStateIndex::new(0)));
    }
}
