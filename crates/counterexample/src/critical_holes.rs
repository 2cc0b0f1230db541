#![forbid(unsafe_code)]

use crate::HoleIndex;
use crate::HoleWaves;
use crate::WaveIndex;

/// Returns the holes registered at a wave in `1..=stopping_wave`, in increasing order.
///
/// Panics when the stopping wave does not exist.
pub fn extract_critical_holes(hole_waves: &HoleWaves, stopping_wave: WaveIndex) -> Vec<HoleIndex> {
    assert!(
        *stopping_wave < hole_waves.num_of_waves(),
        "Stopping wave {stopping_wave} does not exist, there are only {} waves",
        hole_waves.num_of_waves()
    );

    hole_waves
        .iter()
        .filter_map(|(hole, wave)| wave.filter(|wave| *wave <= stopping_wave).map(|_| hole))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use sketch_markov::DtmcBuilder;
    use sketch_markov::StateIndex;

    use crate::ChoiceHoles;
    use crate::ResolvedChain;
    use crate::compute_waves;

    /// The chain 0 -> 1 -> 2 -> 3 in which state `i` depends on hole `i - 1`.
    fn hole_waves() -> HoleWaves {
        let mut builder = DtmcBuilder::new(4);
        for state in 0..3 {
            builder.add_transition(StateIndex::new(state), 1.0, StateIndex::new(state + 1));
        }
        builder.add_transition(StateIndex::new(3), 1.0, StateIndex::new(3));
        let chain = ResolvedChain::identity(builder.finish(StateIndex::new(0)).unwrap());

        let choice_holes = ChoiceHoles::new(
            4,
            vec![vec![], vec![HoleIndex::new(0)], vec![HoleIndex::new(1)], vec![HoleIndex::new(2)]],
        )
        .unwrap();

        compute_waves(&chain, &choice_holes).unwrap().0
    }

    #[test]
    fn test_extract_critical_holes() {
        let hole_waves = hole_waves();
        assert_eq!(hole_waves.num_of_waves(), 4);

        assert!(extract_critical_holes(&hole_waves, WaveIndex::new(0)).is_empty());
        assert_eq!(
            extract_critical_holes(&hole_waves, WaveIndex::new(2)),
            vec![HoleIndex::new(0), HoleIndex::new(1)]
        );

        // Hole 3 is never needed.
        assert_eq!(extract_critical_holes(&hole_waves, WaveIndex::new(3)).len(), 3);
    }

    #[test]
    #[should_panic]
    fn test_extract_critical_holes_out_of_range() {
        extract_critical_holes(&hole_waves(), WaveIndex::new(4));
    }
}
