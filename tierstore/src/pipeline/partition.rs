//! Identifier-hash partitioning that keeps per-record work serialized.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Stable lane for an identifier. `lanes` must be non-zero.
pub fn partition_of(id: &str, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}

/// Group item positions into lanes, preserving delivery order within each
/// lane. Items without an identifier are spread by position; they fail
/// validation without touching storage.
pub fn assign_lanes<'a, I>(ids: I, lanes: usize) -> Vec<Vec<usize>>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out = vec![Vec::new(); lanes];
    for (pos, id) in ids.into_iter().enumerate() {
        let lane = match id {
            Some(id) => partition_of(id, lanes),
            None => pos % lanes,
        };
        out[lane].push(pos);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_same_lane() {
        for lanes in 1..8 {
            assert_eq!(partition_of("R1", lanes), partition_of("R1", lanes));
            assert!(partition_of("R1", lanes) < lanes);
        }
    }

    #[test]
    fn test_lanes_preserve_order_and_cover_all_items() {
        let ids = vec![Some("a"), Some("b"), Some("a"), None, Some("c"), Some("a")];
        let lanes = assign_lanes(ids.iter().copied(), 3);

        let mut all: Vec<usize> = lanes.iter().flatten().copied().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);

        let lane_of_a = partition_of("a", 3);
        let a_positions: Vec<usize> = lanes[lane_of_a]
            .iter()
            .copied()
            .filter(|p| ids[*p] == Some("a"))
            .collect();
        assert_eq!(a_positions, vec![0, 2, 5]);
        for lane in &lanes {
            assert!(lane.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
