//! Small sampling helpers.

use rand::Rng;

/// Weighted random choice: returns an index with probability proportional
/// to its weight. Zero-weight entries are never chosen. Returns `None` when
/// all weights are zero.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Option<usize> {
    let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    if total == 0 {
        return None;
    }
    let mut draw = rng.random_range(0..total);
    for (i, &weight) in weights.iter().enumerate() {
        let weight = u64::from(weight);
        if draw < weight {
            return Some(i);
        }
        draw -= weight;
    }
    unreachable!("draw below total weight")
}
