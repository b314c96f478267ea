// Reservoir sampling: uniform k-subsets drawn from a single pass over a sequence.

use rand::Rng;

/// Draw `min(k, n)` elements uniformly at random from `items` (Algorithm R).
///
/// The input is consumed once and only the reservoir is kept in memory, so the
/// sequence may be of unknown length. Every input element ends up in the output
/// with probability `k / n`. The relative order of the result is unspecified.
pub fn reservoir_sample<T, I, R>(items: I, rng: &mut R, k: usize) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    R: Rng + ?Sized,
{
    let mut reservoir = Vec::with_capacity(k);
    if k == 0 {
        return reservoir;
    }

    let mut iter = items.into_iter();
    for item in iter.by_ref() {
        reservoir.push(item);
        if reservoir.len() == k {
            break;
        }
    }

    // `seen` counts the elements consumed so far, including the current one.
    let mut seen = k;
    for item in iter {
        seen += 1;
        let j = rng.gen_range(0..seen);
        if j < k {
            reservoir[j] = item;
        }
    }

    reservoir
}

/// Draw a single element uniformly at random, or `None` for an empty sequence.
pub fn sample_one<T, I, R>(items: I, rng: &mut R) -> Option<T>
where
    I: IntoIterator<Item = T>,
    R: Rng + ?Sized,
{
    reservoir_sample(items, rng, 1).pop()
}
