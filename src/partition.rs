use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffle `indices` and split off `val_count` of them for validation.
/// Returns `(train, val)`, which are disjoint.
pub fn random_split<R: Rng + ?Sized>(
    indices: &[usize],
    val_count: usize,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut shuffled = indices.to_vec();
    shuffled.shuffle(rng);
    let val_count = val_count.min(shuffled.len());
    let train = shuffled.split_off(val_count);
    (train, shuffled)
}

/// `num_samples` indices drawn uniformly with replacement from `0..len`,
/// e.g. `passes * len` draws for one training epoch.
pub fn sample_with_replacement<R: Rng + ?Sized>(
    len: usize,
    num_samples: usize,
    rng: &mut R,
) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    (0..num_samples).map(|_| rng.gen_range(0..len)).collect()
}
