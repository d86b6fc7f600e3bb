use crate::config;
use crate::geometry::Point;
use rayon::prelude::*;
use std::str::FromStr;
use tracing::info_span;

/// Sorts a key array and a parallel value array by key, in place.
///
/// Order among equal keys is unspecified. `num_keys` is an exclusive upper
/// bound on every key.
pub trait PairSort: Send + Sync {
    fn sort_pairs(&self, keys: &mut [usize], values: &mut [Point], num_keys: usize);
}

/// Comparison sort of zipped pairs on the rayon pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParallelSort;

impl PairSort for ParallelSort {
    fn sort_pairs(&self, keys: &mut [usize], values: &mut [Point], _num_keys: usize) {
        let _s = info_span!("ParallelSort::sort_pairs", n = keys.len()).entered();
        debug_assert_eq!(keys.len(), values.len());

        let mut pairs: Vec<(usize, Point)> = keys
            .iter()
            .copied()
            .zip(values.iter().copied())
            .collect();

        if config::use_parallel(pairs.len()) {
            pairs.par_sort_unstable_by_key(|&(k, _)| k);
            keys.par_iter_mut()
                .zip(values.par_iter_mut())
                .zip(pairs.par_iter())
                .for_each(|((k, v), &(sk, sv))| {
                    *k = sk;
                    *v = sv;
                });
        } else {
            pairs.sort_unstable_by_key(|&(k, _)| k);
            for ((k, v), &(sk, sv)) in keys.iter_mut().zip(values.iter_mut()).zip(&pairs) {
                *k = sk;
                *v = sv;
            }
        }
    }
}

/// Counting sort over the bounded key range: histogram, exclusive prefix
/// sum, scatter. Stable, O(n + num_keys).
#[derive(Clone, Copy, Debug, Default)]
pub struct CountingSort;

impl PairSort for CountingSort {
    fn sort_pairs(&self, keys: &mut [usize], values: &mut [Point], num_keys: usize) {
        let _s = info_span!("CountingSort::sort_pairs", n = keys.len(), num_keys).entered();
        debug_assert_eq!(keys.len(), values.len());

        let mut offsets = vec![0usize; num_keys];
        for &k in keys.iter() {
            offsets[k] += 1;
        }
        let mut accum = 0;
        for slot in offsets.iter_mut() {
            let count = *slot;
            *slot = accum;
            accum += count;
        }

        let mut sorted_keys = vec![0usize; keys.len()];
        let mut sorted_values = vec![Point::zeros(); values.len()];
        for (&k, &v) in keys.iter().zip(values.iter()) {
            let loc = offsets[k];
            sorted_keys[loc] = k;
            sorted_values[loc] = v;
            offsets[k] += 1;
        }

        keys.copy_from_slice(&sorted_keys);
        values.copy_from_slice(&sorted_values);
    }
}

/// Sort implementation chosen at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBackend {
    #[default]
    Parallel,
    Counting,
}

impl PairSort for SortBackend {
    fn sort_pairs(&self, keys: &mut [usize], values: &mut [Point], num_keys: usize) {
        match self {
            Self::Parallel => ParallelSort.sort_pairs(keys, values, num_keys),
            Self::Counting => CountingSort.sort_pairs(keys, values, num_keys),
        }
    }
}

impl FromStr for SortBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "counting" => Ok(Self::Counting),
            other => Err(format!(
                "Unknown sort backend '{}', expected 'parallel' or 'counting'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<usize>, Vec<Point>) {
        let keys = vec![3, 0, 2, 3, 1, 0];
        let values = keys
            .iter()
            .enumerate()
            .map(|(i, &k)| Point::new(k as f64, i as f64))
            .collect();
        (keys, values)
    }

    fn check_sorted(keys: &[usize], values: &[Point]) {
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        // Each value still travels with its key
        for (k, v) in keys.iter().zip(values) {
            assert_eq!(*k as f64, v.x);
        }
    }

    #[test]
    fn test_parallel_sort() {
        let (mut keys, mut values) = sample();
        ParallelSort.sort_pairs(&mut keys, &mut values, 4);
        assert_eq!(keys, vec![0, 0, 1, 2, 3, 3]);
        check_sorted(&keys, &values);
    }

    #[test]
    fn test_counting_sort_is_stable() {
        let (mut keys, mut values) = sample();
        CountingSort.sort_pairs(&mut keys, &mut values, 4);
        assert_eq!(keys, vec![0, 0, 1, 2, 3, 3]);
        check_sorted(&keys, &values);
        let order: Vec<f64> = values.iter().map(|v| v.y).collect();
        assert_eq!(order, vec![1.0, 5.0, 4.0, 2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_large_input() {
        let n = 20_000;
        let mut keys: Vec<usize> = (0..n).map(|i| (i * 7919) % 97).collect();
        let mut values: Vec<Point> = keys.iter().map(|&k| Point::new(k as f64, 0.0)).collect();
        let mut keys_c = keys.clone();
        let mut values_c = values.clone();

        ParallelSort.sort_pairs(&mut keys, &mut values, 97);
        CountingSort.sort_pairs(&mut keys_c, &mut values_c, 97);

        check_sorted(&keys, &values);
        check_sorted(&keys_c, &values_c);
        assert_eq!(keys, keys_c);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("parallel".parse::<SortBackend>(), Ok(SortBackend::Parallel));
        assert_eq!("Counting".parse::<SortBackend>(), Ok(SortBackend::Counting));
        assert!("radix".parse::<SortBackend>().is_err());

        let (mut keys, mut values) = sample();
        SortBackend::Counting.sort_pairs(&mut keys, &mut values, 4);
        check_sorted(&keys, &values);
    }
}
