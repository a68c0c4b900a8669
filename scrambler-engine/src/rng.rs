use std::fmt;

use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, RngCore, SeedableRng};

/// The random source behind every impairment decision.
///
/// Any [`RngCore`] can be plugged in. Seeding it makes loss, jitter, reordering and corruption
/// fully deterministic for a given input sequence.
pub struct SharedRng {
    inner: Mutex<Box<dyn RngCore + Send>>,
}

impl fmt::Debug for SharedRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRng").finish_non_exhaustive()
    }
}

impl SharedRng {
    pub fn new<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self { inner: Mutex::new(Box::new(rng)) }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Seeded if `seed` is set, otherwise from OS entropy.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Returns `true` with probability `p`.
    #[inline]
    pub fn chance(&self, p: f64) -> bool {
        self.inner.lock().gen::<f64>() < p
    }

    /// Uniform integer in `[0, bound)`, or 0 if `bound` is 0.
    #[inline]
    pub fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        self.inner.lock().gen_range(0..bound)
    }

    /// Uniform value in `[-radius, radius]`, or 0 if `radius` is not positive.
    #[inline]
    pub fn symmetric(&self, radius: f64) -> f64 {
        if radius <= 0.0 {
            return 0.0;
        }
        self.inner.lock().gen_range(-radius..=radius)
    }

    /// Applies a uniform random permutation to `items`.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *self.inner.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let a = SharedRng::seeded(7);
        let b = SharedRng::seeded(7);
        for _ in 0..100 {
            assert_eq!(a.below(1000), b.below(1000));
        }
    }

    #[test]
    fn edge_probabilities() {
        let rng = SharedRng::seeded(1);
        for _ in 0..1000 {
            assert!(rng.chance(1.0));
            assert!(!rng.chance(0.0));
        }
    }

    #[test]
    fn degenerate_ranges_return_zero() {
        let rng = SharedRng::seeded(1);
        assert_eq!(rng.below(0), 0);
        assert_eq!(rng.symmetric(0.0), 0.0);
        assert_eq!(rng.symmetric(-1.0), 0.0);
    }

    #[test]
    fn symmetric_stays_within_radius() {
        let rng = SharedRng::seeded(3);
        for _ in 0..1000 {
            let v = rng.symmetric(0.5);
            assert!((-0.5..=0.5).contains(&v));
        }
    }
}
