//! Jitter source for retry backoff.
//!
//! A config-provided seed makes every backoff delay reproducible across
//! runs; without one the stream is seeded from OS entropy.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct JitterRng {
    inner: Pcg64Mcg,
}

impl JitterRng {
    pub fn from_seed(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { inner: Pcg64Mcg::from_entropy() }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    /// Uniform multiplier in `[min, max]`.
    pub fn multiplier(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.inner.gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = JitterRng::from_seed(7);
        let mut b = JitterRng::from_seed(7);
        for _ in 0..50 {
            assert_eq!(a.multiplier(0.8, 1.2), b.multiplier(0.8, 1.2));
        }
    }

    #[test]
    fn multiplier_stays_in_range() {
        let mut rng = JitterRng::from_seed(0xC0FFEE);
        for _ in 0..1_000 {
            let m = rng.multiplier(0.8, 1.2);
            assert!((0.8..=1.2).contains(&m), "out of range: {m}");
        }
        assert_eq!(rng.multiplier(1.0, 1.0), 1.0);
    }
}
