//! Seedable zero-mean Gaussian noise for particle diffusion.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Draws independent samples from `N(0, σ²)`.
///
/// Construct with [`GaussianNoiseSource::seeded`] for reproducible sequences
/// (tests, replays) or [`GaussianNoiseSource::from_entropy`] in production.
/// Not internally synchronized; [`MotionModel`][crate::motion_model::MotionModel]
/// wraps its instance in a mutex.
#[derive(Debug, Clone)]
pub struct GaussianNoiseSource {
    rng: StdRng,
}

impl GaussianNoiseSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// `Some(seed)` gives a deterministic source, `None` seeds from the OS.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// One draw with standard deviation `std_dev`.
    ///
    /// A zero standard deviation returns exactly `0.0` and leaves the engine
    /// state untouched.
    #[inline]
    pub fn sample(&mut self, std_dev: f64) -> f64 {
        if std_dev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = GaussianNoiseSource::seeded(42);
        let mut b = GaussianNoiseSource::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.sample(1.0), b.sample(1.0));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = GaussianNoiseSource::seeded(1);
        let mut b = GaussianNoiseSource::seeded(2);
        let same = (0..16).filter(|_| a.sample(1.0) == b.sample(1.0)).count();
        assert!(same < 16);
    }

    #[test]
    fn zero_std_dev_is_exactly_zero() {
        let mut noise = GaussianNoiseSource::seeded(7);
        for _ in 0..10 {
            assert_eq!(noise.sample(0.0), 0.0);
        }
    }

    #[test]
    fn zero_std_dev_does_not_advance_engine() {
        let mut a = GaussianNoiseSource::seeded(9);
        let mut b = GaussianNoiseSource::seeded(9);
        a.sample(0.0);
        assert_eq!(a.sample(1.0), b.sample(1.0));
    }

    #[test]
    fn samples_are_calibrated() {
        let mut noise = GaussianNoiseSource::seeded(1234);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| noise.sample(2.0)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        assert!(mean.abs() < 0.1, "mean = {mean}");
        assert!((var.sqrt() - 2.0).abs() < 0.1, "std = {}", var.sqrt());
    }
}
