//! Named, independently seeded random number streams.
//!
//! Each concern of the simulation (movement, transmission, migration, ...) declares its own
//! [`RngId`] with [`define_rng!`](crate::define_rng). All streams derive their seed from one
//! base seed plus a hash of the stream's name, so two runs with the same base seed draw exactly
//! the same numbers, and adding draws to one stream never shifts the numbers seen by another.
mod macros;

use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};

use log::trace;

use crate::hashing::{hash_str, HashMap};
use crate::rand::distr::uniform::{SampleRange, SampleUniform};
use crate::rand::distr::Distribution;
use crate::rand::{Rng, SeedableRng};

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng;
    fn get_name() -> &'static str;
}

// This is a wrapper that allows for future support for different types of
// random number generators (anything that implements SeedableRng is valid).
struct RngHolder {
    rng: Box<dyn Any>,
}

/// Stores the base seed and the lazily created generator for every [`RngId`] used so far.
///
/// Generators live in a `RefCell` so that sampling only needs `&self`.
pub struct RngSource {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, RngHolder>>,
}

impl RngSource {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        trace!("initializing random streams (seed={})", base_seed);
        RngSource {
            base_seed,
            rng_holders: RefCell::new(HashMap::default()),
        }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Resets the base seed. Existing generators are dropped so they get re-seeded on next use.
    pub fn reseed(&mut self, base_seed: u64) {
        self.base_seed = base_seed;
        self.rng_holders.get_mut().clear();
    }

    /// Gets a mutable reference to the generator associated with `R`, creating it from the
    /// base seed if it has not been used before.
    fn get_rng<R: RngId + 'static>(&self) -> RefMut<'_, R::RngType> {
        let rng_holders = self
            .rng_holders
            .try_borrow_mut()
            .expect("random stream is already borrowed");
        RefMut::map(rng_holders, |holders| {
            holders
                .entry(TypeId::of::<R>())
                .or_insert_with(|| {
                    trace!(
                        "creating new RNG {} (seed={})",
                        R::get_name(),
                        self.base_seed
                    );
                    let seed_offset = hash_str(R::get_name());
                    RngHolder {
                        rng: Box::new(R::RngType::seed_from_u64(
                            self.base_seed.wrapping_add(seed_offset),
                        )),
                    }
                })
                .rng
                .downcast_mut::<R::RngType>()
                .expect("RngId registered with a different generator type")
        })
    }

    /// Applies `sampler` to the generator associated with `R`.
    pub fn sample<R: RngId + 'static, T>(
        &self,
        _rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        let mut rng = self.get_rng::<R>();
        sampler(&mut rng)
    }

    /// Gets a random sample from `distribution` using the generator associated with `R`.
    pub fn sample_distr<R: RngId + 'static, T>(
        &self,
        _rng_id: R,
        distribution: impl Distribution<T>,
    ) -> T
    where
        R::RngType: Rng,
    {
        let mut rng = self.get_rng::<R>();
        distribution.sample::<R::RngType>(&mut rng)
    }

    /// Gets a random sample within `range` using the generator associated with `R`.
    pub fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    /// Gets a random boolean which is true with probability `p`. `p` must lie in `[0, 1]`.
    pub fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| rng.random_bool(p))
    }
}

impl Default for RngSource {
    fn default() -> Self {
        RngSource::new(0)
    }
}

#[cfg(test)]
mod test {
    use super::RngSource;
    use crate::define_rng;
    use crate::rand::distr::weighted::WeightedIndex;
    use crate::rand::RngCore;

    define_rng!(FooRng);
    define_rng!(BarRng);

    #[test]
    fn get_rng_basic() {
        let source = RngSource::new(42);

        assert_ne!(
            source.sample(FooRng, RngCore::next_u64),
            source.sample(FooRng, RngCore::next_u64)
        );
    }

    #[test]
    fn multiple_rng_types() {
        let source = RngSource::new(42);

        assert_ne!(
            source.sample(FooRng, RngCore::next_u64),
            source.sample(BarRng, RngCore::next_u64)
        );
    }

    #[test]
    fn reset_seed() {
        let mut source = RngSource::new(42);

        let run_0 = source.sample(FooRng, RngCore::next_u64);
        let run_1 = source.sample(FooRng, RngCore::next_u64);

        // Reset with same seed, ensure we get the same values
        source.reseed(42);
        assert_eq!(run_0, source.sample(FooRng, RngCore::next_u64));
        assert_eq!(run_1, source.sample(FooRng, RngCore::next_u64));

        // Reset with different seed, ensure we get different values
        source.reseed(88);
        assert_ne!(run_0, source.sample(FooRng, RngCore::next_u64));
        assert_ne!(run_1, source.sample(FooRng, RngCore::next_u64));
    }

    #[test]
    fn streams_are_independent() {
        let with_interleaving = RngSource::new(7);
        let without_interleaving = RngSource::new(7);

        let a = with_interleaving.sample(FooRng, RngCore::next_u64);
        with_interleaving.sample(BarRng, RngCore::next_u64);
        let b = with_interleaving.sample(FooRng, RngCore::next_u64);

        assert_eq!(a, without_interleaving.sample(FooRng, RngCore::next_u64));
        assert_eq!(b, without_interleaving.sample(FooRng, RngCore::next_u64));
    }

    #[test]
    fn sample_distribution() {
        let source = RngSource::new(42);

        // Zero is selected with probability 1/3, one with a probability of 2/3.
        let weights = WeightedIndex::new(vec![1.0, 2.0]).unwrap();
        let n_samples = 3000;
        let mut zero_counter = 0;
        for _ in 0..n_samples {
            if source.sample_distr(FooRng, &weights) == 0 {
                zero_counter += 1;
            }
        }
        // The expected value of `zero_counter` is 1000.
        assert!((zero_counter - 1000_i32).abs() < 100);
    }

    #[test]
    fn sample_continuous_distribution() {
        let source = RngSource::new(42);
        let exponential = rand_distr::Exp::new(2.0).unwrap();
        let n_samples = 4000;
        let mean = (0..n_samples)
            .map(|_| source.sample_distr(FooRng, exponential))
            .sum::<f64>()
            / f64::from(n_samples);
        assert!((mean - 0.5).abs() < 0.05);
    }

    #[test]
    fn sample_range() {
        let source = RngSource::new(42);
        let result = source.sample_range(FooRng, 0..10);
        assert!((0..10).contains(&result));
    }

    #[test]
    fn sample_bool_extremes() {
        let source = RngSource::new(42);
        assert!(source.sample_bool(FooRng, 1.0));
        assert!(!source.sample_bool(FooRng, 0.0));
    }
}
