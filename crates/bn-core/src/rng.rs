//! A seeded random source owned by a single query or reconstruction job.
//!
//! Unlike a process-global RNG, `BnRng` is created explicitly from a seed
//! and threaded through the call that needs it, so that two runs given the
//! same seed (and the same network/evidence) reproduce identical samples
//! and identical per-column ancestral reconstructions — required once
//! reconstruction is parallelised across alignment columns, since a shared
//! global RNG's draw order would otherwise depend on scheduling.

use rand::rngs::SmallRng;
use rand::SeedableRng;

#[derive(Clone, Debug)]
pub struct BnRng {
    rng: SmallRng,
}

impl BnRng {
    pub fn seeded(seed: u64) -> Self {
        BnRng {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Derive an independent child stream for a sub-task (e.g. one
    /// alignment column), so parallel jobs don't share mutable RNG state.
    pub fn fork(&mut self, task_index: u64) -> Self {
        use rand::Rng;
        let mixed = self.rng.random::<u64>() ^ task_index.wrapping_mul(0x9E3779B97F4A7C15);
        BnRng::seeded(mixed)
    }

    pub fn inner(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_seed_reproduces_draws() {
        let mut a = BnRng::seeded(42);
        let mut b = BnRng::seeded(42);
        let xs: Vec<f64> = (0..10).map(|_| a.inner().random::<f64>()).collect();
        let ys: Vec<f64> = (0..10).map(|_| b.inner().random::<f64>()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn forked_streams_diverge() {
        let mut a = BnRng::seeded(1);
        let mut c1 = a.fork(0);
        let mut c2 = a.fork(1);
        assert_ne!(c1.inner().random::<u64>(), c2.inner().random::<u64>());
    }
}
