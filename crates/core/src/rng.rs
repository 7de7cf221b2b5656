//! Seeded random source shared by every stochastic call path
//!
//! Each Monte Carlo run owns one `SimRng`. Wind models and the transport
//! engine receive it by `&mut` so identical seeds reproduce identical runs.
//! `ChaCha8Rng` keeps the stream stable across platforms and rand releases.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Random source used by a single run
pub type SimRng = ChaCha8Rng;

/// Create the random source for one run
///
/// `None` opts out of reproducibility and seeds from OS entropy.
pub fn sim_rng(seed: Option<u64>) -> SimRng {
    match seed {
        Some(seed) => SimRng::seed_from_u64(seed),
        None => SimRng::from_os_rng(),
    }
}

/// Draw one sample from N(0, std)
///
/// A standard normal is always drawn, even for `std == 0`, so the stream
/// layout does not depend on parameter values.
#[inline]
pub fn gaussian(rng: &mut SimRng, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std
}

/// Fill a buffer with `mean + N(0, std)` draws, in index order
pub fn fill_gaussian(rng: &mut SimRng, mean: f64, std: f64, out: &mut [f64]) {
    for value in out {
        *value = mean + gaussian(rng, std);
    }
}
