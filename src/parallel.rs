//! Independent-trial dispatch.
//!
//! Monte Carlo trials and baseline replicates run on a dedicated rayon pool.
//! Every trial gets its own `ChaCha8Rng` seeded from a value drawn from the
//! experiment RNG before dispatch, so results do not depend on thread count or
//! scheduling. The first failing trial aborts the batch.

use crate::data::Example;
use crate::error::{ExperimentError, Result};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Draw one child seed per trial from the parent RNG
pub(crate) fn fork_seeds<R: RngCore + ?Sized>(rng: &mut R, trials: usize) -> Vec<u64> {
    (0..trials).map(|_| rng.next_u64()).collect()
}

/// Run `trial` once per seed on a pool of `workers` threads (0 = rayon default).
///
/// Results come back in seed order.
pub(crate) fn run_trials<T, F>(workers: usize, seeds: &[u64], trial: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, &mut ChaCha8Rng) -> Result<T> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| {
            ExperimentError::InvalidConfiguration(format!("cannot start worker pool: {e}"))
        })?;

    pool.install(|| {
        seeds
            .par_iter()
            .enumerate()
            .map(|(index, &seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                trial(index, &mut rng)
            })
            .collect()
    })
}

/// Uniform draw of `amount` distinct examples, in random order
pub(crate) fn draw_random<'a, R: Rng + ?Sized>(
    pool: &'a [Example],
    amount: usize,
    rng: &mut R,
) -> Result<Vec<&'a Example>> {
    if amount > pool.len() {
        return Err(ExperimentError::InsufficientData(format!(
            "cannot draw {amount} examples from a pool of {}",
            pool.len()
        )));
    }
    Ok(rand::seq::index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|i| &pool[i])
        .collect())
}
