use rand::Rng;
use rand::rngs::StdRng;

use crate::types::CancelToken;

/// Common Monte-Carlo controls shared by the league and knockout simulators.
///
/// With `seed` set, every trial derives its own RNG from the seed and the
/// trial index, so results are identical run to run and independent of how
/// rayon schedules the trials.
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub n_trials: usize,
    pub seed: Option<u64>,
    pub cancel: Option<CancelToken>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            n_trials: 10_000,
            seed: None,
            cancel: None,
        }
    }
}

impl SimOptions {
    pub fn seeded(n_trials: usize, seed: u64) -> Self {
        Self {
            n_trials,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Draw a goal count from Poisson(lambda) by Knuth's product method.
/// Fine for the small lambdas match simulation uses; the hard cap only
/// guards against a pathological stream of near-1.0 uniforms.
pub fn sample_poisson(rng: &mut StdRng, lambda: f64) -> u32 {
    let limit = (-lambda.max(0.0)).exp();
    let mut product = 1.0;
    let mut goals = 0u32;
    loop {
        product *= rng.gen_range(0.0..1.0);
        if product <= limit || goals >= 30 {
            return goals;
        }
        goals += 1;
    }
}
