//! Stochastic sampling used during contrastive divergence.
//!
//! Training draws binary hidden states and categorical visible states from the
//! probabilities the model computes; inference never samples. Keeping the
//! sampler in its own type means the reconstruction path cannot reach a random
//! source at all.
//!
//! All draws come from one [`StdRng`] seeded at construction, so a training run
//! is reproducible given its seed.

use ndarray::{s, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded sampler for the Gibbs step of CD-1.
#[derive(Debug, Clone)]
pub struct GibbsSampler {
    rng: StdRng,
}

impl GibbsSampler {
    /// Creates a sampler seeded from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws `h ~ Bernoulli(p)` element-wise.
    pub fn bernoulli(&mut self, probabilities: ArrayView2<'_, f32>) -> Array2<f32> {
        probabilities.mapv(|p| {
            if self.rng.random::<f32>() < p {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Draws one level per item block from per-block categorical distributions.
    ///
    /// `probabilities` is `[batch, n_items * n_levels]` with every block of
    /// `n_levels` summing to one. Only items that are observed in the matching
    /// row of `observed` (any non-zero slot in the block) are sampled; the other
    /// blocks stay all-zero so unrated items never contribute to the gradient.
    pub fn categorical_blocks(
        &mut self,
        probabilities: ArrayView2<'_, f32>,
        observed: ArrayView2<'_, f32>,
        n_levels: usize,
    ) -> Array2<f32> {
        let mut sample = Array2::zeros(probabilities.raw_dim());
        let n_items = probabilities.len_of(Axis(1)) / n_levels;

        for (row, (probs, mask)) in probabilities
            .outer_iter()
            .zip(observed.outer_iter())
            .enumerate()
        {
            for item in 0..n_items {
                let (start, end) = (item * n_levels, (item + 1) * n_levels);
                if mask.slice(s![start..end]).iter().all(|&v| v == 0.0) {
                    continue;
                }

                let level = self.draw_level(probs.slice(s![start..end]).iter().copied());
                sample[[row, item * n_levels + level]] = 1.0;
            }
        }

        sample
    }

    /// Inverse-CDF draw over one block; falls back to the last level when
    /// rounding leaves the cumulative mass just below the draw.
    fn draw_level(&mut self, probabilities: impl ExactSizeIterator<Item = f32>) -> usize {
        let last = probabilities.len().saturating_sub(1);
        let u: f32 = self.rng.random();
        let mut cumulative = 0.0;
        for (level, p) in probabilities.enumerate() {
            cumulative += p;
            if u < cumulative {
                return level;
            }
        }
        last
    }
}
