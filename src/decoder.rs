//! Mapping reconstructed rating distributions back to scalar ratings.
//!
//! A reconstruction gives, for every item, a distribution over the `K` rating
//! levels. The decoder turns one item's distribution into a rating using the
//! same [`RatingScale`] the tensorizer used to encode it:
//!
//! - [`DecodePolicy::Softmax`]: expected rating `Σ p[k] · value(k)`, continuous.
//! - [`DecodePolicy::OneHot`]: value of the most probable level, discrete.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::trainset::RatingScale;

/// How a per-item level distribution is turned into a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodePolicy {
    /// Probability-weighted mean of the level values.
    Softmax,
    /// Value of the argmax level.
    OneHot,
}

/// Decodes level distributions on a fixed rating scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingDecoder {
    policy: DecodePolicy,
    scale: RatingScale,
}

impl RatingDecoder {
    /// Creates a decoder for `scale`.
    pub fn new(policy: DecodePolicy, scale: RatingScale) -> Self {
        Self { policy, scale }
    }

    /// The active policy.
    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// The rating scale levels are mapped onto.
    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    /// Decodes one item's distribution over the rating levels.
    pub fn decode(&self, distribution: ArrayView1<'_, f32>) -> f32 {
        match self.policy {
            DecodePolicy::Softmax => self.expected_rating(distribution),
            DecodePolicy::OneHot => self.argmax_rating(distribution),
        }
    }

    /// `Σ p[k] · value(k)`, renormalizing when the mass does not sum to one.
    ///
    /// An all-zero distribution decodes to the middle of the scale.
    pub fn expected_rating(&self, distribution: ArrayView1<'_, f32>) -> f32 {
        let mass: f32 = distribution.sum();
        if mass <= 0.0 || !mass.is_finite() {
            return self.scale.midpoint();
        }

        let weighted: f32 = distribution
            .iter()
            .enumerate()
            .map(|(k, &p)| p * self.scale.value_of(k))
            .sum();
        self.scale.clamp(weighted / mass)
    }

    /// Value of the most probable level; ties go to the lowest level.
    pub fn argmax_rating(&self, distribution: ArrayView1<'_, f32>) -> f32 {
        self.scale.value_of(argmax(distribution))
    }
}

/// Index of the first maximum; `0` for an empty view.
pub(crate) fn argmax(values: ArrayView1<'_, f32>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_k, best_p), (k, &p)| {
            if p > best_p {
                (k, p)
            } else {
                (best_k, best_p)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn stars() -> RatingScale {
        RatingScale::integer(1, 5).unwrap()
    }

    #[test]
    fn test_softmax_expectation() {
        let decoder = RatingDecoder::new(DecodePolicy::Softmax, stars());
        let dist = array![0.0, 0.0, 0.5, 0.5, 0.0];
        assert!((decoder.decode(dist.view()) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_renormalizes() {
        let decoder = RatingDecoder::new(DecodePolicy::Softmax, stars());
        let dist = array![2.0, 0.0, 0.0, 0.0, 2.0];
        assert!((decoder.decode(dist.view()) - 3.0).abs() < 1e-6);

        let empty = array![0.0, 0.0, 0.0, 0.0, 0.0];
        assert!((decoder.decode(empty.view()) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_onehot_adds_base_offset() {
        let decoder = RatingDecoder::new(DecodePolicy::OneHot, stars());
        let dist = array![0.1, 0.2, 0.1, 0.5, 0.1];
        assert_eq!(decoder.decode(dist.view()), 4.0);

        let half_stars = RatingScale::new(0.5, 5.0, 0.5).unwrap();
        let decoder = RatingDecoder::new(DecodePolicy::OneHot, half_stars);
        let mut dist = ndarray::Array1::zeros(10);
        dist[0] = 1.0;
        assert_eq!(decoder.decode(dist.view()), 0.5);
    }

    #[test]
    fn test_policies_agree_on_certain_distribution() {
        let scale = stars();
        let softmax = RatingDecoder::new(DecodePolicy::Softmax, scale);
        let onehot = RatingDecoder::new(DecodePolicy::OneHot, scale);

        for k in 0..scale.n_levels() {
            let mut dist = ndarray::Array1::zeros(scale.n_levels());
            dist[k] = 1.0;
            let a = softmax.decode(dist.view());
            let b = onehot.decode(dist.view());
            assert!((a - b).abs() < 1e-6, "level {k}: softmax={a} onehot={b}");
            assert!((a - scale.value_of(k)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_argmax_ties_pick_lowest() {
        let values = array![0.3, 0.3, 0.1];
        assert_eq!(argmax(values.view()), 0);
    }
}
