//! Restricted Boltzmann Machine with softmax visible units.
//!
//! Each item contributes a block of `K` visible units, one per rating level,
//! and the block is treated as a single categorical variable: the visible
//! conditional is a softmax over the block rather than `K` independent
//! Bernoulli units. Hidden units are binary.
//!
//! # Lifecycle
//!
//! ```text
//!  RbmBuilder ──size()──▶ Rbm (sized) ──fit()──▶ Rbm (trained) ──reconstruct()──▶ [M, K]
//!  (hyperparameters)      (weights allocated)      (parameters learned)
//! ```
//!
//! The width of the visible layer is only known once the rating tensor
//! exists, so construction is split in two: [`RbmBuilder`] carries the
//! validated hyperparameters and [`RbmBuilder::size`] returns a fully allocated
//! [`Rbm`]. Reconstructing with a model that has not been fitted fails with
//! `ModelNotTrained`.
//!
//! # Training
//!
//! One CD-1 step per mini-batch `V`:
//!
//! ```text
//! ph0 = σ(V·W + b_h)              h0 ~ Bernoulli(ph0)
//! pv1 = softmax_K(h0·Wᵀ + b_v)    V1 ~ Categorical(pv1)   (rated items only)
//! ph1 = σ(V1·W + b_h)
//!
//! ΔW   = (Vᵀ·ph0 − V1ᵀ·ph1) / B − l1·sign(W) − l2·W
//! Δb_v = mean(V − V1)
//! Δb_h = mean(ph0 − ph1)
//!
//! vel  = momentum·vel + lr·Δ      param += vel
//! ```
//!
//! After every epoch the validation users are reconstructed, decoded and
//! compared to their observed ratings; the resulting RMSE drives early
//! stopping. When early stopping is enabled the parameters of the best epoch
//! are restored before `fit` returns.

use std::time::Instant;

use ndarray::{s, Array, Array1, Array2, ArrayView2, ArrayViewMut1, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};

use crate::config::RbmConfig;
use crate::decoder::{argmax, DecodePolicy, RatingDecoder};
use crate::error::{RbmError, RbmResult};
use crate::metrics::{EpochMetrics, MetricsCollector, TrainingReport};
use crate::sampling::GibbsSampler;
use crate::tensor::RatingTensor;
use crate::trainset::RatingScale;

/// Standard deviation of the initial weights.
const INIT_WEIGHT_STD: f32 = 0.01;

/// Unsized RBM: validated hyperparameters, no parameters yet.
#[derive(Debug, Clone)]
pub struct RbmBuilder {
    config: RbmConfig,
}

impl RbmBuilder {
    /// Creates a builder from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(config: RbmConfig) -> RbmResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The hyperparameters.
    pub fn config(&self) -> &RbmConfig {
        &self.config
    }

    /// Allocates a model with `n_items * scale.n_levels()` visible units.
    ///
    /// Weights are drawn from `N(0, 0.01²)` with the configured seed; biases
    /// and momentum accumulators start at zero.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTrainset` when `n_items` is zero.
    pub fn size(&self, n_items: usize, scale: RatingScale) -> RbmResult<Rbm> {
        if n_items == 0 {
            return Err(RbmError::EmptyTrainset {
                users: 0,
                items: n_items,
            }
            .into());
        }

        let n_levels = scale.n_levels();
        let n_visible = n_items * n_levels;
        let n_hidden = self.config.n_hidden;

        let normal = Normal::new(0.0, INIT_WEIGHT_STD)
            .map_err(|e| RbmError::invalid_config(format!("weight initialization: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let weights = Array2::from_shape_fn((n_visible, n_hidden), |_| normal.sample(&mut rng));

        debug!(n_items, n_levels, n_visible, n_hidden, "sized RBM");

        Ok(Rbm {
            params: RbmParameters {
                weights,
                visible_bias: Array1::zeros(n_visible),
                hidden_bias: Array1::zeros(n_hidden),
            },
            velocity: RbmParameters::zeros(n_visible, n_hidden),
            decoder: RatingDecoder::new(self.config.decode_policy(), scale),
            sampler: GibbsSampler::new(self.config.seed.wrapping_add(1)),
            metrics: MetricsCollector::new(),
            state: ModelState::Sized,
            rmse: None,
            n_items,
            n_levels,
            config: self.config.clone(),
        })
    }
}

/// Weights and biases of an RBM.
#[derive(Debug, Clone, PartialEq)]
pub struct RbmParameters {
    /// `[n_visible, n_hidden]` connection weights.
    pub weights: Array2<f32>,
    /// `[n_visible]` visible biases.
    pub visible_bias: Array1<f32>,
    /// `[n_hidden]` hidden biases.
    pub hidden_bias: Array1<f32>,
}

impl RbmParameters {
    fn zeros(n_visible: usize, n_hidden: usize) -> Self {
        Self {
            weights: Array2::zeros((n_visible, n_hidden)),
            visible_bias: Array1::zeros(n_visible),
            hidden_bias: Array1::zeros(n_hidden),
        }
    }

    /// Name of the first parameter block holding NaN or infinity.
    fn first_non_finite(&self) -> Option<&'static str> {
        if !self.weights.iter().all(|v| v.is_finite()) {
            Some("weights")
        } else if !self.visible_bias.iter().all(|v| v.is_finite()) {
            Some("visible bias")
        } else if !self.hidden_bias.iter().all(|v| v.is_finite()) {
            Some("hidden bias")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelState {
    Sized,
    Trained,
}

/// A sized RBM over `n_items` items with `n_levels` rating levels each.
#[derive(Debug, Clone)]
pub struct Rbm {
    config: RbmConfig,
    n_items: usize,
    n_levels: usize,
    params: RbmParameters,
    velocity: RbmParameters,
    decoder: RatingDecoder,
    sampler: GibbsSampler,
    metrics: MetricsCollector,
    state: ModelState,
    rmse: Option<f32>,
}

impl Rbm {
    /// Number of visible units, `n_items * n_levels`.
    pub fn n_visible(&self) -> usize {
        self.n_items * self.n_levels
    }

    /// Number of hidden units.
    pub fn n_hidden(&self) -> usize {
        self.config.n_hidden
    }

    /// Number of items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of rating levels per item.
    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// Hyperparameters the model was built with.
    pub fn config(&self) -> &RbmConfig {
        &self.config
    }

    /// Current weights and biases.
    pub fn parameters(&self) -> &RbmParameters {
        &self.params
    }

    /// Decoder matching the configured policy and rating scale.
    pub fn decoder(&self) -> &RatingDecoder {
        &self.decoder
    }

    /// Whether `fit` has completed at least one epoch.
    pub fn is_trained(&self) -> bool {
        self.state == ModelState::Trained
    }

    /// Validation RMSE of the current parameters after the last `fit`.
    pub fn rmse(&self) -> Option<f32> {
        self.rmse
    }

    /// Per-epoch metrics of the last `fit`.
    pub fn history(&self) -> &[EpochMetrics] {
        self.metrics.epochs()
    }

    /// `P(h = 1 | v)` for a batch of flattened visible rows.
    pub fn hidden_probabilities(&self, visible: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut activation = visible.dot(&self.params.weights);
        activation += &self.params.hidden_bias;
        activation.mapv_inplace(sigmoid);
        activation
    }

    /// `P(v | h)` for a batch of hidden rows: a softmax over each item's levels.
    pub fn visible_probabilities(&self, hidden: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut logits = hidden.dot(&self.params.weights.t());
        logits += &self.params.visible_bias;
        for row in logits.rows_mut() {
            softmax_blocks(row, self.n_levels);
        }
        logits
    }

    /// Reconstructs one user's `[n_items, n_levels]` slice.
    ///
    /// Uses the hidden probabilities directly, so the result is a deterministic
    /// function of the parameters and the input. Under
    /// [`DecodePolicy::Softmax`] each item row is a distribution over levels;
    /// under [`DecodePolicy::OneHot`] it is the one-hot argmax of that
    /// distribution.
    ///
    /// # Errors
    ///
    /// - `ModelNotTrained` before `fit` has run.
    /// - `ShapeMismatch` if `row` is not `[n_items, n_levels]`.
    pub fn reconstruct(&self, row: ArrayView2<'_, f32>) -> RbmResult<Array2<f32>> {
        if !self.is_trained() {
            return Err(RbmError::ModelNotTrained.into());
        }
        if row.dim() != (self.n_items, self.n_levels) {
            return Err(RbmError::shape_mismatch(
                format!("[{}, {}]", self.n_items, self.n_levels),
                format!("{:?}", row.shape()),
            )
            .into());
        }
        Ok(self.reconstruct_row(row))
    }

    fn reconstruct_row(&self, row: ArrayView2<'_, f32>) -> Array2<f32> {
        let visible = RatingTensor::flatten_row(row).insert_axis(Axis(0));
        let hidden = self.hidden_probabilities(visible.view());
        let probs = self.visible_probabilities(hidden.view());

        let levels = self.n_levels;
        let mut reconstruction =
            Array2::from_shape_fn((self.n_items, levels), |(i, k)| probs[[0, i * levels + k]]);

        if self.decoder.policy() == DecodePolicy::OneHot {
            for mut item in reconstruction.rows_mut() {
                let best = argmax(item.view());
                item.fill(0.0);
                item[best] = 1.0;
            }
        }
        reconstruction
    }

    /// RMSE of decoded reconstructions against the observed ratings of `tensor`.
    ///
    /// # Errors
    ///
    /// - `ModelNotTrained` before `fit` has run.
    /// - `ShapeMismatch` if the tensor's width differs from the model.
    /// - `EmptyTrainset` if the tensor holds no ratings.
    pub fn validation_rmse(&self, tensor: &RatingTensor) -> RbmResult<f32> {
        if !self.is_trained() {
            return Err(RbmError::ModelNotTrained.into());
        }
        self.check_width(tensor)?;
        self.evaluate(tensor)
    }

    fn evaluate(&self, tensor: &RatingTensor) -> RbmResult<f32> {
        let mut squared_error = 0.0f64;
        let mut count = 0usize;

        for user in 0..tensor.n_users() {
            let row = tensor.user(user);
            let reconstruction = self.reconstruct_row(row);
            for (item, slot) in row.outer_iter().enumerate() {
                let Some(level) = slot.iter().position(|&v| v > 0.0) else {
                    continue;
                };
                let truth = self.decoder.scale().value_of(level);
                let estimate = self.decoder.decode(reconstruction.row(item));
                squared_error += f64::from(estimate - truth).powi(2);
                count += 1;
            }
        }

        if count == 0 {
            return Err(RbmError::EmptyTrainset {
                users: tensor.n_users(),
                items: tensor.n_items(),
            }
            .into());
        }
        Ok((squared_error / count as f64).sqrt() as f32)
    }

    /// Trains the model with CD-1 on `train`, validating on `validation`.
    ///
    /// Runs at most `max_epoch` epochs over mini-batches of `batch_size`
    /// consecutive users. With early stopping enabled, training stops after
    /// `patience` epochs without an RMSE improvement and the best-epoch
    /// parameters are restored. An empty validation tensor makes the training
    /// tensor double as the validation set.
    ///
    /// Calling `fit` again continues from the current parameters with the
    /// momentum accumulators, metrics and trained flag reset.
    ///
    /// # Errors
    ///
    /// - `ShapeMismatch` if a tensor's width differs from `n_visible`.
    /// - `EmptyTrainset` if `train` has no users or no ratings.
    /// - `NumericalInstability` if an update produces NaN or infinity.
    pub fn fit(
        &mut self,
        train: &RatingTensor,
        validation: &RatingTensor,
    ) -> RbmResult<TrainingReport> {
        self.check_width(train)?;
        self.check_width(validation)?;
        if train.n_users() == 0 || train.n_ratings() == 0 {
            return Err(RbmError::EmptyTrainset {
                users: train.n_users(),
                items: train.n_items(),
            }
            .into());
        }
        let eval_set = if validation.n_ratings() > 0 {
            validation
        } else {
            train
        };

        let max_epoch = self.config.max_epoch;
        let batch_size = self.config.batch_size;
        let n_users = train.n_users();

        self.begin_fit();
        let mut best_rmse = f32::INFINITY;
        let mut best_params: Option<RbmParameters> = None;
        let mut stale_epochs = 0;
        let mut stopped_early = false;

        for epoch in 1..=max_epoch {
            let started = Instant::now();
            let mut reconstruction_error = 0.0;
            let mut n_batches = 0;

            for start in (0..n_users).step_by(batch_size) {
                let batch = train.batch(start..(start + batch_size).min(n_users));
                reconstruction_error += self.contrastive_divergence(&batch, epoch)?;
                n_batches += 1;
            }

            let rmse = self.evaluate(eval_set)?;
            let improved = rmse < best_rmse - self.config.min_improvement;
            if improved {
                best_rmse = rmse;
                stale_epochs = 0;
                if self.config.early_stopping {
                    best_params = Some(self.params.clone());
                }
            } else {
                stale_epochs += 1;
            }

            let metrics = EpochMetrics {
                epoch,
                validation_rmse: rmse,
                reconstruction_error: reconstruction_error / n_batches as f32,
                improved,
                time_ms: started.elapsed().as_secs_f64() * 1000.0,
            };
            if self.config.verbose {
                info!(
                    epoch,
                    max_epoch,
                    rmse,
                    reconstruction_error = metrics.reconstruction_error,
                    "epoch complete"
                );
            } else {
                debug!(epoch, max_epoch, rmse, "epoch complete");
            }
            self.metrics.record_epoch(metrics);

            if self.config.early_stopping && stale_epochs >= self.config.patience {
                stopped_early = epoch < max_epoch;
                info!(
                    epoch,
                    best_rmse,
                    patience = self.config.patience,
                    "early stopping: no improvement"
                );
                break;
            }
        }

        let restored_best = match best_params {
            Some(best) => {
                self.params = best;
                true
            }
            None => false,
        };

        self.state = ModelState::Trained;
        let report = self.metrics.finalize(stopped_early, restored_best);
        self.rmse = Some(report.final_rmse);
        if self.config.verbose {
            info!("{}", self.metrics.summary());
        }
        Ok(report)
    }

    fn begin_fit(&mut self) {
        self.velocity = RbmParameters::zeros(self.n_visible(), self.n_hidden());
        self.metrics.reset();
        self.state = ModelState::Sized;
        self.rmse = None;
    }

    /// One CD-1 update on `batch`; returns the batch reconstruction error.
    fn contrastive_divergence(&mut self, batch: &Array2<f32>, epoch: usize) -> RbmResult<f32> {
        let batch_len = batch.nrows() as f32;

        // positive phase
        let ph0 = self.hidden_probabilities(batch.view());
        let h0 = self.sampler.bernoulli(ph0.view());

        // negative phase
        let pv1 = self.visible_probabilities(h0.view());
        let v1 = self
            .sampler
            .categorical_blocks(pv1.view(), batch.view(), self.n_levels);
        let ph1 = self.hidden_probabilities(v1.view());

        let mut grad_weights = (batch.t().dot(&ph0) - v1.t().dot(&ph1)) / batch_len;
        let (l1, l2) = (self.config.l1, self.config.l2);
        if l1 > 0.0 || l2 > 0.0 {
            Zip::from(&mut grad_weights)
                .and(&self.params.weights)
                .for_each(|g, &w| *g -= l1 * sign(w) + l2 * w);
        }
        let grad_visible = (batch - &v1).sum_axis(Axis(0)) / batch_len;
        let grad_hidden = (&ph0 - &ph1).sum_axis(Axis(0)) / batch_len;

        let (momentum, lr) = (self.config.momentum, self.config.learning_rate);
        momentum_step(
            &mut self.params.weights,
            &mut self.velocity.weights,
            &grad_weights,
            momentum,
            lr,
        );
        momentum_step(
            &mut self.params.visible_bias,
            &mut self.velocity.visible_bias,
            &grad_visible,
            momentum,
            lr,
        );
        momentum_step(
            &mut self.params.hidden_bias,
            &mut self.velocity.hidden_bias,
            &grad_hidden,
            momentum,
            lr,
        );

        self.ensure_finite(epoch)?;
        Ok(observed_squared_error(batch, &pv1, self.n_levels))
    }

    fn ensure_finite(&self, epoch: usize) -> RbmResult<()> {
        match self.params.first_non_finite() {
            None => Ok(()),
            Some(block) => {
                warn!(epoch, block, "non-finite parameters after update");
                Err(RbmError::NumericalInstability {
                    epoch,
                    detail: format!("{block} contain NaN or infinite values"),
                }
                .into())
            }
        }
    }

    fn check_width(&self, tensor: &RatingTensor) -> RbmResult<()> {
        if tensor.n_items() != self.n_items || tensor.n_levels() != self.n_levels {
            return Err(RbmError::shape_mismatch(
                format!("[*, {}, {}]", self.n_items, self.n_levels),
                format!("[*, {}, {}]", tensor.n_items(), tensor.n_levels()),
            )
            .into());
        }
        Ok(())
    }
}

/// `vel = momentum * vel + lr * grad; param += vel`
fn momentum_step<D: Dimension>(
    param: &mut Array<f32, D>,
    velocity: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    momentum: f32,
    learning_rate: f32,
) {
    *velocity *= momentum;
    velocity.scaled_add(learning_rate, grad);
    *param += &*velocity;
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Numerically stable softmax over consecutive blocks of `n_levels`.
fn softmax_blocks(mut row: ArrayViewMut1<'_, f32>, n_levels: usize) {
    let n_items = row.len() / n_levels;
    for item in 0..n_items {
        let mut block = row.slice_mut(s![item * n_levels..(item + 1) * n_levels]);
        let max = block.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        block.mapv_inplace(|v| (v - max).exp());
        let total = block.sum();
        block /= total;
    }
}

/// Mean squared error between `batch` and `probabilities` over rated items.
fn observed_squared_error(batch: &Array2<f32>, probabilities: &Array2<f32>, n_levels: usize) -> f32 {
    let mut total = 0.0;
    let mut observed = 0usize;

    for (visible, probs) in batch.outer_iter().zip(probabilities.outer_iter()) {
        for item in 0..visible.len() / n_levels {
            let (start, end) = (item * n_levels, (item + 1) * n_levels);
            let v = visible.slice(s![start..end]);
            if v.iter().all(|&x| x == 0.0) {
                continue;
            }
            let p = probs.slice(s![start..end]);
            total += v
                .iter()
                .zip(p.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>();
            observed += 1;
        }
    }

    if observed == 0 {
        0.0
    } else {
        total / observed as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutOfRangePolicy;
    use crate::trainset::Trainset;

    fn tensor_from(ratings: Vec<(String, String, f32)>) -> RatingTensor {
        let trainset = Trainset::from_ratings(RatingScale::integer(1, 5).unwrap(), ratings);
        RatingTensor::from_trainset(&trainset, OutOfRangePolicy::Reject).unwrap()
    }

    fn patterned_tensor(n_users: usize) -> RatingTensor {
        let mut ratings = Vec::new();
        for u in 0..n_users {
            ratings.push((format!("u{u}"), "favourite".to_string(), 5.0));
            ratings.push((format!("u{u}"), format!("i{}", u % 3), ((u % 5) + 1) as f32));
        }
        tensor_from(ratings)
    }

    fn builder(config: RbmConfig) -> RbmBuilder {
        RbmBuilder::new(config).unwrap()
    }

    #[test]
    fn test_size_allocates_parameters() {
        let config = RbmConfig::builder().n_hidden(7).build().unwrap();
        let rbm = builder(config)
            .size(4, RatingScale::integer(1, 5).unwrap())
            .unwrap();

        assert_eq!(rbm.n_visible(), 20);
        assert_eq!(rbm.n_hidden(), 7);
        assert_eq!(rbm.parameters().weights.dim(), (20, 7));
        assert_eq!(rbm.parameters().visible_bias.len(), 20);
        assert_eq!(rbm.parameters().hidden_bias.len(), 7);
        assert!(!rbm.is_trained());
        assert!(rbm.parameters().weights.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_size_rejects_zero_items() {
        let result = builder(RbmConfig::default()).size(0, RatingScale::default());
        assert!(matches!(result, Err((RbmError::EmptyTrainset { .. }, _))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = RbmConfig {
            n_hidden: 0,
            ..RbmConfig::default()
        };
        assert!(RbmBuilder::new(config).is_err());
    }

    #[test]
    fn test_reconstruct_before_fit_fails() {
        let tensor = patterned_tensor(4);
        let rbm = builder(RbmConfig::default())
            .size(tensor.n_items(), tensor.scale())
            .unwrap();

        let (err, action) = rbm.reconstruct(tensor.user(0)).unwrap_err();
        assert!(matches!(err, RbmError::ModelNotTrained));
        assert_eq!(action, Some(crate::error::RecoveryAction::Retrain));
    }

    #[test]
    fn test_fit_and_reconstruct_is_deterministic() {
        let tensor = patterned_tensor(10);
        let (train, validation) = tensor.split(0.8, 42).unwrap();
        let config = RbmConfig::builder()
            .n_hidden(8)
            .max_epoch(3)
            .learning_rate(0.05)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();

        let report = rbm.fit(&train, &validation).unwrap();
        assert_eq!(report.epochs_run, 3);
        assert_eq!(rbm.history().len(), 3);
        assert!(rbm.rmse().unwrap().is_finite());

        let first = rbm.reconstruct(tensor.user(0)).unwrap();
        let second = rbm.reconstruct(tensor.user(0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.dim(), (tensor.n_items(), tensor.n_levels()));
        for item in first.rows() {
            assert!((item.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_onehot_reconstruction() {
        let tensor = patterned_tensor(6);
        let config = RbmConfig::builder()
            .n_hidden(4)
            .max_epoch(2)
            .use_softmax(false)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();
        rbm.fit(&tensor, &tensor).unwrap();

        let reconstruction = rbm.reconstruct(tensor.user(1)).unwrap();
        for item in reconstruction.rows() {
            assert_eq!(item.sum(), 1.0);
            assert!(item.iter().all(|&v| v == 0.0 || v == 1.0));
        }
    }

    #[test]
    fn test_training_is_reproducible() {
        let tensor = patterned_tensor(8);
        let config = RbmConfig::builder()
            .n_hidden(5)
            .max_epoch(4)
            .batch_size(3)
            .momentum(0.5)
            .l1(0.001)
            .l2(0.001)
            .build()
            .unwrap();

        let mut a = builder(config.clone()).size(tensor.n_items(), tensor.scale()).unwrap();
        let mut b = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();
        let report_a = a.fit(&tensor, &tensor).unwrap();
        let report_b = b.fit(&tensor, &tensor).unwrap();

        assert_eq!(a.parameters(), b.parameters());
        assert_eq!(report_a.best_rmse, report_b.best_rmse);
    }

    #[test]
    fn test_learns_a_constant_rating() {
        let tensor = patterned_tensor(20);
        let config = RbmConfig::builder()
            .n_hidden(6)
            .max_epoch(30)
            .learning_rate(0.1)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();
        rbm.fit(&tensor, &tensor).unwrap();

        // item 0 is "favourite", rated 5 by everyone
        let reconstruction = rbm.reconstruct(tensor.user(0)).unwrap();
        let estimate = rbm.decoder().decode(reconstruction.row(0));
        assert!(estimate > 3.5, "estimate={estimate}");
    }

    #[test]
    fn test_max_epoch_bound() {
        let tensor = patterned_tensor(5);
        let config = RbmConfig::builder()
            .n_hidden(3)
            .max_epoch(4)
            .early_stopping(true)
            .patience(100)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();

        let report = rbm.fit(&tensor, &tensor).unwrap();
        assert_eq!(report.epochs_run, 4);
        assert!(!report.stopped_early);
    }

    #[test]
    fn test_early_stopping_bound_and_restore() {
        let tensor = patterned_tensor(12);
        let (train, validation) = tensor.split(0.75, 3).unwrap();
        let patience = 2;
        let config = RbmConfig::builder()
            .n_hidden(4)
            .max_epoch(40)
            .learning_rate(0.5)
            .early_stopping(true)
            .patience(patience)
            .min_improvement(0.05)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();

        let report = rbm.fit(&train, &validation).unwrap();

        assert!(report.epochs_run <= 40);
        assert!(report.epochs_run <= report.best_epoch + patience);
        if report.stopped_early {
            assert_eq!(report.epochs_run, report.best_epoch + patience);
        }
        assert!(report.restored_best);

        let restored_rmse = rbm.validation_rmse(&validation).unwrap();
        assert!((restored_rmse - report.best_rmse).abs() < 1e-6);
        assert_eq!(rbm.rmse(), Some(report.best_rmse));
    }

    #[test]
    fn test_fit_rejects_mismatched_tensor() {
        let tensor = patterned_tensor(4);
        let other = tensor_from(vec![("a".into(), "b".into(), 3.0)]);
        let mut rbm = builder(RbmConfig::default())
            .size(tensor.n_items(), tensor.scale())
            .unwrap();

        let (err, _) = rbm.fit(&other, &other).unwrap_err();
        assert!(matches!(err, RbmError::ShapeMismatch { .. }));

        let wrong_row = Array2::<f32>::zeros((1, 5));
        rbm.fit(&tensor, &tensor).unwrap();
        assert!(rbm.reconstruct(wrong_row.view()).is_err());
    }

    #[test]
    fn test_non_finite_parameters_detected() {
        let tensor = patterned_tensor(3);
        let mut rbm = builder(RbmConfig::default())
            .size(tensor.n_items(), tensor.scale())
            .unwrap();
        assert!(rbm.ensure_finite(1).is_ok());

        rbm.params.hidden_bias[0] = f32::NAN;
        let (err, action) = rbm.ensure_finite(2).unwrap_err();
        assert!(matches!(err, RbmError::NumericalInstability { epoch: 2, .. }));
        assert!(matches!(
            action,
            Some(crate::error::RecoveryAction::ReduceLearningRate { .. })
        ));
    }

    #[test]
    fn test_fit_reports_divergence() {
        let tensor = patterned_tensor(10);
        let config = RbmConfig::builder()
            .n_hidden(4)
            .learning_rate(f32::MAX)
            .momentum(0.9)
            .max_epoch(5)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();

        let (err, action) = rbm.fit(&tensor, &tensor).unwrap_err();
        assert!(matches!(err, RbmError::NumericalInstability { .. }), "{err}");
        assert!(matches!(
            action,
            Some(crate::error::RecoveryAction::ReduceLearningRate { .. })
        ));
        assert!(!rbm.is_trained());
        assert!(rbm.reconstruct(tensor.user(0)).is_err());
    }

    #[test]
    fn test_refit_resets_momentum_and_history() {
        let tensor = patterned_tensor(6);
        let config = RbmConfig::builder()
            .n_hidden(4)
            .momentum(0.5)
            .learning_rate(0.05)
            .max_epoch(3)
            .build()
            .unwrap();
        let mut rbm = builder(config).size(tensor.n_items(), tensor.scale()).unwrap();
        rbm.fit(&tensor, &tensor).unwrap();
        assert!(rbm.velocity.weights.iter().any(|&v| v != 0.0));
        let trained = rbm.parameters().clone();

        rbm.begin_fit();
        assert!(rbm.velocity.weights.iter().all(|&v| v == 0.0));
        assert!(rbm.velocity.visible_bias.iter().all(|&v| v == 0.0));
        assert!(rbm.history().is_empty());
        assert!(!rbm.is_trained());
        assert_eq!(rbm.parameters(), &trained);

        let report = rbm.fit(&tensor, &tensor).unwrap();
        assert_eq!(report.epochs_run, 3);
        assert_eq!(rbm.history().len(), 3);
    }

    #[test]
    fn test_softmax_blocks_normalize() {
        let mut row = ndarray::array![1.0f32, 2.0, 3.0, 1000.0, 0.0, -1000.0];
        softmax_blocks(row.view_mut(), 3);
        assert!((row.slice(s![0..3]).sum() - 1.0).abs() < 1e-6);
        assert!((row.slice(s![3..6]).sum() - 1.0).abs() < 1e-6);
        assert!((row[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(2.0), 1.0);
        assert_eq!(sign(-0.5), -1.0);
        assert_eq!(sign(0.0), 0.0);
    }
}
