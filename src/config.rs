//! Training configuration and serialization.
//!
//! [`RbmConfig`] gathers every hyperparameter of the model and of the
//! recommender wrapped around it. Configurations are built through
//! [`RbmConfigBuilder`], which validates on `build()`, and round-trip through
//! JSON so experiments can be recorded next to their metrics.
//!
//! # Example
//!
//! ```
//! use rbm_recommender_rs::RbmConfig;
//!
//! let config = RbmConfig::builder()
//!     .n_hidden(200)
//!     .learning_rate(0.01)
//!     .l1(0.001)
//!     .l2(0.001)
//!     .batch_size(100)
//!     .build()
//!     .expect("valid configuration");
//!
//! assert_eq!(config.n_hidden, 200);
//! ```

use serde::{Deserialize, Serialize};

use crate::decoder::DecodePolicy;
use crate::error::{RbmError, RbmResult};

/// What the tensorizer does with a rating outside the rating scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Fail with `RatingOutOfRange`, or `RatingOffLevel` for a rating between
    /// two levels.
    #[default]
    Reject,
    /// Clamp to the nearest end of the scale and round ratings between two
    /// levels to the nearest one.
    Clamp,
}

/// Hyperparameters of the RBM and of the recommender around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbmConfig {
    /// Number of hidden units.
    pub n_hidden: usize,

    /// Step size of the contrastive-divergence updates.
    pub learning_rate: f32,

    /// L1 penalty on the weights.
    pub l1: f32,

    /// L2 penalty on the weights.
    pub l2: f32,

    /// Momentum coefficient, in `[0, 1)`.
    pub momentum: f32,

    /// Users per mini-batch; `1` is fully online training.
    pub batch_size: usize,

    /// Stop when the validation RMSE stops improving.
    pub early_stopping: bool,

    /// Non-improving epochs tolerated before stopping.
    pub patience: usize,

    /// Hard upper bound on training epochs.
    pub max_epoch: usize,

    /// Log every epoch at `info` level instead of `debug`.
    pub verbose: bool,

    /// Fraction of users kept for training; the rest validate.
    pub split_ratio: f64,

    /// Decode ratings as a softmax expectation (`true`) or one-hot argmax (`false`).
    pub use_softmax: bool,

    /// Minimum RMSE decrease that counts as an improvement.
    pub min_improvement: f32,

    /// Seed for the train/validation split, weight initialization and sampling.
    pub seed: u64,

    /// Handling of ratings outside the rating scale.
    pub out_of_range: OutOfRangePolicy,
}

impl Default for RbmConfig {
    fn default() -> Self {
        Self {
            n_hidden: 100,
            learning_rate: 0.001,
            l1: 0.0,
            l2: 0.0,
            momentum: 0.0,
            batch_size: 1,
            early_stopping: false,
            patience: 5,
            max_epoch: 20,
            verbose: false,
            split_ratio: 0.9,
            use_softmax: true,
            min_improvement: 0.0,
            seed: 42,
            out_of_range: OutOfRangePolicy::Reject,
        }
    }
}

impl RbmConfig {
    /// Returns a builder starting from the defaults.
    pub fn builder() -> RbmConfigBuilder {
        RbmConfigBuilder::default()
    }

    /// Decoder selected by `use_softmax`.
    pub fn decode_policy(&self) -> DecodePolicy {
        if self.use_softmax {
            DecodePolicy::Softmax
        } else {
            DecodePolicy::OneHot
        }
    }

    /// Checks every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending parameter.
    pub fn validate(&self) -> RbmResult<()> {
        let fail = |detail: String| -> RbmResult<()> { Err(RbmError::invalid_config(detail).into()) };

        if self.n_hidden == 0 {
            return fail("n_hidden must be positive".into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return fail(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            ));
        }
        for (name, value) in [
            ("l1", self.l1),
            ("l2", self.l2),
            ("min_improvement", self.min_improvement),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return fail(format!("{name} must be non-negative and finite, got {value}"));
            }
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return fail(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive".into());
        }
        if self.max_epoch == 0 {
            return fail("max_epoch must be positive".into());
        }
        if self.early_stopping && self.patience == 0 {
            return fail("patience must be positive when early stopping is enabled".into());
        }
        if !(self.split_ratio > 0.0 && self.split_ratio <= 1.0) {
            return fail(format!("split_ratio must be in (0, 1], got {}", self.split_ratio));
        }

        Ok(())
    }

    /// Parses and validates a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> RbmResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(RbmError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> RbmResult<String> {
        Ok(serde_json::to_string_pretty(self).map_err(RbmError::from)?)
    }
}

/// Builder for [`RbmConfig`].
#[derive(Debug, Clone, Default)]
pub struct RbmConfigBuilder {
    config: RbmConfig,
}

macro_rules! builder_setters {
    ($($(#[$doc:meta])* $field:ident: $ty:ty),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $field(mut self, value: $ty) -> Self {
                self.config.$field = value;
                self
            }
        )*
    };
}

impl RbmConfigBuilder {
    builder_setters! {
        /// Sets the number of hidden units.
        n_hidden: usize,
        /// Sets the learning rate.
        learning_rate: f32,
        /// Sets the L1 weight penalty.
        l1: f32,
        /// Sets the L2 weight penalty.
        l2: f32,
        /// Sets the momentum coefficient.
        momentum: f32,
        /// Sets the mini-batch size.
        batch_size: usize,
        /// Enables or disables early stopping.
        early_stopping: bool,
        /// Sets the early-stopping patience.
        patience: usize,
        /// Sets the maximum number of epochs.
        max_epoch: usize,
        /// Enables per-epoch progress logging.
        verbose: bool,
        /// Sets the fraction of users used for training.
        split_ratio: f64,
        /// Selects softmax (`true`) or one-hot (`false`) decoding.
        use_softmax: bool,
        /// Sets the minimum RMSE improvement.
        min_improvement: f32,
        /// Sets the random seed.
        seed: u64,
        /// Sets the out-of-range rating policy.
        out_of_range: OutOfRangePolicy,
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if any parameter is out of range.
    pub fn build(self) -> RbmResult<RbmConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
